//! Reading includes from disk or the network.
//!
//! Remote bodies are fetched at most once per build: the cache holds one
//! [`OnceCell`] per URL, so concurrent readers of the same URL wait on the
//! fetch already in flight instead of starting their own.

mod fetch;

pub use fetch::{Fetch, FetchError, HttpFetcher};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::OnceCell;
use url::Url;

use crate::page::Content;
use crate::resolve::Location;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("cannot read `{path}`: {reason}")]
    NotReadable { path: String, reason: String },

    #[error("`{path}` is not valid UTF-8")]
    InvalidUtf8 { path: String },
}

type Body = Arc<[u8]>;

pub struct Reader {
    root: PathBuf,
    fetcher: Arc<dyn Fetch>,
    remote: DashMap<String, Arc<OnceCell<Body>>>,
}

impl Reader {
    /// `root` resolves relative local paths.
    pub fn new(root: impl Into<PathBuf>, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            root: root.into(),
            fetcher,
            remote: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read `location` as text or binary content.
    pub async fn read(&self, location: &Location, binary: bool) -> Result<Content, ReadError> {
        if binary {
            let bytes = self.read_bytes(location).await?;
            return Ok(Content::Binary(bytes.to_vec()));
        }
        self.read_text(location).await.map(Content::Text)
    }

    pub async fn read_text(&self, location: &Location) -> Result<String, ReadError> {
        let bytes = self.read_bytes(location).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ReadError::InvalidUtf8 {
            path: location.key(),
        })
    }

    pub async fn read_bytes(&self, location: &Location) -> Result<Body, ReadError> {
        match location {
            Location::Local(path) => self.read_local(path).await,
            Location::Remote(url) => self.read_remote(url).await,
        }
    }

    /// Whether a local file exists. Remote locations are assumed to.
    pub async fn exists(&self, location: &Location) -> bool {
        match location {
            Location::Local(path) => tokio::fs::metadata(self.root.join(path))
                .await
                .is_ok_and(|m| m.is_file()),
            Location::Remote(_) => true,
        }
    }

    /// Number of remote bodies cached so far.
    pub fn cached(&self) -> usize {
        self.remote.iter().filter(|e| e.value().initialized()).count()
    }

    async fn read_local(&self, path: &Path) -> Result<Body, ReadError> {
        tokio::fs::read(self.root.join(path))
            .await
            .map(Arc::from)
            .map_err(|e| ReadError::NotReadable {
                path: path.to_string_lossy().into_owned(),
                reason: e.to_string(),
            })
    }

    async fn read_remote(&self, url: &Url) -> Result<Body, ReadError> {
        let key = url.to_string();
        let cell = self.remote.entry(key.clone()).or_default().clone();

        let body = cell
            .get_or_try_init(|| async {
                let fetcher = self.fetcher.clone();
                let target = url.clone();
                let fetched = tokio::task::spawn_blocking(move || fetcher.fetch(&target))
                    .await
                    .map_err(|e| ReadError::NotReadable {
                        path: key.clone(),
                        reason: e.to_string(),
                    })?;
                fetched.map(Arc::from).map_err(|e| ReadError::NotReadable {
                    path: key.clone(),
                    reason: e.to_string(),
                })
            })
            .await?;
        Ok(body.clone())
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("root", &self.root)
            .field("cached", &self.remote.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFetcher {
        calls: AtomicUsize,
        status: Option<u16>,
    }

    impl CountingFetcher {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status: None,
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                status: Some(status),
            })
        }
    }

    impl Fetch for CountingFetcher {
        fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            match self.status {
                Some(status) => Err(FetchError::Status(status)),
                None => Ok(format!("/* {url} */").into_bytes()),
            }
        }
    }

    fn remote(url: &str) -> Location {
        Location::Remote(Url::parse(url).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_fetch_under_concurrency() {
        let fetcher = CountingFetcher::ok();
        let reader = Arc::new(Reader::new("/", fetcher.clone()));
        let location = remote("https://cdn.test/reset.css");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reader = reader.clone();
                let location = location.clone();
                tokio::spawn(async move { reader.read_text(&location).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "/* https://cdn.test/reset.css */");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(reader.cached(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_readable() {
        let reader = Reader::new("/", CountingFetcher::failing(404));
        let err = reader
            .read_text(&remote("https://cdn.test/missing.css"))
            .await
            .unwrap_err();
        match err {
            ReadError::NotReadable { path, reason } => {
                assert_eq!(path, "https://cdn.test/missing.css");
                assert_eq!(reason, "HTTP 404");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reader.cached(), 0);
    }

    #[tokio::test]
    async fn test_local_reads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.css"), "a{}").unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xffu8, 0xfe]).unwrap();
        let reader = Reader::new(dir.path(), CountingFetcher::ok());

        let a = Location::Local(PathBuf::from("a.css"));
        assert_eq!(reader.read_text(&a).await.unwrap(), "a{}");
        assert!(reader.exists(&a).await);

        let bad = Location::Local(PathBuf::from("bad.txt"));
        assert!(matches!(
            reader.read(&bad, false).await,
            Err(ReadError::InvalidUtf8 { .. })
        ));
        assert!(reader.read(&bad, true).await.unwrap().is_binary());

        let missing = Location::Local(PathBuf::from("missing.css"));
        assert!(!reader.exists(&missing).await);
        assert!(matches!(
            reader.read_text(&missing).await,
            Err(ReadError::NotReadable { .. })
        ));
    }
}
