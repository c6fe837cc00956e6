//! Include resolution.
//!
//! Turns a specifier found inside a page (`@import "reset.css"`) into a
//! location the reader can load. Lookup order:
//!
//! 1. `http://` / `https://` URLs are returned unchanged.
//! 2. `file://` URLs become local paths.
//! 3. `./` and `../` are joined to the importing directory, unchecked.
//! 4. `/…` is tried against the source root, then searched as a bare name.
//! 5. Bare names are tried next to the importer, then in the include paths:
//!    the format's own include directory first, then the configured ones.
//!    Only includable formats are searched there.
//!
//! Existence checks go through the build's [`Reader`], so they never block
//! the runtime and see the same root the reader loads from.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::format::Formats;
use crate::reader::Reader;
use crate::utils::path::{clean_path, parse_remote, relative_to};

/// Where an include lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Root-relative path, or an absolute one outside the root.
    Local(PathBuf),
    Remote(Url),
}

impl Location {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Key used for caching and as a source map source name.
    pub fn key(&self) -> String {
        match self {
            Self::Local(path) => path.to_string_lossy().replace('\\', "/"),
            Self::Remote(url) => url.to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cannot resolve `{specifier}` from `{}`", from_dir.display())]
    NotFound { specifier: String, from_dir: PathBuf },

    #[error("invalid file URL `{0}`")]
    InvalidUrl(String),
}

/// Resolves include specifiers against the source root and include paths.
///
/// The source root is the one of the [`Reader`] passed to each call.
#[derive(Debug, Clone)]
pub struct IncludeResolver {
    includes: Vec<PathBuf>,
    formats: Arc<Formats>,
}

impl IncludeResolver {
    /// `includes` are root-relative directories searched in order.
    pub fn new(includes: Vec<PathBuf>, formats: Arc<Formats>) -> Self {
        Self { includes, formats }
    }

    pub fn includes(&self) -> &[PathBuf] {
        &self.includes
    }

    /// Resolve with the configured include paths.
    pub async fn resolve_include(
        &self,
        reader: &Reader,
        specifier: &str,
        from_dir: &Path,
    ) -> Result<Location, ResolveError> {
        self.resolve(reader, specifier, &self.includes, from_dir).await
    }

    /// Resolve `specifier` imported from the root-relative directory `from_dir`.
    pub async fn resolve(
        &self,
        reader: &Reader,
        specifier: &str,
        search_paths: &[PathBuf],
        from_dir: &Path,
    ) -> Result<Location, ResolveError> {
        if let Some(url) = parse_remote(specifier) {
            return Ok(Location::Remote(url));
        }

        if specifier.starts_with("file://") {
            let path = Url::parse(specifier)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| ResolveError::InvalidUrl(specifier.to_string()))?;
            return Ok(Location::Local(localize(&path, reader.root())));
        }

        if specifier.starts_with("./") || specifier.starts_with("../") {
            return Ok(Location::Local(clean_path(&from_dir.join(specifier))));
        }

        let bare = match specifier.strip_prefix('/') {
            Some(rooted) => {
                let candidate = Location::Local(clean_path(Path::new(rooted)));
                if reader.exists(&candidate).await {
                    return Ok(candidate);
                }
                rooted
            }
            None => specifier,
        };

        let beside = Location::Local(clean_path(&from_dir.join(bare)));
        if reader.exists(&beside).await {
            return Ok(beside);
        }

        if let Some(entry) = self.formats.search(bare).filter(|e| e.includable) {
            let dirs = entry.includes.iter().chain(search_paths);
            for dir in dirs {
                let candidate = Location::Local(clean_path(&dir.join(bare)));
                if reader.exists(&candidate).await {
                    return Ok(candidate);
                }
            }
        }

        Err(ResolveError::NotFound {
            specifier: specifier.to_string(),
            from_dir: from_dir.to_path_buf(),
        })
    }

}

/// Root-relative when under `root`, absolute otherwise.
fn localize(path: &Path, root: &Path) -> PathBuf {
    relative_to(path, root).map_or_else(|| clean_path(path), PathBuf::from)
}
