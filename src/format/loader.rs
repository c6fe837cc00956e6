//! Loaders turn raw file bytes into page content.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::page::Content;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` is not valid UTF-8", path.display())]
    InvalidUtf8 { path: PathBuf },

    #[error("failed to load `{}`: {message}", path.display())]
    Failed { path: PathBuf, message: String },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::InvalidUtf8 { path } | Self::Failed { path, .. } => path,
        }
    }
}

/// Converts the bytes of a source file into page content.
///
/// `path` is the root-relative path of the file being loaded.
pub trait Loader: Send + Sync {
    fn load(&self, path: &Path, bytes: Vec<u8>) -> Result<Content, LoadError>;
}

/// Loads UTF-8 text. A leading byte order mark is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl Loader for TextLoader {
    fn load(&self, path: &Path, mut bytes: Vec<u8>) -> Result<Content, LoadError> {
        if bytes.starts_with(b"\xEF\xBB\xBF") {
            bytes.drain(..3);
        }
        String::from_utf8(bytes)
            .map(Content::Text)
            .map_err(|_| LoadError::InvalidUtf8 {
                path: path.to_path_buf(),
            })
    }
}

/// Loads bytes as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryLoader;

impl Loader for BinaryLoader {
    fn load(&self, _path: &Path, bytes: Vec<u8>) -> Result<Content, LoadError> {
        Ok(Content::Binary(bytes))
    }
}
