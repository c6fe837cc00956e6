//! Format registry: which loader handles which extension.
//!
//! Extensions are matched as suffixes of the file name, longest first, so
//! `index.tmpl.ts` picks `.tmpl.ts` over `.ts` when both are registered.

mod loader;

pub use loader::{BinaryLoader, LoadError, Loader, TextLoader};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::page::Page;

/// Whether a format produces pages or plain assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatKind {
    Page,
    #[default]
    Asset,
}

/// Registration options for [`Formats::register`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    pub kind: FormatKind,
    /// Specifiers of this format may be looked up in include paths.
    pub includable: bool,
}

impl FormatOptions {
    pub fn page() -> Self {
        Self {
            kind: FormatKind::Page,
            includable: false,
        }
    }

    pub fn asset() -> Self {
        Self::default()
    }

    pub fn includable(mut self) -> Self {
        self.includable = true;
        self
    }
}

#[derive(Clone)]
pub struct FormatEntry {
    pub ext: String,
    pub loader: Arc<dyn Loader>,
    pub kind: FormatKind,
    pub includable: bool,
    /// Include directory searched before the configured include paths.
    pub includes: Option<PathBuf>,
}

impl std::fmt::Debug for FormatEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatEntry")
            .field("ext", &self.ext)
            .field("kind", &self.kind)
            .field("includable", &self.includable)
            .field("includes", &self.includes)
            .finish_non_exhaustive()
    }
}

/// Registered formats keyed by extension (with leading dot).
#[derive(Debug, Clone, Default)]
pub struct Formats {
    entries: FxHashMap<String, FormatEntry>,
}

/// Text extensions loaded by default.
const TEXT_ASSETS: &[&str] = &[
    ".css", ".js", ".mjs", ".json", ".svg", ".txt", ".xml", ".map", ".webmanifest",
];
const TEXT_PAGES: &[&str] = &[".html", ".htm", ".md"];
const BINARY_ASSETS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".avif", ".ico", ".bmp", ".woff", ".woff2",
    ".ttf", ".otf", ".eot", ".pdf", ".mp4", ".webm", ".mp3", ".wasm", ".zip",
];

fn normalize_ext(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

impl Formats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in text and binary formats.
    ///
    /// `.css` is includable so stylesheet imports can come from include paths.
    pub fn with_defaults() -> Self {
        let mut formats = Self::new();
        let text: Arc<dyn Loader> = Arc::new(TextLoader);
        let binary: Arc<dyn Loader> = Arc::new(BinaryLoader);

        for ext in TEXT_ASSETS {
            formats.register(ext, text.clone(), FormatOptions::asset());
        }
        for ext in TEXT_PAGES {
            formats.register(ext, text.clone(), FormatOptions::page());
        }
        for ext in BINARY_ASSETS {
            formats.register(ext, binary.clone(), FormatOptions::asset());
        }
        formats.register(".css", text, FormatOptions::asset().includable());
        formats
    }

    /// Register `loader` for `ext`. A later registration replaces an earlier one.
    pub fn register(&mut self, ext: &str, loader: Arc<dyn Loader>, options: FormatOptions) {
        let ext = normalize_ext(ext);
        // A per-format include dir survives re-registration
        let includes = self.entries.get(&ext).and_then(|e| e.includes.clone());
        self.entries.insert(
            ext.clone(),
            FormatEntry {
                ext,
                loader,
                kind: options.kind,
                includable: options.includable,
                includes,
            },
        );
    }

    /// Set the include directory for already registered `extensions`.
    pub fn set_includes<S: AsRef<str>>(&mut self, extensions: &[S], dir: impl Into<PathBuf>) {
        let dir = dir.into();
        for ext in extensions {
            if let Some(entry) = self.entries.get_mut(&normalize_ext(ext.as_ref())) {
                entry.includes = Some(dir.clone());
            }
        }
    }

    pub fn get(&self, ext: &str) -> Option<&FormatEntry> {
        self.entries.get(&normalize_ext(ext))
    }

    /// Entry whose extension is the longest suffix of the file name of `path`.
    pub fn search(&self, path: impl AsRef<Path>) -> Option<&FormatEntry> {
        let path = path.as_ref();
        let name = path.file_name()?.to_str()?;
        self.entries
            .values()
            .filter(|entry| name.ends_with(entry.ext.as_str()))
            .max_by_key(|entry| entry.ext.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Include directories registered per format, deduplicated.
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .entries
            .values()
            .filter_map(|e| e.includes.clone())
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }

    /// Read and load `rel` (relative to `root`).
    ///
    /// Returns `Ok(None)` when no format matches the file name.
    pub fn load(&self, root: &Path, rel: &Path) -> Result<Option<Page>, LoadError> {
        let Some(entry) = self.search(rel) else {
            return Ok(None);
        };
        let bytes = std::fs::read(root.join(rel)).map_err(|source| LoadError::Io {
            path: rel.to_path_buf(),
            source,
        })?;
        let content = entry.loader.load(rel, bytes)?;
        Ok(Some(Page::new(rel, &entry.ext, content)))
    }
}
