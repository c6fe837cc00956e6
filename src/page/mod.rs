//! Pages: the unit of work flowing through the pipeline.
//!
//! A page is created by a loader (or emitted by a transformer), mutated in
//! place by every stage whose extension set contains its current extension,
//! and finally handed to the writer.
//!
//! # Example
//!
//! ```text
//! source:  styles/main.scss
//! dest:    styles/main   ext: .scss   (after loading)
//! dest:    styles/main   ext: .css    (after the sass stage)
//! output:  styles/main.css
//! ```

mod content;

pub use content::Content;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sourcemap::{SourceMap, SourceMapError, compose};
use crate::utils::path::to_slash;

/// A JSON object map for storing arbitrary metadata fields.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// A text-only operation was attempted on binary content.
#[derive(Debug, Error)]
#[error("`{path}` has binary content, text was expected")]
pub struct BinaryContent {
    pub path: String,
}

/// Map reported by the last transformation, not yet folded into the page map.
#[derive(Debug)]
pub(crate) struct Staged {
    pub map: SourceMap,
    /// Content the transformation started from, when that content was original.
    pub input: Option<String>,
}

#[derive(Debug)]
pub struct Page {
    /// Root-relative source path, `None` for synthetic pages.
    source: Option<PathBuf>,
    /// Stable root-relative name, used as the source name in maps.
    identity: String,
    /// Root-relative output path without extension.
    dest: String,
    /// Current extension including the leading dot.
    ext: String,
    content: Content,
    /// Free-form metadata.
    pub data: JsonMap,
    source_map: Option<SourceMap>,
    staged: Option<Staged>,
}

impl Page {
    /// Page loaded from `source` whose registered format is `ext`.
    ///
    /// `ext` is the matched suffix (`.tmpl.ts` for `a.tmpl.ts`) and becomes
    /// the initial destination extension.
    pub fn new(source: impl Into<PathBuf>, ext: &str, content: impl Into<Content>) -> Self {
        let source = source.into();
        let identity = to_slash(&source);
        let dest = identity
            .strip_suffix(ext)
            .unwrap_or(&identity)
            .to_string();
        Self {
            source: Some(source),
            identity,
            dest,
            ext: ext.to_string(),
            content: content.into(),
            data: JsonMap::new(),
            source_map: None,
            staged: None,
        }
    }

    /// Page with no source file, e.g. a bundle emitted by a transformer.
    ///
    /// The extension is everything from the last `.` of the file name.
    pub fn synthetic(output: &str, content: impl Into<Content>) -> Self {
        let identity = output.trim_start_matches('/').to_string();
        let file_start = identity.rfind('/').map_or(0, |i| i + 1);
        let (dest, ext) = match identity[file_start..].rfind('.') {
            Some(dot) if dot > 0 => identity.split_at(file_start + dot),
            _ => (identity.as_str(), ""),
        };
        Self {
            source: None,
            dest: dest.to_string(),
            ext: ext.to_string(),
            identity: identity.clone(),
            content: content.into(),
            data: JsonMap::new(),
            source_map: None,
            staged: None,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn is_synthetic(&self) -> bool {
        self.source.is_none()
    }

    /// Stable root-relative name of the page: its source path, or the
    /// output path it was created with.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn dest(&self) -> &str {
        &self.dest
    }

    pub fn set_dest(&mut self, dest: impl Into<String>) {
        self.dest = dest.into();
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Change the destination extension (`.scss` -> `.css`).
    ///
    /// Stages already run are not revisited for the new extension.
    pub fn set_ext(&mut self, ext: &str) {
        self.ext = if ext.is_empty() || ext.starts_with('.') {
            ext.to_string()
        } else {
            format!(".{ext}")
        };
    }

    /// Root-relative output file path.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(format!("{}{}", self.dest, self.ext))
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn into_content(self) -> Content {
        self.content
    }

    /// Text content, or a contract error naming the page.
    pub fn text(&self) -> Result<&str, BinaryContent> {
        self.content.as_text().ok_or_else(|| BinaryContent {
            path: self.identity.clone(),
        })
    }

    /// Replace text content, optionally with the map of that transformation.
    ///
    /// The map describes the new content in terms of the content being
    /// replaced. Without a map the page keeps its current one. A second
    /// mapped replacement before the fold is composed onto the staged map,
    /// so the staged map always describes the content the transformation
    /// started from.
    pub fn replace_text(
        &mut self,
        text: impl Into<String>,
        map: Option<SourceMap>,
    ) -> Result<(), SourceMapError> {
        let previous = std::mem::replace(&mut self.content, Content::Text(text.into()));
        let Some(mut map) = map else {
            return Ok(());
        };

        let staged = match self.staged.take() {
            Some(Staged { map: mut earlier, input }) => {
                earlier.file = Some(self.identity.clone());
                map.file = Some(self.identity.clone());
                Staged {
                    map: compose(Some(&earlier), &map)?,
                    input,
                }
            }
            None => {
                let input = match (&self.source_map, previous) {
                    (None, Content::Text(text)) => Some(text),
                    _ => None,
                };
                Staged { map, input }
            }
        };
        self.staged = Some(staged);
        Ok(())
    }

    /// Replace with binary content. Text maps no longer apply and are dropped.
    pub fn replace_binary(&mut self, bytes: Vec<u8>) {
        self.content = Content::Binary(bytes);
        self.source_map = None;
        self.staged = None;
    }

    /// Composed map, `None` when the content is still original.
    pub fn source_map(&self) -> Option<&SourceMap> {
        self.source_map.as_ref()
    }

    pub(crate) fn set_source_map(&mut self, map: SourceMap) {
        self.source_map = Some(map);
    }

    pub(crate) fn take_staged(&mut self) -> Option<Staged> {
        self.staged.take()
    }
}
