//! Source maps (revision 3) and their composition across stages.
//!
//! A page carries at most one map. Each transformation that reports a map
//! gets folded into it by [`Composer`], so the map on a finished page always
//! points at the original files rather than at an intermediate artifact.
//!
//! Mappings, sources and names live in a [`parcel_sourcemap::SourceMap`],
//! which also owns the VLQ codec. Its sources are kept relative to a project
//! root. This module adds the `file` a map describes, the JSON envelope
//! (`file`, `sourceRoot`, nullable `sourcesContent`) and position lookups.

mod compose;
mod emit;

pub use compose::{Composer, compose};
pub use emit::{annotate, inline_url, map_path, prepare_for_output};
pub use parcel_sourcemap::OriginalLocation;

use std::path::Path;

use parcel_sourcemap::{Mapping, SourceMap as ParcelMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::path::{is_remote, to_slash};

#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported source map version {0}")]
    Version(u8),

    #[error(transparent)]
    Mappings(#[from] parcel_sourcemap::SourceMapError),
}

/// A decoded original position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source: String,
    pub line: u32,
    pub column: u32,
    pub name: Option<String>,
}

/// JSON shape of a revision 3 source map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSourceMap {
    #[serde(default = "default_version")]
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_content: Vec<Option<String>>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
}

const fn default_version() -> u8 {
    3
}

impl RawSourceMap {
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        let raw: Self = serde_json::from_str(json)?;
        if raw.version != 3 {
            return Err(SourceMapError::Version(raw.version));
        }
        Ok(raw)
    }

    pub fn to_json(&self) -> Result<String, SourceMapError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A source map whose sources are relative to a project root.
#[derive(Debug, Clone)]
pub struct SourceMap {
    /// Name of the content the map describes.
    pub file: Option<String>,
    inner: ParcelMap,
}

impl SourceMap {
    /// Empty map with sources kept relative to `root`.
    pub fn new(root: &Path) -> Self {
        Self::from_parcel(ParcelMap::new(&root.to_string_lossy()))
    }

    /// Wrap a map built by a tool that speaks parcel maps (lightningcss).
    pub fn from_parcel(inner: ParcelMap) -> Self {
        Self { file: None, inner }
    }

    /// Parse map JSON, rewriting its sources relative to `root`.
    ///
    /// `sourceRoot` is applied to the sources and then dropped; `file://`
    /// and absolute sources become root-relative, sources outside the root
    /// climb out of it with `..`. Remote URLs are kept.
    pub fn from_json(root: &Path, json: &str) -> Result<Self, SourceMapError> {
        let raw = RawSourceMap::from_json(json)?;
        let source_root = raw.source_root.as_deref().filter(|r| !r.is_empty());
        let sources: Vec<String> = raw
            .sources
            .iter()
            .map(|source| match source_root {
                Some(prefix) if !source.starts_with('/') && !source.contains("://") => {
                    format!("{}/{source}", prefix.trim_end_matches('/'))
                }
                _ => source.clone(),
            })
            .collect();
        // parcel stores missing contents as empty strings
        let contents: Vec<String> = (0..sources.len())
            .map(|i| raw.sources_content.get(i).cloned().flatten().unwrap_or_default())
            .collect();

        let mut map = Self::new(root);
        map.file = raw.file;
        map.inner
            .add_vlq_map(raw.mappings.as_bytes(), sources, contents, raw.names, 0, 0)?;
        Ok(map)
    }

    /// JSON envelope of this map, without `sourceRoot`.
    pub fn to_raw(&self) -> Result<RawSourceMap, SourceMapError> {
        let mut inner = self.inner.clone();
        let mut mappings = Vec::new();
        inner.write_vlq(&mut mappings)?;

        let sources_content: Vec<Option<String>> = (0..self.sources().len())
            .map(|i| self.source_content(i as u32).map(str::to_string))
            .collect();
        let sources_content = if sources_content.iter().all(Option::is_none) {
            Vec::new()
        } else {
            sources_content
        };

        Ok(RawSourceMap {
            version: 3,
            file: self.file.clone(),
            source_root: None,
            sources: self.sources().to_vec(),
            sources_content,
            names: self.names().to_vec(),
            mappings: String::from_utf8_lossy(&mappings).into_owned(),
        })
    }

    pub fn to_json(&self) -> Result<String, SourceMapError> {
        self.to_raw()?.to_json()
    }

    /// Project root the sources are relative to.
    pub fn root(&self) -> &str {
        &self.inner.project_root
    }

    pub fn sources(&self) -> &[String] {
        self.inner.get_sources()
    }

    pub fn names(&self) -> &[String] {
        self.inner.get_names()
    }

    pub fn source(&self, index: u32) -> Result<&str, SourceMapError> {
        Ok(self.inner.get_source(index)?)
    }

    pub fn name(&self, index: u32) -> Result<&str, SourceMapError> {
        Ok(self.inner.get_name(index)?)
    }

    /// Index of `source`, added when missing. Absolute paths are made
    /// relative to the root.
    pub fn add_source(&mut self, source: &str) -> u32 {
        self.inner.add_source(source)
    }

    /// Map generated `(line, column)` to `original`, or mark it unmapped.
    ///
    /// Lookups that land on an unmapped segment resolve to nothing instead
    /// of an earlier segment.
    pub fn add_mapping(&mut self, line: u32, column: u32, original: Option<OriginalLocation>) {
        self.inner.add_mapping(line, column, original);
    }

    pub fn mappings(&self) -> Vec<Mapping> {
        self.inner.get_mappings()
    }

    /// Embedded content of a source. Empty strings count as missing.
    pub fn source_content(&self, index: u32) -> Option<&str> {
        self.inner
            .get_source_content(index)
            .ok()
            .filter(|s| !s.is_empty())
    }

    /// Set (or replace) the embedded content of `source`, if it is listed.
    pub fn set_source_content(&mut self, source: &str, content: &str) -> Result<(), SourceMapError> {
        let Some(index) = self.inner.get_source_index(source)? else {
            return Ok(());
        };
        self.inner.set_source_content(index as usize, content)?;
        Ok(())
    }

    /// Index in this map of source `index` of `other`, added when missing.
    ///
    /// Local sources of a map with another root are re-expressed relative
    /// to this one. Content is carried over unless this map already has it.
    pub(crate) fn import_source(&mut self, other: &SourceMap, index: u32) -> Result<u32, SourceMapError> {
        let source = other.source(index)?;
        let id = if other.root() == self.root() || is_remote(source) {
            self.inner.add_source(source)
        } else {
            let absolute = Path::new(other.root()).join(source);
            self.inner.add_source(&format!("/{}", to_slash(&absolute)))
        };
        if let Some(content) = other.source_content(index) {
            if self.source_content(id).is_none() {
                self.inner.set_source_content(id as usize, content)?;
            }
        }
        Ok(id)
    }

    pub(crate) fn import_name(&mut self, other: &SourceMap, index: u32) -> Result<u32, SourceMapError> {
        Ok(self.inner.add_name(other.name(index)?))
    }

    /// Copy of this map with its sources relative to `root`.
    pub fn rebase(&self, root: &Path) -> Result<SourceMap, SourceMapError> {
        if root.to_string_lossy() == self.root() {
            return Ok(self.clone());
        }
        let mut out = SourceMap::new(root);
        out.file = self.file.clone();
        for mapping in self.mappings() {
            let original = match mapping.original {
                Some(original) => Some(OriginalLocation::new(
                    original.original_line,
                    original.original_column,
                    out.import_source(self, original.source)?,
                    original.name.map(|n| out.import_name(self, n)).transpose()?,
                )),
                None => None,
            };
            out.add_mapping(mapping.generated_line, mapping.generated_column, original);
        }
        Ok(out)
    }

    /// Mappings grouped by generated line, for repeated lookups.
    pub(crate) fn lines(&self) -> Lines {
        let mut lines: Vec<Vec<Mapping>> = Vec::new();
        for mapping in self.mappings() {
            let line = mapping.generated_line as usize;
            if lines.len() <= line {
                lines.resize_with(line + 1, Vec::new);
            }
            lines[line].push(mapping);
        }
        for line in &mut lines {
            line.sort_by_key(|m| m.generated_column);
        }
        Lines(lines)
    }

    /// Original position of a zero-based generated `(line, column)`.
    pub fn original_position_for(
        &self,
        line: u32,
        column: u32,
    ) -> Result<Option<OriginalPosition>, SourceMapError> {
        let lines = self.lines();
        let Some(original) = lines.find(line, column).and_then(|m| m.original) else {
            return Ok(None);
        };
        Ok(Some(OriginalPosition {
            source: self.source(original.source)?.to_string(),
            line: original.original_line,
            column: original.original_column,
            name: original.name.map(|n| self.name(n)).transpose()?.map(str::to_string),
        }))
    }
}

/// Mappings of one map, one sorted list per generated line.
pub(crate) struct Lines(Vec<Vec<Mapping>>);

impl Lines {
    /// Segment covering `(line, column)`: the last one starting at or before
    /// it. Columns before the first segment of a line have none.
    pub fn find(&self, line: u32, column: u32) -> Option<&Mapping> {
        let segments = self.0.get(line as usize)?;
        let at = segments.partition_point(|m| m.generated_column <= column);
        at.checked_sub(1).map(|i| &segments[i])
    }
}
