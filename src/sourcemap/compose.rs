//! Map composition.
//!
//! `compose(previous, next)` is function composition: `previous` maps the
//! intermediate content back to the original, `next` maps the new content
//! to the intermediate one. The result maps the new content straight to the
//! original.

use std::path::{Path, PathBuf};

use super::{OriginalLocation, SourceMap, SourceMapError};
use crate::page::Page;

/// Compose `next` onto `previous`.
///
/// Only mappings of `next` whose source is `previous.file` are traced
/// through `previous`; mappings into other sources (inlined imports) are
/// kept. A traced mapping that lands on an unmapped position of `previous`
/// becomes an unmapped segment, so it cannot fall back to an earlier one.
/// The result keeps the root of `next`.
pub fn compose(previous: Option<&SourceMap>, next: &SourceMap) -> Result<SourceMap, SourceMapError> {
    let Some(previous) = previous else {
        return Ok(next.clone());
    };

    let before = previous.lines();
    let intermediate = previous.file.as_deref();

    let mut out = SourceMap::new(Path::new(next.root()));
    out.file = next.file.clone().or_else(|| previous.file.clone());

    for mapping in next.mappings() {
        let (line, column) = (mapping.generated_line, mapping.generated_column);
        let Some(original) = mapping.original else {
            out.add_mapping(line, column, None);
            continue;
        };

        let source = next.source(original.source)?;
        if !intermediate.is_none_or(|file| file == source) {
            let location = OriginalLocation::new(
                original.original_line,
                original.original_column,
                out.import_source(next, original.source)?,
                original.name.map(|n| out.import_name(next, n)).transpose()?,
            );
            out.add_mapping(line, column, Some(location));
            continue;
        }

        let Some(traced) = before
            .find(original.original_line, original.original_column)
            .and_then(|m| m.original)
        else {
            out.add_mapping(line, column, None);
            continue;
        };

        let name = match traced.name {
            Some(n) => Some(out.import_name(previous, n)?),
            None => original.name.map(|n| out.import_name(next, n)).transpose()?,
        };
        let location = OriginalLocation::new(
            traced.original_line,
            traced.original_column,
            out.import_source(previous, traced.source)?,
            name,
        );
        out.add_mapping(line, column, Some(location));
    }

    Ok(out)
}

/// Folds transformation maps into page maps, with source paths expressed
/// relative to one project root.
#[derive(Debug, Clone)]
pub struct Composer {
    root: PathBuf,
}

impl Composer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Re-express the sources of `map` relative to the root and name the
    /// map after `file`.
    pub fn normalize(&self, map: SourceMap, file: &str) -> Result<SourceMap, SourceMapError> {
        let mut map = map.rebase(&self.root)?;
        map.file = Some(file.to_string());
        Ok(map)
    }

    /// Fold the map staged by the last transformation into the page map.
    ///
    /// Pages whose transformation reported no map keep their map as is.
    pub fn fold(&self, page: &mut Page) -> Result<(), SourceMapError> {
        let Some(staged) = page.take_staged() else {
            return Ok(());
        };

        let identity = page.identity().to_string();
        let mut next = self.normalize(staged.map, &identity)?;
        if let Some(input) = staged.input {
            let missing = next
                .sources()
                .iter()
                .position(|s| *s == identity)
                .is_some_and(|i| next.source_content(i as u32).is_none());
            if missing {
                next.set_source_content(&identity, &input)?;
            }
        }

        let composed = compose(page.source_map(), &next)?;
        page.set_source_map(composed);
        Ok(())
    }
}
