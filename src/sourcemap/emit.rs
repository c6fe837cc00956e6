//! Writing maps next to their outputs.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use url::Url;

use super::{RawSourceMap, SourceMap, SourceMapError};
use crate::utils::path::clean_path;

const MARKER: &str = "# sourceMappingURL=";

/// Path of the external map for `output` (`a.css` -> `a.css.map`).
pub fn map_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".map");
    PathBuf::from(name)
}

/// `data:` URL embedding the map JSON.
pub fn inline_url(json: &str) -> String {
    format!(
        "data:application/json;charset=utf-8;base64,{}",
        STANDARD.encode(json)
    )
}

/// JSON of `map` ready to be written for the output file `file_name`.
///
/// Sources are root-relative, so the emitted map uses `/` as source root.
/// A map with a remote source or one outside the root gets no source root:
/// local sources are spelled `/path` and those outside the root become
/// `file://` URLs, so no source is ever joined onto `/` as `//host/...`.
pub fn prepare_for_output(
    map: &SourceMap,
    file_name: &str,
    sources_content: bool,
) -> Result<RawSourceMap, SourceMapError> {
    let mut out = map.to_raw()?;
    out.file = Some(file_name.to_string());
    if !sources_content {
        out.sources_content.clear();
    }

    if out.sources.iter().all(|s| is_under_root(s)) {
        out.source_root = Some("/".to_string());
        return Ok(out);
    }
    let root = Path::new(map.root());
    for source in &mut out.sources {
        if is_under_root(source) {
            *source = format!("/{source}");
        } else if !source.contains("://") {
            let absolute = clean_path(&root.join(&*source));
            if let Ok(url) = Url::from_file_path(&absolute) {
                *source = url.to_string();
            }
        }
    }
    Ok(out)
}

/// Root-relative local source that stays inside the root.
fn is_under_root(source: &str) -> bool {
    !source.contains("://") && !source.starts_with('/') && !source.split('/').any(|part| part == "..")
}

/// Append a `sourceMappingURL` annotation in the comment syntax of `ext`.
///
/// A trailing annotation left by a transformer is replaced. Returns `false`
/// when the format has no comment syntax for it.
pub fn annotate(content: &mut String, ext: &str, url: &str) -> bool {
    let (open, close) = match ext {
        ".css" => ("/*", " */"),
        ".js" | ".mjs" | ".cjs" => ("//", ""),
        _ => return false,
    };

    strip_annotation(content);
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(open);
    content.push_str(MARKER);
    content.push_str(url);
    content.push_str(close);
    content.push('\n');
    true
}

fn strip_annotation(content: &mut String) {
    let trimmed = content.trim_end().len();
    let line_start = content[..trimmed].rfind('\n').map_or(0, |i| i + 1);
    let last = &content[line_start..trimmed];
    if last.starts_with(&format!("/*{MARKER}")) || last.starts_with(&format!("//{MARKER}")) {
        content.truncate(line_start);
    }
}
