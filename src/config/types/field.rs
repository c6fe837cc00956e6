//! Config field paths.

use owo_colors::Style;
use std::fmt;

use crate::logger::paint;

/// Dotted path of a config field, as written in `kiln.toml`.
///
/// Sections expose their paths as associated constants:
///
/// ```ignore
/// diag.error(BuildConfig::FIELDS.dest, "must differ from `build.src`");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath(pub &'static str);

impl FieldPath {
    #[inline]
    pub const fn new(path: &'static str) -> Self {
        Self(path)
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted = format!("`{}`", self.0);
        write!(f, "{}", paint(&quoted, Style::new().bright_blue()))
    }
}

impl AsRef<str> for FieldPath {
    fn as_ref(&self) -> &str {
        self.0
    }
}
