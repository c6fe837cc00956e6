//! Pipeline error types.

use owo_colors::Style;
use std::fmt;
use thiserror::Error;

use crate::logger::paint;
use crate::page::{BinaryContent, Page};
use crate::reader::ReadError;
use crate::resolve::ResolveError;
use crate::sourcemap::SourceMapError;
use crate::utils::plural_count;

// ============================================================================
// TransformError
// ============================================================================

/// Failure of one transformer invocation on one page.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    BinaryContent(#[from] BinaryContent),

    #[error("`{transformer}` only accepts binary content")]
    TextContent { transformer: String },

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("source map: {0}")]
    SourceMap(#[from] SourceMapError),

    #[error("{0}")]
    Failed(String),

    #[error("transformer panicked: {0}")]
    Panicked(String),
}

impl TransformError {
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

// ============================================================================
// BuildReport
// ============================================================================

/// A failed invocation, attributed to its page.
#[derive(Debug)]
pub struct Failure {
    /// Root-relative page name.
    pub path: String,
    pub stage: String,
    pub error: TransformError,
}

/// Every failure of a run.
#[derive(Debug, Default)]
pub struct BuildReport {
    failures: Vec<Failure>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, stage: impl Into<String>, error: TransformError) {
        self.failures.push(Failure {
            path: path.into(),
            stage: stage.into(),
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Paths of the failed pages, in report order.
    pub fn paths(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.path.as_str()).collect()
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim = Style::new().dimmed();
        let header = format!("build failed, {}:", plural_count(self.len(), "file"));
        writeln!(f, "{}", paint(&header, Style::new().red().bold()))?;
        for (i, failure) in self.failures.iter().enumerate() {
            writeln!(f)?;
            writeln!(
                f,
                "{}{}{} {}",
                paint(&"[", dim),
                paint(&failure.path, Style::new().cyan()),
                paint(&"]", dim),
                paint(&failure.stage, dim)
            )?;
            write!(f, "{} {}", paint(&"→", Style::new().red()), failure.error)?;
            if i + 1 < self.failures.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// PipelineError
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Failed(BuildReport),

    /// The run stopped at a stage boundary; `pages` are as the last
    /// completed stage left them.
    #[error("build cancelled after {completed} of {total} stages")]
    Cancelled {
        completed: usize,
        total: usize,
        pages: Vec<Page>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lists_every_path() {
        owo_colors::set_override(false);
        let mut report = BuildReport::new();
        report.push("a.css", "css", TransformError::failed("bad token"));
        report.push("b.css", "css", TransformError::failed("eof"));

        assert_eq!(report.paths(), vec!["a.css", "b.css"]);
        let text = report.to_string();
        assert!(text.starts_with("build failed, 2 files:"));
        assert!(text.contains("[a.css] css\n→ bad token"));
        assert!(text.contains("[b.css] css\n→ eof"));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_binary_content_names_page() {
        let err = TransformError::from(BinaryContent {
            path: "img/a.png".into(),
        });
        assert_eq!(err.to_string(), "`img/a.png` has binary content, text was expected");
    }
}
