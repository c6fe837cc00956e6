//! Transformer trait.

use async_trait::async_trait;

use super::context::StageContext;
use super::error::TransformError;
use crate::page::Page;

/// Content a transformer can work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accepts {
    #[default]
    Text,
    Binary,
    Any,
}

/// A processor run on every page a stage matches.
///
/// Implementations replace the page content in place. Text transformers
/// that can describe their edit pass a source map to
/// [`Page::replace_text`]; the scheduler folds it into the page map once
/// the call returns.
///
/// # Example
///
/// ```ignore
/// struct Uppercase;
///
/// #[async_trait]
/// impl Transformer for Uppercase {
///     fn name(&self) -> &str { "uppercase" }
///
///     async fn transform(&self, page: &mut Page, _cx: &StageContext) -> Result<(), TransformError> {
///         let text = page.text()?.to_uppercase();
///         page.replace_text(text, None)?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Checked by the scheduler before [`Transformer::transform`] is called.
    fn accepts(&self) -> Accepts {
        Accepts::Text
    }

    async fn transform(&self, page: &mut Page, cx: &StageContext) -> Result<(), TransformError>;
}
