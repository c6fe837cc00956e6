//! Stage scheduler.
//!
//! Stages are data: an extension set, a transformer and a concurrency mode,
//! kept in registration order. A run walks the stages once:
//!
//! ```text
//! pages ─► stage 0 ─► stage 1 ─► … ─► stage n ─► pages
//!           │
//!           ├─ match: pages whose *current* extension is in the set
//!           ├─ parallel:   one task per page, join, fail after the join
//!           └─ sequential: one page at a time, stop at the first failure
//! ```
//!
//! A page whose extension changes is only seen by later stages. Cancellation
//! is checked between stages, never inside one.

mod cancel;
mod context;
mod error;
mod transform;

#[cfg(test)]
mod tests;

pub use cancel::Cancellation;
pub use context::{BuildContext, StageContext};
pub use error::{BuildReport, Failure, PipelineError, TransformError};
pub use transform::{Accepts, Transformer};

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashSet;

use crate::page::{BinaryContent, Page};
use crate::utils::plural_count;

/// Extension matching every page.
pub const ANY_EXTENSION: &str = "*";

// =============================================================================
// Stage
// =============================================================================

/// How a stage invokes its transformer across the matched pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// All matched pages at once. Failures are collected after the join.
    #[default]
    Parallel,
    /// One page at a time in page-list order. The first failure stops the run.
    Sequential,
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        })
    }
}

pub struct Stage {
    extensions: FxHashSet<String>,
    transformer: Arc<dyn Transformer>,
    mode: Concurrency,
}

impl Stage {
    pub fn name(&self) -> &str {
        self.transformer.name()
    }

    pub fn mode(&self) -> Concurrency {
        self.mode
    }

    pub fn matches(&self, ext: &str) -> bool {
        self.extensions.contains(ANY_EXTENSION) || self.extensions.contains(ext)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name())
            .field("extensions", &self.extensions)
            .field("mode", &self.mode)
            .finish()
    }
}

fn normalize_ext(ext: &str) -> String {
    if ext == ANY_EXTENSION || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Ordered, append-only list of stages.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage running `transformer` on pages with one of `extensions`.
    pub fn add_stage<S: AsRef<str>>(
        &mut self,
        extensions: &[S],
        transformer: Arc<dyn Transformer>,
        mode: Concurrency,
    ) -> &mut Self {
        self.stages.push(Stage {
            extensions: extensions.iter().map(|e| normalize_ext(e.as_ref())).collect(),
            transformer,
            mode,
        });
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage over `pages`.
    ///
    /// Pages are returned in their original order followed by emitted pages
    /// in emission order.
    pub async fn run(
        &self,
        mut pages: Vec<Page>,
        cx: &Arc<BuildContext>,
    ) -> Result<Vec<Page>, PipelineError> {
        let total = self.stages.len();

        for (index, stage) in self.stages.iter().enumerate() {
            if cx.cancel.is_cancelled() {
                cx.logger.debug(
                    "pipeline",
                    &format!("cancelled before stage `{}`", stage.name()),
                );
                return Err(PipelineError::Cancelled {
                    completed: index,
                    total,
                    pages,
                });
            }

            let matched: Vec<usize> = pages
                .iter()
                .enumerate()
                .filter(|(_, page)| stage.matches(page.ext()))
                .map(|(i, _)| i)
                .collect();
            if matched.is_empty() {
                cx.logger
                    .debug("pipeline", &format!("stage `{}` matched nothing", stage.name()));
                continue;
            }

            let started = Instant::now();
            let stage_cx = Arc::new(StageContext::new(cx.clone(), stage.name()));
            let (next, report) = match stage.mode {
                Concurrency::Parallel => run_parallel(stage, pages, &matched, &stage_cx).await,
                Concurrency::Sequential => run_sequential(stage, pages, &matched, &stage_cx).await,
            };
            if !report.is_empty() {
                return Err(PipelineError::Failed(report));
            }

            pages = next;
            let emitted = stage_cx.take_emitted();
            cx.logger.debug(
                "pipeline",
                &format!(
                    "stage `{}` ({}): {} in {:.1?}{}",
                    stage.name(),
                    stage.mode,
                    plural_count(matched.len(), "page"),
                    started.elapsed(),
                    if emitted.is_empty() {
                        String::new()
                    } else {
                        format!(", emitted {}", emitted.len())
                    }
                ),
            );
            pages.extend(emitted);
        }

        Ok(pages)
    }
}

// =============================================================================
// Invocation
// =============================================================================

type Outcome = (Page, Result<(), TransformError>);

/// Run the transformer on one page and fold the map it reported.
async fn invoke(
    transformer: &dyn Transformer,
    page: &mut Page,
    cx: &StageContext,
) -> Result<(), TransformError> {
    match (transformer.accepts(), page.content().is_binary()) {
        (Accepts::Text, true) => {
            return Err(BinaryContent {
                path: page.identity().to_string(),
            }
            .into());
        }
        (Accepts::Binary, false) => {
            return Err(TransformError::TextContent {
                transformer: transformer.name().to_string(),
            });
        }
        _ => {}
    }

    transformer.transform(page, cx).await?;
    cx.build().composer.fold(page)?;
    Ok(())
}

/// Spawn one invocation as its own task so a panic stays contained.
fn spawn(
    stage: &Stage,
    mut page: Page,
    cx: &Arc<StageContext>,
) -> tokio::task::JoinHandle<Outcome> {
    let transformer = stage.transformer.clone();
    let cx = cx.clone();
    tokio::spawn(async move {
        let result = invoke(transformer.as_ref(), &mut page, &cx).await;
        (page, result)
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

async fn join(
    handle: tokio::task::JoinHandle<Outcome>,
) -> Result<Outcome, TransformError> {
    handle.await.map_err(|e| {
        if e.is_panic() {
            TransformError::Panicked(panic_message(e.into_panic()))
        } else {
            TransformError::failed(e)
        }
    })
}

async fn run_parallel(
    stage: &Stage,
    pages: Vec<Page>,
    matched: &[usize],
    cx: &Arc<StageContext>,
) -> (Vec<Page>, BuildReport) {
    let mut slots: Vec<Option<Page>> = pages.into_iter().map(Some).collect();

    let mut handles = Vec::with_capacity(matched.len());
    for &i in matched {
        let Some(page) = slots[i].take() else {
            continue;
        };
        let name = page.identity().to_string();
        handles.push((i, name, spawn(stage, page, cx)));
    }

    // Join everything before reporting, siblings of a failure still finish
    let mut report = BuildReport::new();
    for (i, name, handle) in handles {
        match join(handle).await {
            Ok((page, result)) => {
                if let Err(error) = result {
                    report.push(page.identity(), stage.name(), error);
                }
                slots[i] = Some(page);
            }
            Err(error) => report.push(name, stage.name(), error),
        }
    }

    (slots.into_iter().flatten().collect(), report)
}

async fn run_sequential(
    stage: &Stage,
    pages: Vec<Page>,
    matched: &[usize],
    cx: &Arc<StageContext>,
) -> (Vec<Page>, BuildReport) {
    let mut slots: Vec<Option<Page>> = pages.into_iter().map(Some).collect();
    let mut report = BuildReport::new();

    for &i in matched {
        let Some(page) = slots[i].take() else {
            continue;
        };
        let name = page.identity().to_string();
        match join(spawn(stage, page, cx)).await {
            Ok((page, result)) => {
                slots[i] = Some(page);
                if let Err(error) = result {
                    report.push(name, stage.name(), error);
                    break;
                }
            }
            Err(error) => {
                report.push(name, stage.name(), error);
                break;
            }
        }
    }

    (slots.into_iter().flatten().collect(), report)
}
