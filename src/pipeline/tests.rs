use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use super::*;
use crate::format::Formats;
use crate::logger::Logger;
use crate::page::Page;
use crate::reader::{Fetch, FetchError};
use crate::sourcemap::{OriginalLocation, SourceMap};

struct Offline;

impl Fetch for Offline {
    fn fetch(&self, _url: &Url) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Transport("offline".into()))
    }
}

fn context() -> Arc<BuildContext> {
    Arc::new(BuildContext::new(
        "/site",
        Arc::new(Formats::with_defaults()),
        vec![PathBuf::from("_includes")],
        Arc::new(Offline),
        Logger::capture(true),
    ))
}

fn css(name: &str, text: &str) -> Page {
    Page::new(format!("{name}.css"), ".css", text)
}

fn texts(pages: &[Page]) -> Vec<&str> {
    pages.iter().map(|p| p.text().unwrap()).collect()
}

/// Appends `tag` to every page and records the order it saw pages in.
struct Append {
    tag: &'static str,
    seen: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
    delay_first: bool,
}

impl Append {
    fn new(tag: &'static str) -> Arc<Self> {
        Arc::new(Self {
            tag,
            seen: Mutex::new(Vec::new()),
            fail_on: None,
            delay_first: false,
        })
    }

    fn failing(tag: &'static str, fail_on: &'static str) -> Arc<Self> {
        Arc::new(Self {
            tag,
            seen: Mutex::new(Vec::new()),
            fail_on: Some(fail_on),
            delay_first: false,
        })
    }

    fn slow_first(tag: &'static str) -> Arc<Self> {
        Arc::new(Self {
            tag,
            seen: Mutex::new(Vec::new()),
            fail_on: None,
            delay_first: true,
        })
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transformer for Append {
    fn name(&self) -> &str {
        self.tag
    }

    async fn transform(&self, page: &mut Page, _cx: &StageContext) -> Result<(), TransformError> {
        if self.delay_first && page.identity() == "0.css" {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.seen.lock().push(page.identity().to_string());
        if self.fail_on == Some(page.identity()) {
            return Err(TransformError::failed("boom"));
        }
        let text = format!("{}{}", page.text()?, self.tag);
        page.replace_text(text, None)?;
        Ok(())
    }
}

#[tokio::test]
async fn test_no_matching_stage_is_identity() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage(&[".js"], Append::new("x"), Concurrency::Parallel);

    let pages = pipeline
        .run(vec![css("a", "a{}"), css("b", "b{}")], &context())
        .await
        .unwrap();
    assert_eq!(texts(&pages), vec!["a{}", "b{}"]);
    assert!(pages.iter().all(|p| p.source_map().is_none()));
}

#[tokio::test]
async fn test_empty_pipeline_passes_through() {
    let pages = Pipeline::new().run(vec![css("a", "a")], &context()).await.unwrap();
    assert_eq!(texts(&pages), vec!["a"]);
}

#[tokio::test]
async fn test_stages_run_in_registration_order() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_stage(&[".css"], Append::new("1"), Concurrency::Parallel)
        .add_stage(&["css"], Append::new("2"), Concurrency::Sequential)
        .add_stage(&[".css"], Append::new("3"), Concurrency::Parallel);

    let pages = pipeline.run(vec![css("a", "")], &context()).await.unwrap();
    assert_eq!(texts(&pages), vec!["123"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_keeps_page_order() {
    let stage = Append::slow_first("s");
    let mut pipeline = Pipeline::new();
    pipeline.add_stage(&[".css"], stage.clone(), Concurrency::Sequential);

    let pages = (0..3).map(|i| css(&i.to_string(), "")).collect();
    pipeline.run(pages, &context()).await.unwrap();
    assert_eq!(stage.seen(), vec!["0.css", "1.css", "2.css"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_does_not_wait_for_slow_page() {
    let stage = Append::slow_first("p");
    let mut pipeline = Pipeline::new();
    pipeline.add_stage(&[".css"], stage.clone(), Concurrency::Parallel);

    let pages = (0..3).map(|i| css(&i.to_string(), "")).collect();
    let pages = pipeline.run(pages, &context()).await.unwrap();
    // Output order is page order even though 0.css finished last
    assert_eq!(stage.seen().last().map(String::as_str), Some("0.css"));
    assert_eq!(pages[0].identity(), "0.css");
    assert_eq!(texts(&pages), vec!["p", "p", "p"]);
}

#[tokio::test]
async fn test_parallel_collects_every_failure() {
    struct FailOdd {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transformer for FailOdd {
        fn name(&self) -> &str {
            "fail-odd"
        }

        async fn transform(&self, page: &mut Page, _cx: &StageContext) -> Result<(), TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n: usize = page.dest().parse().unwrap();
            if n % 2 == 1 {
                return Err(TransformError::failed(format!("odd {n}")));
            }
            Ok(())
        }
    }

    let stage = Arc::new(FailOdd {
        calls: AtomicUsize::new(0),
    });
    let after = Append::new("after");
    let mut pipeline = Pipeline::new();
    pipeline
        .add_stage(&[".css"], stage.clone(), Concurrency::Parallel)
        .add_stage(&[".css"], after.clone(), Concurrency::Parallel);

    let pages = (0..4).map(|i| css(&i.to_string(), "")).collect();
    let err = pipeline.run(pages, &context()).await.unwrap_err();

    let PipelineError::Failed(report) = err else {
        panic!("expected failure report");
    };
    assert_eq!(report.paths(), vec!["1.css", "3.css"]);
    assert_eq!(stage.calls.load(Ordering::SeqCst), 4);
    assert!(after.seen().is_empty());
}

#[tokio::test]
async fn test_sequential_stops_at_first_failure() {
    let stage = Append::failing("s", "1.css");
    let after = Append::new("after");
    let mut pipeline = Pipeline::new();
    pipeline
        .add_stage(&[".css"], stage.clone(), Concurrency::Sequential)
        .add_stage(&[".css"], after.clone(), Concurrency::Parallel);

    let pages = (0..3).map(|i| css(&i.to_string(), "")).collect();
    let err = pipeline.run(pages, &context()).await.unwrap_err();

    let PipelineError::Failed(report) = err else {
        panic!("expected failure report");
    };
    assert_eq!(report.paths(), vec!["1.css"]);
    assert_eq!(report.failures()[0].stage, "s");
    assert_eq!(stage.seen(), vec!["0.css", "1.css"]);
    assert!(after.seen().is_empty());
}

struct Rename;

#[async_trait]
impl Transformer for Rename {
    fn name(&self) -> &str {
        "rename"
    }

    async fn transform(&self, page: &mut Page, _cx: &StageContext) -> Result<(), TransformError> {
        page.set_ext(".css");
        Ok(())
    }
}

#[tokio::test]
async fn test_extension_change_not_matched_retroactively() {
    let before = Append::new("before");
    let after = Append::new("after");
    let mut pipeline = Pipeline::new();
    pipeline
        .add_stage(&[".css"], before.clone(), Concurrency::Parallel)
        .add_stage(&[".scss"], Arc::new(Rename), Concurrency::Parallel)
        .add_stage(&[".css"], after.clone(), Concurrency::Parallel);

    let page = Page::new("main.scss", ".scss", "");
    let pages = pipeline.run(vec![page], &context()).await.unwrap();

    assert!(before.seen().is_empty());
    assert_eq!(after.seen(), vec!["main.scss"]);
    assert_eq!(pages[0].output_path(), PathBuf::from("main.css"));
}

#[tokio::test]
async fn test_wildcard_matches_every_page() {
    let all = Append::new("!");
    let mut pipeline = Pipeline::new();
    pipeline.add_stage(&[ANY_EXTENSION], all.clone(), Concurrency::Parallel);

    let pages = vec![css("a", ""), Page::new("b.js", ".js", "")];
    let pages = pipeline.run(pages, &context()).await.unwrap();
    assert_eq!(texts(&pages), vec!["!", "!"]);
}

#[tokio::test]
async fn test_text_transformer_rejects_binary() {
    let stage = Append::new("x");
    let mut pipeline = Pipeline::new();
    pipeline.add_stage(&[".png"], stage.clone(), Concurrency::Parallel);

    let page = Page::new("img/logo.png", ".png", vec![0x89, 0x50]);
    let err = pipeline.run(vec![page], &context()).await.unwrap_err();

    let PipelineError::Failed(report) = err else {
        panic!("expected failure report");
    };
    assert!(matches!(
        report.failures()[0].error,
        TransformError::BinaryContent(_)
    ));
    assert_eq!(report.paths(), vec!["img/logo.png"]);
    assert!(stage.seen().is_empty());
}

struct Bundle;

#[async_trait]
impl Transformer for Bundle {
    fn name(&self) -> &str {
        "bundle"
    }

    async fn transform(&self, page: &mut Page, cx: &StageContext) -> Result<(), TransformError> {
        cx.emit(Page::synthetic(
            &format!("{}.bundle.css", page.dest()),
            page.text()?.to_string(),
        ));
        Ok(())
    }
}

#[tokio::test]
async fn test_emitted_pages_only_reach_later_stages() {
    let same = Append::new("same");
    let later = Append::new("later");
    let mut pipeline = Pipeline::new();
    pipeline
        .add_stage(&[".css"], Arc::new(Bundle), Concurrency::Sequential)
        .add_stage(&[".js"], same.clone(), Concurrency::Parallel)
        .add_stage(&[".css"], later.clone(), Concurrency::Sequential);

    let pages = pipeline.run(vec![css("main", "a{}")], &context()).await.unwrap();

    assert_eq!(pages.len(), 2);
    assert!(pages[1].is_synthetic());
    assert_eq!(pages[1].output_path(), PathBuf::from("main.bundle.css"));
    assert_eq!(later.seen(), vec!["main.css", "main.bundle.css"]);
}

struct CancelDuring(Cancellation);

#[async_trait]
impl Transformer for CancelDuring {
    fn name(&self) -> &str {
        "cancel"
    }

    async fn transform(&self, page: &mut Page, _cx: &StageContext) -> Result<(), TransformError> {
        self.0.cancel();
        page.replace_text("cancelled", None)?;
        Ok(())
    }
}

#[tokio::test]
async fn test_cancel_stops_at_stage_boundary() {
    let cancel = Cancellation::new();
    let cx = BuildContext::new(
        "/site",
        Arc::new(Formats::with_defaults()),
        Vec::new(),
        Arc::new(Offline),
        Logger::capture(false),
    )
    .with_cancellation(cancel.clone());

    let after = Append::new("after");
    let mut pipeline = Pipeline::new();
    pipeline
        .add_stage(&[".css"], Arc::new(CancelDuring(cancel)), Concurrency::Parallel)
        .add_stage(&[".css"], after.clone(), Concurrency::Parallel);

    let err = pipeline
        .run(vec![css("a", ""), css("b", "")], &Arc::new(cx))
        .await
        .unwrap_err();

    let PipelineError::Cancelled {
        completed,
        total,
        pages,
    } = err
    else {
        panic!("expected cancellation");
    };
    assert_eq!((completed, total), (1, 2));
    // The running stage finished for every page
    assert_eq!(texts(&pages), vec!["cancelled", "cancelled"]);
    assert!(after.seen().is_empty());
}

struct Panics;

#[async_trait]
impl Transformer for Panics {
    fn name(&self) -> &str {
        "panics"
    }

    async fn transform(&self, _page: &mut Page, _cx: &StageContext) -> Result<(), TransformError> {
        panic!("broken plugin");
    }
}

#[tokio::test]
async fn test_panic_is_attributed_to_page() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage(&[".css"], Arc::new(Panics), Concurrency::Sequential);

    let err = pipeline.run(vec![css("a", "")], &context()).await.unwrap_err();
    let PipelineError::Failed(report) = err else {
        panic!("expected failure report");
    };
    assert_eq!(report.paths(), vec!["a.css"]);
    match &report.failures()[0].error {
        TransformError::Panicked(message) => assert_eq!(message, "broken plugin"),
        other => panic!("unexpected error: {other}"),
    }
}

/// Prefixes every line with two spaces and reports the shift as a map.
struct Indent;

#[async_trait]
impl Transformer for Indent {
    fn name(&self) -> &str {
        "indent"
    }

    async fn transform(&self, page: &mut Page, cx: &StageContext) -> Result<(), TransformError> {
        let text = page.text()?;
        let indented: Vec<String> = text.lines().map(|l| format!("  {l}")).collect();

        // Columns 2 and 4 of each new line are columns 0 and 2 of the old one
        let mut map = SourceMap::new(cx.root());
        let source = map.add_source(page.identity());
        for line in 0..indented.len() as u32 {
            for column in [0, 2] {
                let original = OriginalLocation::new(line, column, source, None);
                map.add_mapping(line, column + 2, Some(original));
            }
        }
        page.replace_text(indented.join("\n"), Some(map))?;
        Ok(())
    }
}

/// Two mapped edits in one invocation: shift right by 2 columns, then move
/// the line down by one.
struct ShiftThenDrop;

fn single_source_map(cx: &StageContext, page: &Page, mappings: &str) -> SourceMap {
    let json = format!(
        r#"{{"version":3,"sources":["{}"],"names":[],"mappings":"{mappings}"}}"#,
        page.identity()
    );
    SourceMap::from_json(cx.root(), &json).unwrap()
}

#[async_trait]
impl Transformer for ShiftThenDrop {
    fn name(&self) -> &str {
        "shift-then-drop"
    }

    async fn transform(&self, page: &mut Page, cx: &StageContext) -> Result<(), TransformError> {
        let shifted = format!("..{}", page.text()?);
        let map = single_source_map(cx, page, "EAAA,IAAI");
        page.replace_text(shifted.clone(), Some(map))?;

        let dropped = format!("\n{shifted}");
        let map = single_source_map(cx, page, ";AAAA,MAAM");
        page.replace_text(dropped, Some(map))?;
        Ok(())
    }
}

#[tokio::test]
async fn test_two_mapped_edits_in_one_invocation_reach_original() {
    let mut pipeline = Pipeline::new();
    pipeline.add_stage(&[".css"], Arc::new(ShiftThenDrop), Concurrency::Parallel);

    let pages = pipeline
        .run(vec![css("page", "0123456789")], &context())
        .await
        .unwrap();
    let page = &pages[0];
    assert_eq!(page.text().unwrap(), "\n..0123456789");

    let map = page.source_map().unwrap();
    let pos = map.original_position_for(1, 6).unwrap().unwrap();
    assert_eq!((pos.source.as_str(), pos.line, pos.column), ("page.css", 0, 4));
    assert!(map.original_position_for(1, 0).unwrap().is_none());
    assert_eq!(map.source_content(0), Some("0123456789"));
}

#[tokio::test]
async fn test_maps_fold_to_original_across_stages() {
    let mut pipeline = Pipeline::new();
    pipeline
        .add_stage(&[".css"], Arc::new(Indent), Concurrency::Parallel)
        .add_stage(&[".css"], Append::new("/* x */"), Concurrency::Parallel)
        .add_stage(&[".css"], Arc::new(Indent), Concurrency::Sequential);

    let pages = pipeline
        .run(vec![css("main", "a{}\nb{}")], &context())
        .await
        .unwrap();
    let page = &pages[0];
    assert_eq!(page.text().unwrap(), "    a{}\n    b{}/* x */");

    let map = page.source_map().unwrap();
    assert_eq!(map.file.as_deref(), Some("main.css"));
    assert_eq!(map.sources(), ["main.css"]);
    assert_eq!(map.source_content(0), Some("a{}\nb{}"));

    let pos = map.original_position_for(1, 4).unwrap().unwrap();
    assert_eq!((pos.source.as_str(), pos.line, pos.column), ("main.css", 1, 0));
}
