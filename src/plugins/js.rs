//! JavaScript minification with oxc.

use std::path::PathBuf;

use async_trait::async_trait;
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::is_minified;
use crate::page::Page;
use crate::pipeline::{StageContext, TransformError, Transformer};
use crate::sourcemap::SourceMap;

#[derive(Debug, Clone, Copy)]
pub struct JsOptions {
    pub source_maps: bool,
}

impl Default for JsOptions {
    fn default() -> Self {
        Self { source_maps: true }
    }
}

/// Minified code and map JSON for `source`.
///
/// `source_path` is recorded as the map source.
pub fn minify_js(source: &str, source_path: Option<PathBuf>) -> Result<(String, Option<String>), String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(error.to_string());
    }

    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let output = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            source_map_path: source_path,
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program);

    Ok((output.code, output.map.map(|map| map.to_json_string())))
}

#[derive(Debug, Default)]
pub struct JsMinify {
    options: JsOptions,
}

impl JsMinify {
    pub fn new(options: JsOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Transformer for JsMinify {
    fn name(&self) -> &str {
        "oxc-minify"
    }

    async fn transform(&self, page: &mut Page, cx: &StageContext) -> Result<(), TransformError> {
        if is_minified(page) {
            return Ok(());
        }

        let source_path = self
            .options
            .source_maps
            .then(|| cx.root().join(page.identity()));
        let (code, json) = minify_js(page.text()?, source_path).map_err(TransformError::Failed)?;
        let map = json
            .as_deref()
            .map(|json| SourceMap::from_json(cx.root(), json))
            .transpose()?;
        page.replace_text(code, map)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Formats;
    use crate::logger::Logger;
    use crate::pipeline::{BuildContext, Concurrency, Pipeline, PipelineError};
    use crate::reader::{Fetch, FetchError};
    use std::sync::Arc;
    use url::Url;

    struct Offline;

    impl Fetch for Offline {
        fn fetch(&self, _url: &Url) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status(503))
        }
    }

    fn context() -> Arc<BuildContext> {
        Arc::new(BuildContext::new(
            "/site",
            Arc::new(Formats::with_defaults()),
            Vec::new(),
            Arc::new(Offline),
            Logger::capture(false),
        ))
    }

    #[test]
    fn test_minify_js_shrinks() {
        let source = "function add(first, second) {\n  return first + second;\n}\nexport { add };\n";
        let (code, map) = minify_js(source, None).unwrap();
        assert!(code.len() < source.len());
        assert!(map.is_none());
    }

    #[test]
    fn test_minify_js_reports_syntax_errors() {
        assert!(minify_js("let = ;", None).is_err());
    }

    #[tokio::test]
    async fn test_stage_maps_back_to_source() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(&[".js"], Arc::new(JsMinify::default()), Concurrency::Parallel);

        let source = "export const greeting = 'hello';\n";
        let page = Page::new("scripts/app.js", ".js", source);
        let pages = pipeline.run(vec![page], &context()).await.unwrap();

        let map = pages[0].source_map().unwrap();
        assert_eq!(map.sources(), ["scripts/app.js"]);
        assert_eq!(map.file.as_deref(), Some("scripts/app.js"));
        let pos = map.original_position_for(0, 0).unwrap().unwrap();
        assert_eq!((pos.source.as_str(), pos.line), ("scripts/app.js", 0));
    }

    #[tokio::test]
    async fn test_syntax_error_names_page() {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(&[".js"], Arc::new(JsMinify::default()), Concurrency::Parallel);

        let pages = vec![
            Page::new("ok.js", ".js", "export const a = 1;"),
            Page::new("broken.js", ".js", "let = ;"),
        ];
        let err = pipeline.run(pages, &context()).await.unwrap_err();
        let PipelineError::Failed(report) = err else {
            panic!("expected failure report");
        };
        assert_eq!(report.paths(), vec!["broken.js"]);
    }
}
