//! Stylesheets through lightningcss.
//!
//! Two transformers share the same parse/minify/print path:
//! - [`CssTransform`] handles each stylesheet on its own (parallel stage)
//! - [`CssBundle`] inlines `@import`s first (sequential stage)
//!
//! The bundler runs one page at a time: its sources are pre-read per page
//! and concurrent bundles have been seen to mix their imports.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use lightningcss::bundler::{Bundler, SourceProvider};
use lightningcss::stylesheet::{MinifyOptions, ParserFlags, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap as ParcelMap;
use regex::Regex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use url::Url;

use super::is_minified;
use crate::page::Page;
use crate::pipeline::{StageContext, TransformError, Transformer};
use crate::resolve::Location;
use crate::sourcemap::SourceMap;
use crate::utils::path::parse_remote;

/// Encode a browser version the way lightningcss expects it.
pub const fn version(major: u32, minor: u32, patch: u32) -> u32 {
    (major << 16) | (minor << 8) | patch
}

/// Default browser targets.
pub fn default_targets() -> Targets {
    Targets {
        browsers: Some(Browsers {
            android: Some(version(98, 0, 0)),
            chrome: Some(version(98, 0, 0)),
            edge: Some(version(98, 0, 0)),
            firefox: Some(version(97, 0, 0)),
            ios_saf: Some(version(15, 0, 0)),
            safari: Some(version(15, 0, 0)),
            opera: Some(version(83, 0, 0)),
            samsung: Some(version(16, 0, 0)),
            ..Browsers::default()
        }),
        ..Targets::default()
    }
}

#[derive(Debug, Clone)]
pub struct CssOptions {
    pub minify: bool,
    pub source_maps: bool,
    pub targets: Targets,
}

impl Default for CssOptions {
    fn default() -> Self {
        Self {
            minify: true,
            source_maps: true,
            targets: default_targets(),
        }
    }
}

fn parser_options<'o, 'i>(filename: String) -> ParserOptions<'o, 'i> {
    ParserOptions {
        filename,
        flags: ParserFlags::CUSTOM_MEDIA,
        ..ParserOptions::default()
    }
}

/// Minify and print `sheet`, filling `map` if there is one.
fn print(
    mut sheet: StyleSheet<'_, '_>,
    options: &CssOptions,
    map: &mut Option<ParcelMap>,
) -> Result<String, TransformError> {
    sheet
        .minify(MinifyOptions {
            targets: options.targets.clone(),
            ..MinifyOptions::default()
        })
        .map_err(TransformError::failed)?;

    let result = sheet
        .to_css(PrinterOptions {
            minify: options.minify,
            source_map: map.as_mut(),
            targets: options.targets.clone(),
            ..PrinterOptions::default()
        })
        .map_err(TransformError::failed)?;
    Ok(result.code)
}

fn replace(page: &mut Page, code: String, map: Option<ParcelMap>) -> Result<(), TransformError> {
    page.replace_text(code, map.map(SourceMap::from_parcel))?;
    Ok(())
}

fn root_str(cx: &StageContext) -> String {
    cx.root().to_string_lossy().into_owned()
}

// ============================================================================
// Transform
// ============================================================================

/// Parse, minify and print one stylesheet.
#[derive(Debug, Default)]
pub struct CssTransform {
    options: CssOptions,
}

impl CssTransform {
    pub fn new(options: CssOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Transformer for CssTransform {
    fn name(&self) -> &str {
        "lightningcss"
    }

    async fn transform(&self, page: &mut Page, cx: &StageContext) -> Result<(), TransformError> {
        if is_minified(page) {
            return Ok(());
        }

        let filename = cx.root().join(page.identity()).to_string_lossy().into_owned();
        let (code, map) = {
            let text = page.text()?;
            let sheet = StyleSheet::parse(text, parser_options(filename))
                .map_err(TransformError::failed)?;
            let mut map = self.options.source_maps.then(|| {
                let mut map = ParcelMap::new(&root_str(cx));
                for source in &sheet.sources {
                    map.add_source(source);
                }
                map
            });
            (print(sheet, &self.options, &mut map)?, map)
        };
        replace(page, code, map)
    }
}

// ============================================================================
// Bundle
// ============================================================================

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import[ \t\r\n]+(?:url\([ \t\r\n]*)?["']?([^"'); \t\r\n]+)"#).unwrap()
});

/// `@import` specifiers of a stylesheet, comments ignored.
pub fn imports(css: &str) -> Vec<String> {
    let stripped = COMMENT.replace_all(css, "");
    IMPORT
        .captures_iter(&stripped)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Error)]
pub enum BundleSourceError {
    #[error("`{0}` was not loaded")]
    NotLoaded(String),

    #[error("cannot resolve `{specifier}` from `{from}`")]
    Unresolved { specifier: String, from: String },
}

/// Files of one bundle, read ahead of time.
///
/// Keys are absolute paths for local files and the URL text for remote ones.
#[derive(Debug, Default)]
struct Sources {
    files: FxHashMap<PathBuf, String>,
    resolved: FxHashMap<(PathBuf, String), PathBuf>,
}

impl SourceProvider for Sources {
    type Error = BundleSourceError;

    fn read<'a>(&'a self, file: &Path) -> Result<&'a str, Self::Error> {
        self.files
            .get(file)
            .map(String::as_str)
            .ok_or_else(|| BundleSourceError::NotLoaded(file.display().to_string()))
    }

    fn resolve(&self, specifier: &str, originating_file: &Path) -> Result<PathBuf, Self::Error> {
        self.resolved
            .get(&(originating_file.to_path_buf(), specifier.to_string()))
            .cloned()
            .ok_or_else(|| BundleSourceError::Unresolved {
                specifier: specifier.to_string(),
                from: originating_file.display().to_string(),
            })
    }
}

/// Where an already loaded file resolves its own imports from.
enum Base {
    /// Root-relative directory.
    Local(PathBuf),
    Remote(Url),
}

/// Inline `@import`s, then minify and print.
#[derive(Debug, Default)]
pub struct CssBundle {
    options: CssOptions,
}

impl CssBundle {
    pub fn new(options: CssOptions) -> Self {
        Self { options }
    }

    fn key(cx: &StageContext, location: &Location) -> PathBuf {
        match location {
            Location::Local(path) => cx.root().join(path),
            Location::Remote(url) => PathBuf::from(url.as_str()),
        }
    }

    async fn resolve(cx: &StageContext, base: &Base, specifier: &str) -> Result<Location, TransformError> {
        if let Some(url) = parse_remote(specifier) {
            return Ok(Location::Remote(url));
        }
        match base {
            // Imports inside remote stylesheets are relative to their URL
            Base::Remote(url) => url
                .join(specifier)
                .map(Location::Remote)
                .map_err(TransformError::failed),
            Base::Local(dir) => Ok(cx.locate(specifier, dir).await?),
        }
    }

    fn base_of(location: &Location) -> Base {
        match location {
            Location::Remote(url) => Base::Remote(url.clone()),
            Location::Local(path) => {
                Base::Local(path.parent().map(Path::to_path_buf).unwrap_or_default())
            }
        }
    }

    /// Read the page and everything it imports, transitively.
    async fn collect(
        &self,
        cx: &StageContext,
        entry: PathBuf,
        entry_dir: PathBuf,
        text: String,
    ) -> Result<Sources, TransformError> {
        let mut sources = Sources::default();
        let mut queue = vec![(entry.clone(), Base::Local(entry_dir), imports(&text))];
        sources.files.insert(entry, text);

        while let Some((file, base, specifiers)) = queue.pop() {
            for specifier in specifiers {
                let location = Self::resolve(cx, &base, &specifier).await?;
                let key = Self::key(cx, &location);
                sources
                    .resolved
                    .insert((file.clone(), specifier), key.clone());
                if sources.files.contains_key(&key) {
                    continue;
                }

                let text = cx.reader().read_text(&location).await?;
                queue.push((key.clone(), Self::base_of(&location), imports(&text)));
                sources.files.insert(key, text);
            }
        }

        Ok(sources)
    }
}

#[async_trait]
impl Transformer for CssBundle {
    fn name(&self) -> &str {
        "lightningcss-bundle"
    }

    async fn transform(&self, page: &mut Page, cx: &StageContext) -> Result<(), TransformError> {
        if is_minified(page) {
            return Ok(());
        }

        let entry = cx.root().join(page.identity());
        let entry_dir = Path::new(page.identity())
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let text = page.text()?.to_string();
        let sources = self.collect(cx, entry.clone(), entry_dir, text).await?;
        cx.logger().debug(
            "css",
            &format!("{}: bundling {} files", page.identity(), sources.files.len()),
        );

        let mut map = self.options.source_maps.then(|| ParcelMap::new(&root_str(cx)));
        let sheet = {
            let mut bundler = Bundler::new(&sources, map.as_mut(), parser_options(String::new()));
            bundler.bundle(&entry).map_err(TransformError::failed)?
        };
        let code = print(sheet, &self.options, &mut map)?;
        replace(page, code, map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Formats;
    use crate::logger::Logger;
    use crate::pipeline::{BuildContext, Concurrency, Pipeline, PipelineError};
    use crate::reader::{Fetch, FetchError};
    use std::fs;
    use std::sync::Arc;

    struct Cdn;

    impl Fetch for Cdn {
        fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
            match url.path() {
                "/reset.css" => Ok(b"@import \"base.css\";\nhtml { margin: 0 }".to_vec()),
                "/base.css" => Ok(b"body { padding: 0 }".to_vec()),
                _ => Err(FetchError::Status(404)),
            }
        }
    }

    fn site(files: &[(&str, &str)]) -> (tempfile::TempDir, Arc<BuildContext>) {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        let cx = BuildContext::new(
            dir.path(),
            Arc::new(Formats::with_defaults()),
            vec![PathBuf::from("_includes")],
            Arc::new(Cdn),
            Logger::capture(false),
        );
        (dir, Arc::new(cx))
    }

    async fn run(
        stage: Arc<dyn Transformer>,
        mode: Concurrency,
        page: Page,
        cx: &Arc<BuildContext>,
    ) -> Result<Page, PipelineError> {
        let mut pipeline = Pipeline::new();
        pipeline.add_stage(&[".css"], stage, mode);
        let mut pages = pipeline.run(vec![page], cx).await?;
        Ok(pages.remove(0))
    }

    #[test]
    fn test_imports_skip_comments() {
        let css = r#"
            @import "a.css";
            /* @import "commented.css"; */
            @import url(./b.css) screen;
            @import url( 'https://cdn.test/c.css' );
            a { color: red }
        "#;
        assert_eq!(imports(css), vec!["a.css", "./b.css", "https://cdn.test/c.css"]);
    }

    #[test]
    fn test_version_encoding() {
        assert_eq!(version(98, 0, 0), 98 << 16);
        assert_eq!(version(15, 4, 1), (15 << 16) | (4 << 8) | 1);
    }

    #[tokio::test]
    async fn test_transform_minifies_with_map() {
        let (_dir, cx) = site(&[]);
        let page = Page::new("styles/main.css", ".css", "a {\n  color: #ff0000;\n}\n");
        let page = run(Arc::new(CssTransform::default()), Concurrency::Parallel, page, &cx)
            .await
            .unwrap();

        assert_eq!(page.text().unwrap(), "a{color:red}");
        let map = page.source_map().unwrap();
        assert_eq!(map.sources(), ["styles/main.css"]);
        assert_eq!(
            map.source_content(0),
            Some("a {\n  color: #ff0000;\n}\n")
        );
        let pos = map.original_position_for(0, 0).unwrap().unwrap();
        assert_eq!(pos.source, "styles/main.css");
        assert_eq!(pos.line, 0);
    }

    #[tokio::test]
    async fn test_transform_skips_minified_files() {
        let (_dir, cx) = site(&[]);
        let page = Page::new("vendor/x.min.css", ".css", "a {  }");
        let page = run(Arc::new(CssTransform::default()), Concurrency::Parallel, page, &cx)
            .await
            .unwrap();
        assert_eq!(page.text().unwrap(), "a {  }");
        assert!(page.source_map().is_none());
    }

    #[tokio::test]
    async fn test_bundle_inlines_includes_and_remote() {
        let (_dir, cx) = site(&[
            ("_includes/vars.css", ".vars { color: blue }"),
            ("styles/local.css", ".local { color: green }"),
        ]);
        let page = Page::new(
            "styles/main.css",
            ".css",
            "@import \"vars.css\";\n@import \"./local.css\";\n@import \"https://cdn.test/reset.css\";\n.main { color: red }\n",
        );
        let page = run(Arc::new(CssBundle::default()), Concurrency::Sequential, page, &cx)
            .await
            .unwrap();

        let text = page.text().unwrap();
        assert!(!text.contains("@import"));
        for needle in [".vars", ".local", "html{margin:0}", "body{padding:0}", ".main"] {
            assert!(text.contains(needle), "missing {needle} in {text}");
        }

        let map = page.source_map().unwrap();
        for source in [
            "styles/main.css",
            "_includes/vars.css",
            "styles/local.css",
            "https://cdn.test/reset.css",
        ] {
            assert!(map.sources().iter().any(|s| s == source), "missing source {source}");
        }
    }

    #[tokio::test]
    async fn test_bundle_missing_import_fails_with_page_path() {
        let (_dir, cx) = site(&[]);
        let page = Page::new("styles/main.css", ".css", "@import \"nope.css\";");
        let err = run(Arc::new(CssBundle::default()), Concurrency::Sequential, page, &cx)
            .await
            .unwrap_err();
        let PipelineError::Failed(report) = err else {
            panic!("expected failure report");
        };
        assert_eq!(report.paths(), vec!["styles/main.css"]);
        assert!(report.to_string().contains("nope.css"));
    }
}
