//! Built-in transformers and their registration.

pub mod css;
pub mod js;

use std::sync::Arc;

use crate::config::SiteConfig;
use crate::format::{FormatOptions, Formats, TextLoader};
use crate::page::Page;
use crate::pipeline::{Concurrency, Pipeline};

pub use css::{CssBundle, CssOptions, CssTransform};
pub use js::{JsMinify, JsOptions};

/// Already minified inputs (`*.min.css`, `*.min.js`) are left alone.
pub fn is_minified(page: &Page) -> bool {
    let name = page.identity();
    let stem = name.strip_suffix(page.ext()).unwrap_or(name);
    stem.ends_with(".min")
}

/// Register the formats and stages enabled in `config`.
pub fn register_builtin(pipeline: &mut Pipeline, formats: &mut Formats, config: &SiteConfig) {
    let source_maps = config.source_maps.enable;

    if config.css.enable {
        let extensions = &config.css.extensions;
        for ext in extensions {
            formats.register(ext, Arc::new(TextLoader), FormatOptions::asset().includable());
        }

        let options = CssOptions {
            minify: config.css.minify,
            source_maps,
            ..CssOptions::default()
        };
        if config.css.bundle && !config.build.includes.is_empty() {
            pipeline.add_stage(extensions, Arc::new(CssBundle::new(options)), Concurrency::Sequential);
        } else {
            pipeline.add_stage(extensions, Arc::new(CssTransform::new(options)), Concurrency::Parallel);
        }
    }

    if config.js.enable {
        for ext in &config.js.extensions {
            formats.register(ext, Arc::new(TextLoader), FormatOptions::asset());
        }
        if config.js.minify {
            pipeline.add_stage(
                &config.js.extensions,
                Arc::new(JsMinify::new(JsOptions { source_maps })),
                Concurrency::Parallel,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_minified() {
        assert!(is_minified(&Page::new("a.min.css", ".css", "")));
        assert!(is_minified(&Page::new("vendor/lib.min.js", ".js", "")));
        assert!(!is_minified(&Page::new("admin.css", ".css", "")));
        assert!(!is_minified(&Page::new("min.js", ".js", "")));
    }

    #[test]
    fn test_register_builtin_picks_bundle_with_includes() {
        let mut config = SiteConfig::default();
        config.build.includes = vec!["_includes".into()];

        let mut pipeline = Pipeline::new();
        let mut formats = Formats::new();
        register_builtin(&mut pipeline, &mut formats, &config);

        let names: Vec<_> = pipeline.stages().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["lightningcss-bundle", "oxc-minify"]);
        assert_eq!(pipeline.stages()[0].mode(), Concurrency::Sequential);
        assert!(formats.get(".css").unwrap().includable);
    }

    #[test]
    fn test_register_builtin_transform_without_includes() {
        let mut config = SiteConfig::default();
        config.build.includes.clear();
        config.js.minify = false;

        let mut pipeline = Pipeline::new();
        let mut formats = Formats::new();
        register_builtin(&mut pipeline, &mut formats, &config);

        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline.stages()[0].name(), "lightningcss");
        assert_eq!(pipeline.stages()[0].mode(), Concurrency::Parallel);
        assert!(formats.get(".js").is_some());
    }
}
