//! `[css]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [css]
//! enable = true
//! extensions = [".css"]
//! bundle = true       # Inline `@import`s (sequential stage, needs `build.includes`)
//! minify = true
//! ```

use super::validate_extensions;
use crate::config::ConfigDiagnostics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CssConfig {
    /// Register the lightningcss stage.
    pub enable: bool,
    /// Extensions handled as stylesheets.
    pub extensions: Vec<String>,
    /// Bundle `@import`s instead of transforming files one by one.
    pub bundle: bool,
    pub minify: bool,
}

config_fields!(CssConfig => CssConfigFields, "css" { enable, extensions, bundle, minify });

impl Default for CssConfig {
    fn default() -> Self {
        Self {
            enable: true,
            extensions: vec![".css".into()],
            bundle: true,
            minify: true,
        }
    }
}

impl CssConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.enable {
            validate_extensions(Self::FIELDS.extensions, &self.extensions, diag);
        }
    }
}
