//! `[js]` section configuration.
//!
//! ```toml
//! [js]
//! enable = true
//! extensions = [".js"]
//! minify = true
//! ```

use super::validate_extensions;
use crate::config::ConfigDiagnostics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsConfig {
    pub enable: bool,
    pub extensions: Vec<String>,
    /// Register the oxc minify stage.
    pub minify: bool,
}

config_fields!(JsConfig => JsConfigFields, "js" { enable, extensions, minify });

impl Default for JsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            extensions: vec![".js".into()],
            minify: true,
        }
    }
}

impl JsConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.enable {
            validate_extensions(Self::FIELDS.extensions, &self.extensions, diag);
        }
    }
}
