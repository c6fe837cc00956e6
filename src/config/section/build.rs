//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! src = "."                   # Source root (relative to the config file)
//! dest = "_site"              # Output directory (relative to the config file)
//! includes = ["_includes"]    # Include directories (relative to `src`), searched in order
//! location = "http://localhost"
//! ```

use crate::config::ConfigDiagnostics;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Source root; every page path is relative to it.
    pub src: PathBuf,

    /// Build output directory.
    pub dest: PathBuf,

    /// Include directories searched for bare `@import`s. Excluded from discovery.
    pub includes: Vec<PathBuf>,

    /// Public URL of the site.
    pub location: String,

    /// Remove `dest` before writing (CLI only).
    #[serde(skip)]
    pub clean: bool,

    /// Print per-stage diagnostics (CLI only).
    #[serde(skip)]
    pub verbose: bool,
}

config_fields!(BuildConfig => BuildConfigFields, "build" { src, dest, includes, location });

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src: ".".into(),
            dest: "_site".into(),
            includes: vec!["_includes".into()],
            location: "http://localhost".into(),
            clean: false,
            verbose: false,
        }
    }
}

impl BuildConfig {
    /// Parsed `location`, if it is an http(s) URL.
    pub fn location_url(&self) -> Option<Url> {
        crate::utils::path::parse_remote(&self.location)
    }

    /// Checks on the raw values, before paths are made absolute.
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.dest.as_os_str().is_empty() {
            diag.error(Self::FIELDS.dest, "must not be empty");
        }

        for dir in &self.includes {
            if dir.is_absolute() {
                diag.error_with_hint(
                    Self::FIELDS.includes,
                    format!("`{}` is absolute", dir.display()),
                    "include directories are relative to `build.src`",
                );
            }
        }

        if self.location_url().is_none() {
            diag.error(
                Self::FIELDS.location,
                format!("`{}` is not an http(s) URL", self.location),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let build = BuildConfig::default();
        assert_eq!(build.src, PathBuf::from("."));
        assert_eq!(build.dest, PathBuf::from("_site"));
        assert_eq!(build.includes, vec![PathBuf::from("_includes")]);
        assert_eq!(build.location_url().unwrap().host_str(), Some("localhost"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let build = BuildConfig {
            dest: PathBuf::new(),
            includes: vec!["/abs/includes".into()],
            location: "localhost".into(),
            ..BuildConfig::default()
        };
        let mut diag = ConfigDiagnostics::new();
        build.validate(&mut diag);

        let fields: Vec<_> = diag.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["build.dest", "build.includes", "build.location"]);
    }
}
