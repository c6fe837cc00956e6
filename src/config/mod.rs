//! Site configuration management for `kiln.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── build      # [build]
//! │   ├── source_maps# [source_maps]
//! │   ├── css        # [css]
//! │   ├── js         # [js]
//! │   └── fetch      # [fetch]
//! ├── types/         # Utility types
//! │   ├── error      # ConfigError, ConfigDiagnostics
//! │   └── field      # FieldPath
//! └── mod.rs         # SiteConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section          | Purpose                                          |
//! |------------------|--------------------------------------------------|
//! | `[build]`        | Source root, destination, include directories    |
//! | `[source_maps]`  | Whether and how maps are written                 |
//! | `[css]`          | lightningcss transform / bundle stage            |
//! | `[js]`           | oxc minify stage                                 |
//! | `[fetch]`        | Timeout and `User-Agent` for remote includes     |

pub mod section;
pub mod types;
mod util;

use util::find_config_file;

pub use section::{BuildConfig, CssConfig, FetchConfig, JsConfig, SourceMapsConfig};
pub use types::{ConfigDiagnostic, ConfigDiagnostics, ConfigError, FieldPath};

use crate::{
    cli::{BuildArgs, Cli, Commands},
    log,
    utils::path::normalize_path,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing kiln.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    pub build: BuildConfig,
    pub source_maps: SourceMapsConfig,
    pub css: CssConfig,
    pub js: JsConfig,
    pub fetch: FetchConfig,
}

impl SiteConfig {
    /// Load configuration for a CLI invocation.
    ///
    /// Searches upward from cwd for the config file; the project root is the
    /// config file's parent directory.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path =
            find_config_file(&cli.config).ok_or_else(|| ConfigError::NotFound(cli.config.clone()))?;

        let mut config = Self::from_path(&config_path)?;

        // Raw values first: relative/absolute is lost after normalization
        config.validate()?;

        config.config_path = normalize_path(&config_path);
        let root = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        match &cli.command {
            Commands::Build { build_args } => config.apply_build_args(build_args),
        }
        config.normalize_paths(&root);
        config.validate_paths()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.root = path.to_path_buf();
    }

    /// Absolute source root.
    pub fn src_dir(&self) -> &Path {
        &self.build.src
    }

    /// Absolute destination directory.
    pub fn dest_dir(&self) -> &Path {
        &self.build.dest
    }

    /// Absolute include directories, in search order.
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        self.build
            .includes
            .iter()
            .map(|dir| self.build.src.join(dir))
            .collect()
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply build arguments from CLI.
    fn apply_build_args(&mut self, args: &BuildArgs) {
        Self::update_option(&mut self.build.src, args.src.as_ref());
        Self::update_option(&mut self.build.dest, args.dest.as_ref());
        Self::update_option(&mut self.source_maps.enable, args.source_maps.as_ref());

        if let Some(&minify) = args.minify.as_ref() {
            self.css.minify = minify;
            self.js.minify = minify;
        }

        self.build.clean = args.clean;
        self.build.verbose = args.verbose;
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // path normalization
    // ========================================================================

    /// Make `src` and `dest` absolute under `root`. Include directories stay
    /// relative to `src`.
    fn normalize_paths(&mut self, root: &Path) {
        let root = normalize_path(root);
        self.build.src = normalize_path(&root.join(&self.build.src));
        self.build.dest = normalize_path(&root.join(&self.build.dest));
        self.set_root(&root);
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate every section, reporting all errors at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        self.build.validate(&mut diag);
        self.css.validate(&mut diag);
        self.js.validate(&mut diag);
        self.fetch.validate(&mut diag);

        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }

    /// Checks that need absolute paths.
    fn validate_paths(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        if !self.build.src.is_dir() {
            diag.error(
                BuildConfig::FIELDS.src,
                format!("`{}` is not a directory", self.build.src.display()),
            );
        }
        if self.build.dest == self.build.src || self.build.src.starts_with(&self.build.dest) {
            diag.error_with_hint(
                BuildConfig::FIELDS.dest,
                "would overwrite the sources",
                "pick a directory inside or next to `build.src`",
            );
        }

        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config, panicking on unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> SiteConfig {
    let (parsed, ignored) = SiteConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
