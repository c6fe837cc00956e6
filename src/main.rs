//! kiln - A static site asset pipeline with chained source maps.

#![allow(dead_code)]

mod cli;
mod config;
mod format;
mod logger;
mod page;
mod pipeline;
mod plugins;
mod reader;
mod resolve;
mod sourcemap;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands, build::build_site};
use config::SiteConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = SiteConfig::load(&cli)?;

    match &cli.command {
        Commands::Build { .. } => build_site(&config),
    }
}
