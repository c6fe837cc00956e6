//! Site building orchestration.
//!
//! Build phases:
//! - **Collect** - Walk `build.src`, skipping dot/underscore entries, `dest`
//!   and include directories
//! - **Load** - Turn files into pages through the format registry (parallel)
//! - **Run** - Drive the pipeline on a tokio runtime
//! - **Write** - Clean `dest` if asked, write contents and source maps (parallel)
//!
//! Nothing is written when the pipeline fails.

use crate::{
    config::{SiteConfig, SourceMapsConfig},
    format::Formats,
    log,
    logger::Logger,
    page::{Content, Page},
    pipeline::{BuildContext, Cancellation, Pipeline, PipelineError},
    plugins,
    reader::HttpFetcher,
    sourcemap::{SourceMap, annotate, inline_url, map_path, prepare_for_output},
    utils::{path::to_slash, plural_count},
};
use anyhow::{Context, Result, anyhow, bail};
use jwalk::WalkDir;
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

/// Files never picked up by discovery.
const IGNORED_FILES: &[&str] = &[".DS_Store", "kiln.toml"];

/// Build the site described by `config`. Ctrl+C stops the run at the next
/// stage boundary.
pub fn build_site(config: &SiteConfig) -> Result<()> {
    let cancel = Cancellation::new();
    setup_interrupt_handler(cancel.clone())?;
    run_build(config, Logger::terminal(config.build.verbose), cancel).map(|_| ())
}

fn setup_interrupt_handler(cancel: Cancellation) -> Result<()> {
    ctrlc::set_handler(move || {
        crate::log!("build"; "stopping after the current stage...");
        cancel.cancel();
    })
    .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Collect, load, run and write. Returns the number of pages written.
pub fn run_build(config: &SiteConfig, logger: Logger, cancel: Cancellation) -> Result<usize> {
    let started = Instant::now();
    let src = config.src_dir();

    let mut formats = Formats::with_defaults();
    let mut pipeline = Pipeline::new();
    plugins::register_builtin(&mut pipeline, &mut formats, config);

    let files = collect_files(config);
    logger.debug("build", &format!("found {}", plural_count(files.len(), "file")));

    let pages = load_pages(&formats, src, &files, &logger);

    let fetcher = HttpFetcher::new(config.fetch.timeout(), config.fetch.user_agent.clone());
    let cx = Arc::new(
        BuildContext::new(
            src,
            Arc::new(formats),
            config.build.includes.clone(),
            Arc::new(fetcher),
            logger.clone(),
        )
        .with_cancellation(cancel),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let pages = match runtime.block_on(pipeline.run(pages, &cx)) {
        Ok(pages) => pages,
        Err(PipelineError::Failed(report)) => {
            eprintln!("{report}");
            bail!("Build failed");
        }
        Err(err @ PipelineError::Cancelled { .. }) => {
            log!("build"; "{}", err);
            bail!("Build cancelled, nothing written");
        }
    };

    let dest = config.dest_dir();
    if config.build.clean && dest.exists() {
        fs::remove_dir_all(dest)
            .with_context(|| format!("Failed to clear output directory: {}", dest.display()))?;
    }

    let written = write_pages(pages, dest, &config.source_maps, &logger)?;

    log!(
        "build";
        "wrote {} to {} in {:.2?}",
        plural_count(written, "file"),
        dest.display(),
        started.elapsed()
    );
    if let Some(location) = config.build.location_url() {
        logger.debug("build", &format!("site location {location}"));
    }
    Ok(written)
}

// ============================================================================
// Collect
// ============================================================================

/// Root-relative paths of every file under `build.src`, sorted.
///
/// Hidden and `_`-prefixed entries are skipped along with their subtrees, as
/// are `dest` and the include directories.
pub fn collect_files(config: &SiteConfig) -> Vec<PathBuf> {
    let src = config.src_dir().to_path_buf();
    let mut skipped: Vec<PathBuf> = config.include_dirs();
    skipped.push(config.dest_dir().to_path_buf());

    let walker = WalkDir::new(&src)
        .skip_hidden(true)
        .sort(true)
        .process_read_dir(move |_depth, _dir, _state, children| {
            children.retain(|entry| match entry {
                Ok(entry) => {
                    let name = entry.file_name().to_string_lossy();
                    !name.starts_with('_')
                        && !IGNORED_FILES.contains(&&*name)
                        && !skipped.contains(&entry.path())
                }
                Err(_) => true,
            });
        });

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(&src).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

// ============================================================================
// Load
// ============================================================================

/// Load `files` in parallel, keeping their order.
///
/// Files without a registered format are skipped; load failures are
/// reported as warnings and the page is dropped.
fn load_pages(formats: &Formats, src: &Path, files: &[PathBuf], logger: &Logger) -> Vec<Page> {
    let loaded: Vec<_> = files.par_iter().map(|rel| formats.load(src, rel)).collect();

    let mut pages = Vec::with_capacity(loaded.len());
    for (rel, result) in files.iter().zip(loaded) {
        match result {
            Ok(Some(page)) => pages.push(page),
            Ok(None) => logger.debug("build", &format!("no format for {}", to_slash(rel))),
            Err(e) => logger.warn(&format!("skipping {}: {}", to_slash(e.path()), e)),
        }
    }
    pages
}

// ============================================================================
// Write
// ============================================================================

/// Write every page under `dest`. Returns the number of pages written.
fn write_pages(
    pages: Vec<Page>,
    dest: &Path,
    maps: &SourceMapsConfig,
    logger: &Logger,
) -> Result<usize> {
    let count = pages.len();
    pages.into_par_iter().try_for_each(|page| {
        let output = page.output_path();
        logger.debug("write", &to_slash(&output));
        write_page(page, dest, maps)
            .with_context(|| format!("Failed to write {}", to_slash(&output)))
    })?;
    Ok(count)
}

fn write_page(page: Page, dest: &Path, maps: &SourceMapsConfig) -> Result<()> {
    let target = dest.join(page.output_path());
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let ext = page.ext().to_string();
    let map = page.source_map().filter(|_| maps.enable).cloned();

    match page.into_content() {
        Content::Binary(bytes) => fs::write(&target, bytes)?,
        Content::Text(mut text) => {
            if let Some(map) = map {
                attach_map(&mut text, &target, &ext, &map, maps)?;
            }
            fs::write(&target, text)?;
        }
    }
    Ok(())
}

/// Write the map of `target` and annotate `text` with its URL.
fn attach_map(
    text: &mut String,
    target: &Path,
    ext: &str,
    map: &SourceMap,
    maps: &SourceMapsConfig,
) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let json = prepare_for_output(map, &file_name, maps.sources_content)?.to_json()?;

    if maps.inline {
        annotate(text, ext, &inline_url(&json));
        return Ok(());
    }

    let map_file = map_path(target);
    let url = format!("{file_name}.map");
    annotate(text, ext, &url);
    fs::write(&map_file, json)?;
    Ok(())
}

// ============================================================================
// tests
// ============================================================================
