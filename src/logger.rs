//! Logging utilities with colored output.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `Logger`, the diagnostics handle threaded through a build
//!
//! The pipeline never logs through process-wide state: every stage receives
//! the `Logger` of the build it belongs to, so two builds (or two tests) can
//! run side by side without mixing their output.
//!
//! # Example
//!
//! ```ignore
//! // CLI output
//! log!("build"; "wrote {} files", count);
//!
//! // Build diagnostics
//! let logger = Logger::terminal(verbose);
//! logger.debug("pipeline", "stage `css` matched 3 pages");
//! ```

use crossterm::{
    execute,
    terminal::{Clear, ClearType},
};
use owo_colors::{OwoColorize, Stream, Style};
use parking_lot::Mutex;
use std::{
    fmt,
    io::{Write, stdout},
    sync::Arc,
};

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix
#[inline]
pub fn log(module: &str, message: &str) {
    let module_lower = module.to_ascii_lowercase();
    let prefix = colorize_prefix(module, &module_lower);

    let mut stdout = stdout().lock();
    execute!(stdout, Clear(ClearType::UntilNewLine)).ok();
    writeln!(stdout, "{prefix} {message}").ok();
    stdout.flush().ok();
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str, module_lower: &str) -> String {
    let prefix = format!("[{module}]");
    let style = match module_lower {
        "build" => Style::new().bright_blue(),
        "write" => Style::new().bright_green(),
        "error" => Style::new().bright_red(),
        "warning" => Style::new().yellow(),
        _ => Style::new().bright_yellow(),
    };
    prefix
        .if_supports_color(Stream::Stdout, |t| t.style(style.bold()))
        .to_string()
}

/// Style `text` for stderr reports.
///
/// Plain text when stderr is not a color terminal or `--color never` is set.
pub fn paint<T: fmt::Display>(text: &T, style: Style) -> impl fmt::Display + '_ {
    text.if_supports_color(Stream::Stderr, move |t| t.style(style))
}

// ============================================================================
// Logger (per-build diagnostics)
// ============================================================================

/// Where a [`Logger`] sends its lines.
enum Sink {
    /// Colored output on stdout.
    Terminal,
    /// Plain `[module] message` lines kept in memory.
    Capture(Mutex<Vec<String>>),
}

/// Diagnostics handle for one build.
///
/// Cheap to clone; clones share the same sink.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    verbose: bool,
    sink: Sink,
}

impl Logger {
    /// Logger writing colored lines to the terminal.
    pub fn terminal(verbose: bool) -> Self {
        Self::with_sink(verbose, Sink::Terminal)
    }

    /// Logger keeping every line in memory, see [`Logger::lines`].
    pub fn capture(verbose: bool) -> Self {
        Self::with_sink(verbose, Sink::Capture(Mutex::new(Vec::new())))
    }

    fn with_sink(verbose: bool, sink: Sink) -> Self {
        Self {
            inner: Arc::new(LoggerInner { verbose, sink }),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.inner.verbose
    }

    /// Log a message unconditionally.
    pub fn log(&self, module: &str, message: &str) {
        match &self.inner.sink {
            Sink::Terminal => log(module, message),
            Sink::Capture(lines) => lines.lock().push(format!("[{module}] {message}")),
        }
    }

    /// Log a message only in verbose mode.
    pub fn debug(&self, module: &str, message: &str) {
        if self.inner.verbose {
            self.log(module, message);
        }
    }

    /// Log a warning.
    pub fn warn(&self, message: &str) {
        self.log("warning", message);
    }

    /// Lines recorded so far (always empty for terminal loggers).
    pub fn lines(&self) -> Vec<String> {
        match &self.inner.sink {
            Sink::Terminal => Vec::new(),
            Sink::Capture(lines) => lines.lock().clone(),
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("verbose", &self.inner.verbose)
            .finish_non_exhaustive()
    }
}
