//! Log output that cooperates with progress bars.
//!
//! On a terminal, records are printed through the shared `MultiProgress`
//! so a log line never lands in the middle of a download bar. Elsewhere
//! they go straight to stderr without color.

use std::io::Write;

use indicatif::MultiProgress;
use log::{Level, Log, Metadata, Record};

const RESET: &str = "\x1b[0m";

/// Fixed-width tag for a level, so messages line up.
fn tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

fn color(level: Level) -> &'static str {
    match level {
        Level::Error => "\x1b[31m",
        Level::Warn => "\x1b[33m",
        Level::Info => "\x1b[32m",
        Level::Debug => "\x1b[36m",
        Level::Trace => "\x1b[35m",
    }
}

fn render(record: &Record, colored: bool) -> String {
    let level = record.level();
    if colored {
        format!("[{}{}{RESET}] {}", color(level), tag(level), record.args())
    } else {
        format!("[{}] {}", tag(level), record.args())
    }
}

/// Routes records through a `MultiProgress`, filtered by an env_logger.
pub struct ProgressLogger {
    filter: env_logger::Logger,
    bars: MultiProgress,
}

impl ProgressLogger {
    pub fn new(filter: env_logger::Logger, bars: MultiProgress) -> Self {
        Self { filter, bars }
    }
}

impl Log for ProgressLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = render(record, true);
        self.bars.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.filter.flush();
    }
}

fn default_filter(quiet: bool, debug: bool) -> &'static str {
    match (debug, quiet) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    }
}

/// Install the process-wide logger. `RUST_LOG` takes precedence over the
/// level chosen from `quiet`/`debug`.
///
/// Calling this twice is harmless; the first logger stays installed.
pub fn init_logging(quiet: bool, debug: bool, bars: Option<&MultiProgress>) {
    let env = env_logger::Env::default().default_filter_or(default_filter(quiet, debug));
    let mut builder = env_logger::Builder::from_env(env);

    let Some(bars) = bars else {
        let _ = builder
            .format(|out, record| writeln!(out, "{}", render(record, false)))
            .try_init();
        return;
    };

    let filter = builder.build();
    let max = filter.filter();
    if log::set_boxed_logger(Box::new(ProgressLogger::new(filter, bars.clone()))).is_ok() {
        log::set_max_level(max);
    }
}
