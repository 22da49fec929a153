//! Terminal progress for downloads and long-running sources.
//!
//! Bars are only drawn when stderr is a terminal; otherwise every bar
//! handed out is hidden and progress shows up as log lines alone.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const PREFIX_WIDTH: usize = 20;

const BYTES_TEMPLATE: &str = "{prefix:<20.dim} {bar:30.green/dim} {binary_bytes:>7}/{binary_total_bytes:7} {eta:>4} {wide_msg:.dim}";
const UNSIZED_TEMPLATE: &str = "{prefix:<20.dim} {binary_bytes:>7} {wide_msg:.dim}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}";

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Give a download bar its length once the response reports one.
pub fn upgrade_to_bar(pb: &ProgressBar, total: u64) {
    pb.set_length(total);
    pb.set_style(style(BYTES_TEMPLATE).progress_chars("--"));
}

/// Owns the `MultiProgress` every bar and log line is drawn through.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Draw bars if stderr is a terminal.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    /// Never draws. Used by library callers and tests.
    pub fn hidden() -> Self {
        Self::with_tty(false)
    }

    fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    fn add(&self, template: &str, prefix: String) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(style(template));
        pb.set_prefix(prefix);
        pb
    }

    /// Byte counter for one download; see [`upgrade_to_bar`].
    pub fn download_bar(&self, name: &str) -> ProgressBar {
        self.add(UNSIZED_TEMPLATE, name.chars().take(PREFIX_WIDTH).collect())
    }

    /// Spinner for a step with no measurable progress.
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        let pb = self.add(SPINNER_TEMPLATE, name.to_string());
        if !pb.is_hidden() {
            pb.enable_steady_tick(Duration::from_millis(80));
        }
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedProgress = Arc<ProgressContext>;

/// `1234567` as `1,234,567`.
pub fn fmt_num(n: u64) -> String {
    let digits = n.to_string();
    let lead = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - lead) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Binary units, e.g. `1.50 MiB`.
pub fn fmt_bytes(n: u64) -> String {
    indicatif::BinaryBytes(n).to_string()
}
