//! Progress feedback for CLI commands.
//!
//! Suppressed entirely under `--quiet`.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// A spinner shown on stderr while a tree loads.
pub struct Spinner {
    bar: Option<ProgressBar>,
}

impl Spinner {
    pub fn start(message: impl Into<String>, quiet: bool) -> Self {
        if quiet {
            return Self { bar: None };
        }

        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.cyan} {msg} ({elapsed})")
        {
            bar.set_style(style);
        }
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }

    /// Stop the spinner, leaving `message` in its place.
    pub fn finish(self, message: impl Into<String>) {
        if let Some(bar) = self.bar {
            bar.finish_with_message(message.into());
        }
    }

    /// Stop the spinner and erase it.
    pub fn clear(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
