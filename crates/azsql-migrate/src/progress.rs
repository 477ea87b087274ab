//! Scoped progress spinner.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(120);

/// A spinner that runs while the guard is alive.
///
/// Dropping the guard clears the spinner, so it is released on every exit
/// path, including `?` returns and panics.
pub struct ProgressGuard {
    bar: ProgressBar,
}

impl ProgressGuard {
    /// Starts a spinner showing `message` on the terminal.
    pub fn start(message: impl Into<String>) -> Self {
        Self::with_bar(ProgressBar::new_spinner(), message)
    }

    /// Starts a guard whose spinner is never drawn.
    pub fn hidden(message: impl Into<String>) -> Self {
        Self::with_bar(ProgressBar::hidden(), message)
    }

    fn with_bar(bar: ProgressBar, message: impl Into<String>) -> Self {
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.into());
        bar.enable_steady_tick(TICK);
        Self { bar }
    }

    /// Replaces the spinner message.
    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Stops and clears the spinner. Calling it again has no effect.
    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }

    /// Whether the spinner has been stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.finish();
    }
}
