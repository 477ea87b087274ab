//! Operator console: prompts, masked input and progress output.

use console::Style;
use dialoguer::{theme::ColorfulTheme, Input, Password};
use tracing::info;

use crate::error::Result;

/// Line-oriented operator I/O.
///
/// The pipeline and the credential prompt talk to the operator only through
/// this trait, so a scripted implementation can drive them in tests.
pub trait Console: Send + Sync {
    /// Reads one line of visible input after showing `prompt`.
    fn read_line(&self, prompt: &str) -> Result<String>;

    /// Reads one line without echoing it.
    fn read_secret(&self, prompt: &str) -> Result<String>;

    /// Writes a line to the operator. When `log` is set the line is also
    /// recorded as a tracing event.
    fn write_line(&self, message: &str, log: bool);
}

/// Interactive terminal console backed by `dialoguer`.
pub struct TerminalConsole {
    theme: ColorfulTheme,
}

impl Default for TerminalConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalConsole {
    /// Creates a terminal console.
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Console for TerminalConsole {
    fn read_line(&self, prompt: &str) -> Result<String> {
        // Blank answers must reach the caller, which decides what they mean.
        let line = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok(line)
    }

    fn read_secret(&self, prompt: &str) -> Result<String> {
        let secret = Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?;
        Ok(secret)
    }

    fn write_line(&self, message: &str, log: bool) {
        let dim = Style::new().dim();
        println!("{} {}", dim.apply_to("›"), message);
        if log {
            info!(target: "operator", "{}", message);
        }
    }
}
