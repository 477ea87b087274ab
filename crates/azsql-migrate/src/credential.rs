//! Administrative SQL credential, collected interactively once per run.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::console::Console;
use crate::error::{Error, Result};

const LOGIN_PROMPT: &str = "Please Enter Login";
const PASSWORD_PROMPT: &str = "Password";
const INVALID_MESSAGE: &str = "Invalid Credentials!";
const EXIT_PROMPT: &str = "Do you want to exit the console? Press Y and Enter to exit";

/// SQL administrator login and password. Held in memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    admin_name: String,
    admin_password: String,
}

impl Credential {
    /// Builds a credential. Both parts must be non-blank.
    ///
    /// # Errors
    ///
    /// Returns `Config` if either part is blank.
    pub fn new(admin_name: impl Into<String>, admin_password: impl Into<String>) -> Result<Self> {
        let admin_name = admin_name.into();
        let admin_password = admin_password.into();
        if admin_name.trim().is_empty() || admin_password.trim().is_empty() {
            return Err(Error::Config(
                "credential login and password cannot be blank".to_string(),
            ));
        }
        Ok(Self {
            admin_name,
            admin_password,
        })
    }

    /// Administrator login name.
    #[must_use]
    pub fn admin_name(&self) -> &str {
        &self.admin_name
    }

    /// Administrator password.
    #[must_use]
    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("admin_name", &self.admin_name)
            .field("admin_password", &"***")
            .finish()
    }
}

/// Prompts for the administrator credential and caches it.
pub struct CredentialProvider {
    console: Arc<dyn Console>,
    cached: Option<Credential>,
}

impl CredentialProvider {
    /// Creates a provider that prompts through `console`.
    pub fn new(console: Arc<dyn Console>) -> Self {
        Self {
            console,
            cached: None,
        }
    }

    /// Returns the cached credential, prompting on first use.
    ///
    /// Blank input shows the recovery prompt: answering `Y` ends with
    /// [`Error::OperatorExit`], anything else restarts from the login prompt.
    /// A returned credential always has a non-blank login and password.
    ///
    /// # Errors
    ///
    /// Returns `OperatorExit` when the operator chooses to exit, or `Prompt`
    /// when the console cannot be read.
    pub fn credential(&mut self) -> Result<Credential> {
        if let Some(credential) = &self.cached {
            return Ok(credential.clone());
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(credential) = self.collect()? {
                debug!("Credential collected after {} attempt(s)", attempt);
                self.cached = Some(credential.clone());
                return Ok(credential);
            }

            self.console.write_line(INVALID_MESSAGE, false);
            let answer = self.console.read_line(EXIT_PROMPT)?;
            if answer.trim().eq_ignore_ascii_case("y") {
                return Err(Error::OperatorExit);
            }
        }
    }

    /// One pass over the login and password prompts. `None` means a blank
    /// answer was given.
    fn collect(&self) -> Result<Option<Credential>> {
        let login = self.console.read_line(LOGIN_PROMPT)?;
        if login.trim().is_empty() {
            return Ok(None);
        }

        let password = self.console.read_secret(PASSWORD_PROMPT)?;
        if password.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(Credential {
            admin_name: login.trim().to_string(),
            admin_password: password,
        }))
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
