//! Error types for azsql-migrate.
//!
//! One error enum covers every phase of a run. Each variant carries a stable
//! `AZM-XXX` code so operator reports and logs can be grepped.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while migrating.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, empty or invalid configuration (AZM-001).
    #[error("[AZM-001] Configuration error: {0}")]
    Config(String),

    /// IO error (AZM-002).
    #[error("[AZM-002] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (AZM-003).
    #[error("[AZM-003] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error (AZM-004).
    #[error("[AZM-004] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Login or subscription selection failed (AZM-005).
    #[error("[AZM-005] Authentication failed: {0}")]
    Authentication(String),

    /// No usable storage key was returned for an account (AZM-006).
    #[error("[AZM-006] No usable storage key for account '{0}'")]
    KeyResolution(String),

    /// An external command exited unsuccessfully (AZM-007).
    #[error("[AZM-007] `{program}` failed ({status}): {stderr}")]
    Command {
        /// Program that was invoked.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// A gateway call failed without a structured command status (AZM-008).
    #[error("[AZM-008] Gateway error: {0}")]
    Gateway(String),

    /// One or more per-pair submissions failed in a fan-out phase (AZM-009).
    #[error("[AZM-009] {phase} failed for {} database(s): {}", failures.len(), failures.join("; "))]
    FanOut {
        /// Phase name (`export` or `import`).
        phase: &'static str,
        /// One entry per failed pair.
        failures: Vec<String>,
    },

    /// Export completion polling exceeded the configured bound (AZM-010).
    #[error("[AZM-010] Export polling timed out after {elapsed_secs}s ({observed}/{expected} snapshots)")]
    PollTimeout {
        /// Seconds spent polling.
        elapsed_secs: u64,
        /// Objects seen on the last listing.
        observed: usize,
        /// Objects required.
        expected: usize,
    },

    /// SQL connection or query failure (AZM-011).
    #[error("[AZM-011] SQL error: {0}")]
    Sql(String),

    /// A probe returned a value that does not fit a 64-bit integer (AZM-012).
    #[error("[AZM-012] Query '{query}' returned {value}, which does not fit a 64-bit count")]
    Truncation {
        /// Probe text.
        query: String,
        /// Rendered value as returned by the server.
        value: String,
    },

    /// Console input could not be read (AZM-013).
    #[error("[AZM-013] Prompt failed: {0}")]
    Prompt(String),

    /// The operator chose to exit from the credential prompt (AZM-014).
    #[error("[AZM-014] Operator chose to exit")]
    OperatorExit,

    /// A pipeline transition was attempted out of order (AZM-015).
    #[error("[AZM-015] Invalid pipeline state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Returns the error code (e.g., "AZM-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "AZM-001",
            Self::Io(_) => "AZM-002",
            Self::Json(_) => "AZM-003",
            Self::Yaml(_) => "AZM-004",
            Self::Authentication(_) => "AZM-005",
            Self::KeyResolution(_) => "AZM-006",
            Self::Command { .. } => "AZM-007",
            Self::Gateway(_) => "AZM-008",
            Self::FanOut { .. } => "AZM-009",
            Self::PollTimeout { .. } => "AZM-010",
            Self::Sql(_) => "AZM-011",
            Self::Truncation { .. } => "AZM-012",
            Self::Prompt(_) => "AZM-013",
            Self::OperatorExit => "AZM-014",
            Self::InvalidState(_) => "AZM-015",
        }
    }

    /// Whether this error is the operator's deliberate exit, which ends the
    /// process with a success status.
    #[must_use]
    pub const fn is_operator_exit(&self) -> bool {
        matches!(self, Self::OperatorExit)
    }
}

impl From<tiberius::error::Error> for Error {
    fn from(e: tiberius::error::Error) -> Self {
        Self::Sql(e.to_string())
    }
}

impl From<dialoguer::Error> for Error {
    fn from(e: dialoguer::Error) -> Self {
        Self::Prompt(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
