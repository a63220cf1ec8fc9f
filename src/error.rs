//! Top-level error type for the session runner binary
//!
//! Collects the per-module error enums behind one umbrella so `main` has a
//! single failure channel. Fatal classes (configuration, credentials,
//! connect) abort startup; operation errors are normally handled where they
//! occur and only reach this level from the shutdown path.

use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::session::{ConnectError, OperationError};

/// Main error type for a session run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Signal handler setup failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RunError {
    /// Exit code reported to the shell
    ///
    /// Startup problems the operator must fix (configuration, credentials)
    /// exit with 2; failures of the run itself exit with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Config(_) | RunError::Credential(_) => 2,
            RunError::Connect(_) | RunError::Operation(_) | RunError::Signal(_) => 1,
        }
    }
}

/// Result type for run-level operations
pub type RunResult<T> = Result<T, RunError>;
