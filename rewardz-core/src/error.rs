//! Error types for the rewardz core library.

use thiserror::Error;

use crate::expr::ExpressionError;
use crate::repository::RepositoryError;

/// Top-level error type for all rewardz operations.
#[derive(Error, Debug)]
pub enum RewardzError {
    /// A rule or helper expression failed to parse or evaluate.
    ///
    /// The action processor recovers from these per quest; they only reach
    /// callers that evaluate expressions directly.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Loading or saving player state failed. Fatal for the current action.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The rule set or configuration is invalid. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RewardzError {
    /// Whether the failed action may succeed if the triggering event is
    /// redelivered.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(e) => e.is_transient() || e.is_conflict(),
            _ => false,
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RewardzError>;
