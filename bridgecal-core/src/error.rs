//! Error types for the bridgecal ecosystem.

use thiserror::Error;

/// Errors that can occur in bridgecal operations.
#[derive(Error, Debug)]
pub enum BridgeCalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Mapping store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeCalError {
    /// Process exit code for this error class: 2 for configuration and
    /// prerequisite failures, 3 for credential failures, 4 for everything
    /// runtime or transient.
    pub fn exit_code(&self) -> i32 {
        match self {
            BridgeCalError::Config(_) => 2,
            BridgeCalError::Auth(_) => 3,
            _ => 4,
        }
    }
}

/// Result type alias for bridgecal operations.
pub type BridgeCalResult<T> = Result<T, BridgeCalError>;
