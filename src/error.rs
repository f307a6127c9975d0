//! Error types for Travai
//!
//! This module defines all error types used throughout the client,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Travai operations
///
/// Covers configuration loading, backend calls, stream decoding and
/// credential storage. Streaming turns never surface cancellation through
/// this type; see [`crate::session::TurnOutcome`].
#[derive(Error, Debug)]
pub enum TravaiError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend rejected the API key (HTTP 401/403)
    #[error("Authorization failed: {0}")]
    Unauthorized(String),

    /// Any other non-success HTTP status from the backend
    #[error("HTTP error! status: {status}")]
    Http {
        /// Numeric status code returned by the backend
        status: u16,
        /// Response body or reason phrase, possibly empty
        message: String,
    },

    /// Network-level failure while talking to the backend
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server reported a failure inside the event stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// Missing or unusable API key
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// A requested thread does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl TravaiError {
    /// Returns true when the error means the API key must be re-entered
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TravaiError::Unauthorized(_))
    }

    /// Returns true when `err` wraps a [`TravaiError::Unauthorized`]
    ///
    /// # Examples
    ///
    /// ```
    /// use travai::error::TravaiError;
    ///
    /// let err = anyhow::anyhow!(TravaiError::Unauthorized("Invalid API Key".into()));
    /// assert!(TravaiError::is_unauthorized_error(&err));
    /// ```
    pub fn is_unauthorized_error(err: &anyhow::Error) -> bool {
        err.downcast_ref::<TravaiError>()
            .map(TravaiError::is_unauthorized)
            .unwrap_or(false)
    }
}

/// Result type alias for Travai operations
///
/// Uses `anyhow::Error` so callers can attach context while still being able
/// to `downcast_ref::<TravaiError>()` for classification.
pub type Result<T> = anyhow::Result<T>;
