//! Error types for habitlens-core

use thiserror::Error;

/// Main error type for the habitlens-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// User not found
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Suggestion not found for the user
    #[error("suggestion not found: {0}")]
    SuggestionNotFound(String),

    /// Alert (notification) not found for the user
    #[error("alert not found: {0}")]
    AlertNotFound(String),

    /// Input rejected before touching storage
    #[error("validation error: {0}")]
    Validation(String),

    /// A storage mutex was poisoned by a panicking writer
    #[error("storage lock poisoned")]
    LockPoisoned,
}

/// Result type alias for habitlens-core
pub type Result<T> = std::result::Result<T, Error>;
