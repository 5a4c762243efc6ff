//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for dayplan
///
/// Each variant corresponds to a distinct recovery strategy: retry
/// (`Network`), refresh credentials (`Auth`), back off (`RateLimited`),
/// restart from a full window fetch (`SyncTokenInvalid`), skip the record
/// (`InvalidInput`), or abort the cycle (`Database`).
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum DayplanError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Sync token invalid: {0}")]
    SyncTokenInvalid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for dayplan operations
pub type Result<T> = std::result::Result<T, DayplanError>;
