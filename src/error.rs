//! Error types for Herald.

use thiserror::Error;

/// Main error type for Herald operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading or parsing error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Subscription or chat store error.
    #[error("Store error: {0}")]
    Store(String),

    /// VAPID key loading or generation error.
    #[error("VAPID key error: {0}")]
    Vapid(String),

    /// Web Push protocol error.
    #[error("Web Push error: {0}")]
    WebPush(#[from] web_push::WebPushError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// OpenSSL error (VAPID key generation).
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
