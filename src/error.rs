// src/error.rs

//! Unified error handling for the status monitor.

use std::fmt;

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Decimal parsing failed
    #[error("Decimal error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Fetched data did not have the expected shape
    #[error("Parse error for {context}: {message}")]
    Parse { context: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A notification sink rejected a message
    #[error("Notification via {sink} failed: {message}")]
    Notify { sink: String, message: String },

    /// Remote table store error
    #[error("Remote store error: {0}")]
    RemoteStore(String),

    /// Batch still had unprocessed items when the retry budget ran out
    #[error("{remaining} batch item(s) still unprocessed after {attempts} attempt(s)")]
    PartialBatch { remaining: usize, attempts: u32 },

    /// A spawned background task panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Two snapshots of different sites were compared
    #[error("Cannot compare site {old} with site {new}")]
    GuidMismatch { old: String, new: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a notification error for the named sink.
    pub fn notify(sink: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Notify {
            sink: sink.into(),
            message: message.to_string(),
        }
    }

    /// Create a remote store error.
    pub fn remote_store(message: impl fmt::Display) -> Self {
        Self::RemoteStore(message.to_string())
    }
}
