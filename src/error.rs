//! Application error types

use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("POST to {address} failed: {status} - {body}")]
    WriteFailure {
        address: String,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable code for reporting
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Format(_) => "FORMAT_ERROR",
            AppError::WriteFailure { .. } => "WRITE_FAILURE",
            AppError::Transport(_) => "TRANSPORT_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::UnknownSource(_) => "UNKNOWN_SOURCE",
            AppError::Source(_) => "SOURCE_ERROR",
            AppError::Queue(_) => "QUEUE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Toml(_) => "TOML_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error happened on the write path and is absorbed by the worker
    pub fn is_write_error(&self) -> bool {
        matches!(self, AppError::WriteFailure { .. } | AppError::Transport(_))
    }
}

/// Serializable error report
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
