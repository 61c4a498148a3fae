//! Error handling for the herbarium client

use std::fmt;
use thiserror::Error;

/// A single failed form field, reported back to the caller for inline display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// The field name as it appears in the form
    pub field: &'static str,

    /// Human readable message
    pub message: String,
}

impl FieldError {
    pub fn new<T: fmt::Display>(field: &'static str, message: T) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unified error type for the herbarium client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A backend service answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Api {
        status: reqwest::StatusCode,
        message: String,
    },

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Local file system errors (exports)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Websocket errors from the realtime connection
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Authentication errors, already mapped to user-facing text
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Field-level validation failures
    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// The current session lacks the role or status for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The document changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No session is available for an operation that needs one
    #[error("Not signed in")]
    NotSignedIn,

    /// Realtime subscription errors
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Reverse geocoding errors
    #[error("Geocoding error: {0}")]
    Geocode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a new authentication error
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(msg.to_string())
    }

    /// Create a new forbidden error
    pub fn forbidden<T: fmt::Display>(msg: T) -> Self {
        Error::Forbidden(msg.to_string())
    }

    /// Create a new not-found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    /// Create a new conflict error
    pub fn conflict<T: fmt::Display>(msg: T) -> Self {
        Error::Conflict(msg.to_string())
    }

    /// Create a new realtime error
    pub fn realtime<T: fmt::Display>(msg: T) -> Self {
        Error::Realtime(msg.to_string())
    }

    /// Create a new storage error
    pub fn storage<T: fmt::Display>(msg: T) -> Self {
        Error::Storage(msg.to_string())
    }

    /// Create a new geocoding error
    pub fn geocode<T: fmt::Display>(msg: T) -> Self {
        Error::Geocode(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
