//! Error types for clipgeo
//!
//! Address matching has no error type: an invalid candidate is a normal
//! outcome and is simply left out of the result.

use thiserror::Error;

/// Result type alias for clipgeo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a geolocation lookup failed
///
/// Callers treat every kind the same way (report, do not retry); the kind
/// only exists so logs and events can say what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupFailureKind {
    /// Request exceeded the configured timeout
    Timeout,
    /// Connection could not be established or was dropped
    Connection,
    /// The API answered with a non-success status code
    Status(u16),
    /// The response body could not be understood
    MalformedBody,
}

impl std::fmt::Display for LookupFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupFailureKind::Timeout => write!(f, "timeout"),
            LookupFailureKind::Connection => write!(f, "connection error"),
            LookupFailureKind::Status(code) => write!(f, "status {}", code),
            LookupFailureKind::MalformedBody => write!(f, "malformed body"),
        }
    }
}

/// Core error type for clipgeo
#[derive(Error, Debug)]
pub enum Error {
    /// Clipboard could not be read
    #[error("Clipboard error: {0}")]
    Clipboard(String),

    /// Geolocation lookup failed
    #[error("Lookup failed ({kind}): {message}")]
    Lookup {
        /// Failure category
        kind: LookupFailureKind,
        /// Detail message
        message: String,
    },

    /// History store could not complete an operation
    #[error("History store error: {0}")]
    History(String),

    /// A notification backend failed
    #[error("Notification backend error ({backend}): {message}")]
    Notification {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a clipboard error
    pub fn clipboard(msg: impl Into<String>) -> Self {
        Self::Clipboard(msg.into())
    }

    /// Create a lookup error
    pub fn lookup(kind: LookupFailureKind, message: impl Into<String>) -> Self {
        Self::Lookup {
            kind,
            message: message.into(),
        }
    }

    /// Create a history store error
    pub fn history(msg: impl Into<String>) -> Self {
        Self::History(msg.into())
    }

    /// Create a notification backend error
    pub fn notification(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notification {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Lookup failure kind, if this is a lookup error
    pub fn lookup_kind(&self) -> Option<LookupFailureKind> {
        match self {
            Self::Lookup { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
