//! Error handling for the mining core
//!
//! Error types covering the mining loop, the cut model, and the
//! collaborator contracts, with helpers for the two fatality classes.

use thiserror::Error;

/// Result type alias for mining operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the mining core
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Header encoding/decoding errors
    #[error("Invalid header encoding: {message}")]
    Header { message: String },

    /// Target validation errors
    #[error("Invalid target: {message}")]
    Target { message: String },

    /// Nonce validation errors
    #[error("Invalid nonce: {message}")]
    Nonce { message: String },

    /// Cut invariant violations. These indicate corrupt state and crash
    /// the mining task; the restart wrapper starts over from scratch.
    #[error("Cut invariant violated: {message}")]
    CutViolation { message: String },

    /// Payload build or validation failures surfaced from the executor.
    /// The current attempt is aborted and the loop restarts with a
    /// fresh cut read.
    #[error("Payload rejected: {message}")]
    Payload { message: String },

    /// Backing store errors (cut store, header db, payload cas)
    #[error("Store error: {message}")]
    Store { message: String },

    /// The miner was instantiated with a version that has no difficulty
    /// adjustment window. Aborts the miner without restart.
    #[error("POW miner used with non-POW chainweb ({version})")]
    NonPowVersion { version: String },

    /// Unknown version code in an encoded header
    #[error("Unknown chainweb version code: 0x{code:08x}")]
    UnknownVersion { code: u32 },

    /// Cancellation of an in-flight attempt. Not a failure; the attempt
    /// unwinds silently and the target cache is preserved.
    #[error("Operation was cancelled: {operation}")]
    Cancelled { operation: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a header codec error
    pub fn header(message: impl Into<String>) -> Self {
        Self::Header {
            message: message.into(),
        }
    }

    /// Create a target error
    pub fn target(message: impl Into<String>) -> Self {
        Self::Target {
            message: message.into(),
        }
    }

    /// Create a nonce error
    pub fn nonce(message: impl Into<String>) -> Self {
        Self::Nonce {
            message: message.into(),
        }
    }

    /// Create a cut invariant violation
    pub fn cut_violation(message: impl Into<String>) -> Self {
        Self::CutViolation {
            message: message.into(),
        }
    }

    /// Create a payload error
    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a non-PoW misconfiguration error
    pub fn non_pow_version(version: impl Into<String>) -> Self {
        Self::NonPowVersion {
            version: version.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether this error must terminate the mining task instead of
    /// aborting just the current attempt
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::CutViolation { .. } | Error::NonPowVersion { .. } | Error::UnknownVersion { .. }
        )
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Config { .. } => "config",
            Error::Header { .. } => "header",
            Error::Target { .. } => "target",
            Error::Nonce { .. } => "nonce",
            Error::CutViolation { .. } => "cut_violation",
            Error::Payload { .. } => "payload",
            Error::Store { .. } => "store",
            Error::NonPowVersion { .. } => "non_pow_version",
            Error::UnknownVersion { .. } => "unknown_version",
            Error::Cancelled { .. } => "cancelled",
        }
    }
}
