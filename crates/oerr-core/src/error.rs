//! Error types and handling for oerr-core operations.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Errors are
//! grouped into categories that mirror how far a failure is allowed to
//! travel through the pipeline:
//!
//! - **Transport**: fetch failures and non-success HTTP statuses. They abort
//!   the page being fetched, never the sibling pages.
//! - **Structure**: a reference page without the expected entry layout.
//!   Fatal for that page only.
//! - **Codec**: malformed keys or values. Ingest skips the record, lookup
//!   reports the error to the caller.
//! - **Store**: open, batch and flush failures. Always fatal to the running
//!   operation.
//!
//! Lookup misses have their own class, see [`Error::is_not_found`]:
//!
//! ```rust
//! use oerr_core::Error;
//!
//! let miss = Error::NotFound("ORA-99999".to_string());
//! assert!(miss.is_not_found());
//! assert_eq!(miss.category(), "not_found");
//! ```

use thiserror::Error;

/// The main error type for oerr-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failed (connection, TLS, body decoding, timeout).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Fetch of '{url}' failed with HTTP status {status}")]
    Fetch {
        /// URL that was requested
        url: String,
        /// HTTP status code returned by the server
        status: u16,
    },

    /// URL is malformed or cannot be resolved.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A page or user input could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A stored key is not a valid encoded identifier.
    #[error("Malformed key: {0}")]
    MalformedKey(String),

    /// A stored value is not a valid encoded payload.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// An identifier cannot be encoded as a key.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A payload field does not fit its 16-bit length prefix.
    #[error("Field '{field}' is {len} bytes, more than the 65535 a record can hold")]
    FieldTooLong {
        /// Name of the offending field
        field: &'static str,
        /// Byte length of the field
        len: usize,
    },

    /// The embedded store reported a failure.
    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    /// Another process holds the store's lock past the wait allowed for it.
    #[error("Store busy: {0}")]
    StoreBusy(String),

    /// The store exists in an unexpected shape, or does not exist.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No record is stored under the requested identifier.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The lookup handle has already been closed.
    #[error("Store handle is closed")]
    Closed,

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// The consumer of a message stream went away.
    #[error("Message stream closed by the consumer")]
    StreamClosed,

    /// Generic error for cases not covered by specific variants.
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("TOML parse error: {err}"))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Other(format!("task failed: {err}"))
        }
    }
}

impl Error {
    /// Check if the error might be recoverable by retrying the operation.
    ///
    /// Nothing in the crate retries on its own; this is a hint for callers.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Fetch { status, .. } => *status >= 500 || *status == 429,
            Self::StoreBusy(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// True for lookup misses: an absent record, or a handle already closed.
    ///
    /// These are distinct from lower-level I/O and decode failures.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Closed)
    }

    /// Get the error category as a string for logging and exit-code mapping.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) | Self::Fetch { .. } => "network",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Parse(_) => "parse",
            Self::MalformedKey(_)
            | Self::MalformedPayload(_)
            | Self::InvalidIdentifier(_)
            | Self::FieldTooLong { .. } => "codec",
            Self::Store(_) | Self::Storage(_) => "storage",
            Self::StoreBusy(_) => "busy",
            Self::Config(_) => "config",
            Self::NotFound(_) | Self::Closed => "not_found",
            Self::Cancelled | Self::StreamClosed => "cancelled",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
