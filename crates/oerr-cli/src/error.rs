//! CLI error handling with semantic exit codes.
//!
//! | Code | Category | Description |
//! |------|----------|-------------|
//! | 0 | Success | Command completed (a lookup miss included) |
//! | 1 | `Internal` | Unexpected/internal error |
//! | 2 | `Usage` | Invalid arguments or configuration |
//! | 3 | `NotFound` | No store at the resolved path |
//! | 5 | `Network` | Network or fetch failure |
//! | 6 | `Timeout` | Store locked by another process past the wait |
//! | 7 | `Integrity` | Store or record corruption |
//! | 130 | `Interrupted` | Cancelled with Ctrl-C |

use std::fmt;

/// Semantic error category determining the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Unexpected or internal error (exit code 1).
    Internal = 1,
    /// Invalid arguments or configuration (exit code 2).
    Usage = 2,
    /// The store does not exist (exit code 3).
    NotFound = 3,
    /// Network or fetch failure (exit code 5).
    Network = 5,
    /// The store stayed locked by another process (exit code 6).
    Timeout = 6,
    /// Store or record corruption (exit code 7).
    Integrity = 7,
    /// The operation was interrupted (exit code 130).
    Interrupted = 130,
}

impl ErrorCategory {
    /// Get the exit code for this category.
    pub const fn exit_code(self) -> u8 {
        self as u8
    }

    /// Get a short description of this error category.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Internal => "internal error",
            Self::Usage => "usage error",
            Self::NotFound => "not found",
            Self::Network => "network error",
            Self::Timeout => "timeout",
            Self::Integrity => "integrity error",
            Self::Interrupted => "interrupted",
        }
    }

    /// Map a library error onto an exit category.
    pub fn of(error: &oerr_core::Error) -> Self {
        use oerr_core::Error;
        match error {
            Error::Storage(_) => Self::NotFound,
            _ => match error.category() {
                "network" => Self::Network,
                "busy" => Self::Timeout,
                "invalid_url" | "config" | "parse" => Self::Usage,
                "codec" | "storage" => Self::Integrity,
                "cancelled" => Self::Interrupted,
                _ => Self::Internal,
            },
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A CLI error with a semantic category for exit code mapping.
///
/// Wraps an `anyhow::Error` so context chains survive.
#[derive(Debug)]
pub struct CliError {
    /// The semantic category of this error.
    pub category: ErrorCategory,
    /// The underlying error with full context.
    pub source: anyhow::Error,
}

impl CliError {
    /// Create a new CLI error with explicit category.
    pub fn new(category: ErrorCategory, source: impl Into<anyhow::Error>) -> Self {
        Self {
            category,
            source: source.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::Usage, source)
    }

    /// Get the exit code for this error.
    pub const fn exit_code(&self) -> u8 {
        self.category.exit_code()
    }
}

impl From<oerr_core::Error> for CliError {
    fn from(error: oerr_core::Error) -> Self {
        Self::new(ErrorCategory::of(&error), error)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Determine the exit code from an `anyhow::Error`.
///
/// A `CliError` anywhere in the chain decides; a bare library error is
/// mapped by its category; anything else is internal.
pub fn exit_code_from_error(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return cli_err.exit_code();
        }
        if let Some(core_err) = cause.downcast_ref::<oerr_core::Error>() {
            return ErrorCategory::of(core_err).exit_code();
        }
    }
    ErrorCategory::Internal.exit_code()
}
