//! Transport failures and their classification into service errors.
//!
//! The Flight service reports problems as opaque transport errors whose
//! message embeds a gRPC-style status keyword. [`classify`] maps those onto
//! a closed taxonomy and leaves anything unrecognised untouched.

use std::fmt;

use thiserror::Error;

/// Status category reported by the transport for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightStatus {
    Unavailable,
    TimedOut,
    Internal,
    Cancelled,
    Unauthenticated,
    Unauthorized,
    Unimplemented,
    Failed,
    Unknown,
}

impl FlightStatus {
    /// Whether a call failing with this status may succeed if retried unchanged.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Unavailable | Self::TimedOut | Self::Internal)
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unavailable => "unavailable",
            Self::TimedOut => "timed out",
            Self::Internal => "internal",
            Self::Cancelled => "cancelled",
            Self::Unauthenticated => "unauthenticated",
            Self::Unauthorized => "unauthorized",
            Self::Unimplemented => "unimplemented",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A failure raised by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Flight {status} error: {message}")]
pub struct TransportError {
    pub status: FlightStatus,
    pub message: String,
}

impl TransportError {
    pub fn new(status: FlightStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.status.is_transient()
    }
}

/// Errors reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Duplicate import job, graph, or database.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Malformed action body or invalid entity.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No in-flight import for the named graph.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Unclassified server fault, trimmed to the last line of its trace.
    #[error("Unknown server error: {0}")]
    Unknown(String),

    /// No status keyword matched; the transport failure is kept as is.
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for ServiceError {
    fn from(err: TransportError) -> Self {
        classify(err)
    }
}

/// Classify a transport failure by the status keyword embedded in its message.
///
/// Keywords are checked in priority order: `ALREADY_EXISTS`,
/// `INVALID_ARGUMENT`, `NOT_FOUND`, `INTERNAL`, `UNKNOWN`.
pub fn classify(err: TransportError) -> ServiceError {
    let message = &err.message;
    if message.contains("ALREADY_EXISTS") {
        ServiceError::AlreadyExists(err.message)
    } else if message.contains("INVALID_ARGUMENT") {
        ServiceError::InvalidArgument(err.message)
    } else if message.contains("NOT_FOUND") {
        ServiceError::NotFound(err.message)
    } else if message.contains("INTERNAL") {
        ServiceError::Internal(err.message)
    } else if message.contains("UNKNOWN") {
        ServiceError::Unknown(last_line(&err.message))
    } else {
        ServiceError::Transport(err)
    }
}

/// Server traces arrive with escaped newlines and are often repeated; only
/// the final line carries the actual cause.
fn last_line(message: &str) -> String {
    let unescaped = message.replace("\\n", "\n").replace("\\'", "'");
    unescaped
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| message.to_string())
}
