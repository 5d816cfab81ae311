//! Error taxonomy shared by every component
//!
//! Each component keeps its own error enum. They all classify into one
//! [`ErrorKind`] so the transport layer can pick a status without knowing the
//! component that failed.

use std::fmt;
use thiserror::Error;

/// Category of a failure, independent of the component that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input (display name, mail, identifier)
    Validation,
    /// Request conflicts with current state (mail in use, already a member, owner leaving)
    Conflict,
    /// No such account or community
    NotFound,
    /// Missing or unusable identity assertion
    Unauthenticated,
    /// Valid identity without sufficient role
    Unauthorized,
    /// Invite parameter missing or unparsable
    Invalid,
    /// Invite expiry already passed
    Expired,
    /// Handle pool for a display name is exhausted
    Capacity,
    /// First write of a two-aggregate operation committed, second did not
    PartiallyApplied,
    /// A store call exceeded its deadline
    Timeout,
    /// Anything else
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Expired => "expired",
            ErrorKind::Capacity => "capacity",
            ErrorKind::PartiallyApplied => "partially_applied",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can report their [`ErrorKind`]
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// A single field failed syntactic validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl Classify for ValidationError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
