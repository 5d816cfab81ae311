//! Canonical handles
//!
//! A handle is `displayName:NNNN`: the user-chosen display name plus a
//! four-digit suffix drawn by the [`HandleAllocator`]. Accounts and
//! communities draw from independent pools ([`Namespace`]), and a suffix is
//! never reissued for the same display name, even after the owner is deleted.

mod allocator;

pub use allocator::{HandleAllocator, DEFAULT_MAX_ATTEMPTS};

use crate::error::{Classify, ErrorKind, ValidationError};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of distinct suffix codes per display name (`0000..=9999`)
pub const CODE_SPACE: u16 = 10_000;

/// Longest accepted display name, in characters
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Independent handle pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Accounts,
    Communities,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Accounts => "accounts",
            Namespace::Communities => "communities",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-chosen name: ASCII letters, digits and `_`, 1 to 64 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::new("display_name", "name is empty"));
        }
        if raw.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(ValidationError::new(
                "display_name",
                format!("name is longer than {} characters", MAX_DISPLAY_NAME_LEN),
            ));
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ValidationError::new(
                "display_name",
                "name contains characters other than letters, digits and _",
            ));
        }
        Ok(DisplayName(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DisplayName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DisplayName::parse(&value)
    }
}

impl From<DisplayName> for String {
    fn from(name: DisplayName) -> Self {
        name.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique, immutable `name:NNNN` identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle {
    name: DisplayName,
    code: u16,
}

impl Handle {
    pub fn new(name: DisplayName, code: u16) -> Result<Self, ValidationError> {
        if code >= CODE_SPACE {
            return Err(ValidationError::new(
                "handle",
                format!("code {} is outside 0000-9999", code),
            ));
        }
        Ok(Handle { name, code })
    }

    pub fn name(&self) -> &DisplayName {
        &self.name
    }

    pub fn code(&self) -> u16 {
        self.code
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:04}", self.name, self.code)
    }
}

impl FromStr for Handle {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (name, code) = raw
            .rsplit_once(':')
            .ok_or_else(|| ValidationError::new("handle", "expected name:NNNN"))?;
        if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::new("handle", "suffix must be four digits"));
        }
        let code: u16 = code
            .parse()
            .map_err(|_| ValidationError::new("handle", "suffix must be four digits"))?;
        let name = DisplayName::parse(name)
            .map_err(|e| ValidationError::new("handle", e.reason))?;
        Handle::new(name, code)
    }
}

impl TryFrom<String> for Handle {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.to_string()
    }
}

/// Handle allocation errors
#[derive(Debug, Error)]
pub enum HandleError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("all {limit} codes for `{name}` in {namespace} are issued", limit = CODE_SPACE)]
    Capacity { namespace: Namespace, name: String },

    #[error("gave up allocating a code for `{name}` after {attempts} conflicting attempts")]
    Contention { name: String, attempts: usize },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Classify for HandleError {
    fn kind(&self) -> ErrorKind {
        match self {
            HandleError::Invalid(_) => ErrorKind::Validation,
            HandleError::Capacity { .. } => ErrorKind::Capacity,
            HandleError::Contention { .. } => ErrorKind::Internal,
            HandleError::Store(e) => e.kind(),
        }
    }
}
