//! Caller identity and role checks
//!
//! A [`ClaimsVerifier`] turns a bearer token into [`Claims`]; the [`Guard`]
//! answers role questions from those claims alone and never reads the store.
//! Roles in a token are a snapshot taken when it was minted.

mod guard;
mod token;

pub use guard::Guard;
pub use token::Hs256Verifier;

use crate::error::{Classify, ErrorKind};
use crate::handle::Handle;
use crate::model::Account;
use crate::role::{Role, RoleMap};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Assertions about the caller, produced by a verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account handle, unchecked until the guard parses it
    #[serde(rename = "sub")]
    pub subject: String,
    /// Community handle → role
    #[serde(default)]
    pub roles: RoleMap,
    /// Seconds since epoch
    pub iat: u64,
    /// Seconds since epoch
    pub exp: u64,
}

impl Claims {
    /// Claims mirroring an account's current memberships
    pub fn for_account(account: &Account, issued_at: Timestamp, ttl: Duration) -> Self {
        Self {
            subject: account.handle.to_string(),
            roles: account.memberships.clone(),
            iat: issued_at.as_secs(),
            exp: issued_at.saturating_add(ttl).as_secs(),
        }
    }

    pub fn role_in(&self, community: &Handle) -> Option<Role> {
        self.roles.get(community)
    }
}

/// Checks a bearer token and extracts its claims
pub trait ClaimsVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("{subject} needs at least {required} in {community}")]
    InsufficientRole {
        subject: Handle,
        community: Handle,
        required: Role,
    },

    #[error("{subject} may only act on its own account")]
    NotSelf { subject: Handle },

    #[error("token key error: {0}")]
    Key(String),
}

impl Classify for AuthError {
    fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            AuthError::InsufficientRole { .. } | AuthError::NotSelf { .. } => ErrorKind::Unauthorized,
            AuthError::Key(_) => ErrorKind::Internal,
        }
    }
}
