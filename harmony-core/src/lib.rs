//! Harmony identity & membership core
//!
//! Accounts register, form communities, and manage membership through invite
//! links. This crate holds the parts that have to stay consistent:
//!
//! - [`handle`]: collision-free `name:NNNN` handles shared by accounts and communities
//! - [`identity`]: account registration and lookup
//! - [`membership`]: community creation, join, leave and the two-sided membership graph
//! - [`invite`]: time-bounded join links
//! - [`auth`]: bearer-token claims and the stateless role guard
//!
//! Everything reaches storage through the [`store::Store`] trait object that
//! [`context::Harmony`] builds once at startup.

pub mod auth;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod identity;
pub mod invite;
pub mod logging;
pub mod membership;
pub mod model;
pub mod role;
pub mod store;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use context::Harmony;
pub use error::{Classify, ErrorKind};
pub use handle::{DisplayName, Handle, Namespace};
pub use logging::{init_logging, LogLevel};
pub use role::{Role, RoleMap};
pub use types::{AccountId, CommunityId, Timestamp};
