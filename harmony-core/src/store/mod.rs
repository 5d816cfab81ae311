//! Storage traits and backends
//!
//! The core talks to storage through four narrow traits, bundled as [`Store`]
//! and injected as `Arc<dyn Store>`. Every write touches a single aggregate and
//! is atomic; nothing here spans an account and a community at once.
//!
//! Backends:
//! - [`MemoryStore`]: `tokio::sync::RwLock` over plain maps
//! - [`SqlStore`]: SQLite through an `r2d2` pool, blocking calls moved to
//!   `spawn_blocking`
//!
//! [`TimedStore`] wraps either one and bounds each call with a deadline.

mod deadline;
mod error;
mod memory;
mod migrations;
mod sql_store;

pub use deadline::{within, TimedStore};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use migrations::{current_version, migrate};
pub use sql_store::SqlStore;

use crate::handle::{DisplayName, Handle, Namespace};
use crate::model::{Account, Community, CommunityPatch, Mail, Repair, Reservation};
use crate::role::Role;
use crate::types::{AccountId, CommunityId, RepairId};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Versioned handle reservations
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Current codes and version for `name`, `None` if nothing was issued yet
    async fn load_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Replace the code set if the stored version still equals `expected`
    /// (`None`: only if no reservation exists). Returns the new version, or
    /// [`StoreError::VersionConflict`] when another writer got there first.
    async fn commit_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
        codes: &BTreeSet<u16>,
        expected: Option<u64>,
    ) -> Result<u64, StoreError>;
}

/// Account aggregate
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `Duplicate { field: "mail" | "handle" }` on a uniqueness clash
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>, StoreError>;

    async fn account_by_handle(&self, handle: &Handle) -> Result<Option<Account>, StoreError>;

    async fn account_by_mail(&self, mail: &Mail) -> Result<Option<Account>, StoreError>;

    async fn rename_account(&self, id: &AccountId, name: &DisplayName) -> Result<Account, StoreError>;

    /// Returns false if the account did not exist
    async fn delete_account(&self, id: &AccountId) -> Result<bool, StoreError>;

    /// Ensure `account` lists `community` with `role`. Idempotent; overwrites
    /// a different role.
    async fn put_membership(
        &self,
        account: &Handle,
        community: &Handle,
        role: Role,
    ) -> Result<(), StoreError>;

    /// Ensure `account` does not list `community`. Returns whether an entry
    /// was removed; a missing account is not an error.
    async fn drop_membership(&self, account: &Handle, community: &Handle) -> Result<bool, StoreError>;
}

/// Community aggregate
#[async_trait]
pub trait CommunityStore: Send + Sync {
    /// Fails with `Duplicate { field: "handle" }` on a handle clash
    async fn insert_community(&self, community: &Community) -> Result<(), StoreError>;

    async fn community_by_id(&self, id: &CommunityId) -> Result<Option<Community>, StoreError>;

    async fn community_by_handle(&self, handle: &Handle) -> Result<Option<Community>, StoreError>;

    async fn communities_owned_by(&self, owner: &Handle) -> Result<Vec<Community>, StoreError>;

    async fn update_community(
        &self,
        id: &CommunityId,
        patch: &CommunityPatch,
    ) -> Result<Community, StoreError>;

    /// Removes the community and returns it as it was, `None` if absent
    async fn delete_community(&self, id: &CommunityId) -> Result<Option<Community>, StoreError>;

    /// Add `account` only if absent: `Duplicate { field: "member" }` when it
    /// is already listed, `Constraint` for an owner role
    async fn add_member(
        &self,
        id: &CommunityId,
        account: &Handle,
        role: Role,
    ) -> Result<Community, StoreError>;

    /// Remove a non-owner member. Returns whether an entry was removed;
    /// `Constraint` when `account` is the owner.
    async fn remove_member(&self, id: &CommunityId, account: &Handle) -> Result<bool, StoreError>;
}

/// Journal of memberships left half-written
#[async_trait]
pub trait RepairJournal: Send + Sync {
    async fn record_repair(&self, repair: &Repair) -> Result<(), StoreError>;

    /// Oldest first
    async fn pending_repairs(&self) -> Result<Vec<Repair>, StoreError>;

    async fn resolve_repair(&self, id: &RepairId) -> Result<bool, StoreError>;
}

/// Everything the core needs from a backend
pub trait Store: ReservationStore + AccountStore + CommunityStore + RepairJournal {}

impl<T> Store for T where T: ReservationStore + AccountStore + CommunityStore + RepairJournal {}
