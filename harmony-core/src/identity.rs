//! Account registration and lookup

use crate::clock::Clock;
use crate::error::{Classify, ErrorKind, ValidationError};
use crate::handle::{DisplayName, Handle, HandleAllocator, HandleError, Namespace};
use crate::model::{Account, Mail};
use crate::store::{Store, StoreError};
use crate::types::AccountId;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("mail {0} is already registered")]
    MailInUse(String),

    #[error("account {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Classify for IdentityError {
    fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::Validation(_) => ErrorKind::Validation,
            IdentityError::MailInUse(_) => ErrorKind::Conflict,
            IdentityError::NotFound(_) => ErrorKind::NotFound,
            IdentityError::Handle(e) => e.kind(),
            IdentityError::Store(e) => e.kind(),
        }
    }
}

/// Registers accounts and serves account reads
pub struct IdentityService {
    store: Arc<dyn Store>,
    allocator: Arc<HandleAllocator>,
    clock: Arc<dyn Clock>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn Store>, allocator: Arc<HandleAllocator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            allocator,
            clock,
        }
    }

    /// Create an account with a freshly allocated handle
    pub async fn register(&self, display_name: &str, mail: &str) -> Result<Account, IdentityError> {
        let display_name = DisplayName::parse(display_name)?;
        let mail = Mail::parse(mail)?;

        if self.store.account_by_mail(&mail).await?.is_some() {
            return Err(IdentityError::MailInUse(mail.to_string()));
        }

        let handle = self.allocator.allocate(Namespace::Accounts, &display_name).await?;
        let account = Account::new(display_name, handle, mail, self.clock.now());

        match self.store.insert_account(&account).await {
            Ok(()) => {}
            // Lost a race with a concurrent registration for the same mail
            Err(StoreError::Duplicate { field: "mail" }) => {
                return Err(IdentityError::MailInUse(account.mail.to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        info!(account = %account.handle, id = %account.id, "Registered account");
        Ok(account)
    }

    pub async fn account(&self, id: &AccountId) -> Result<Account, IdentityError> {
        self.store
            .account_by_id(id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))
    }

    pub async fn account_by_handle(&self, handle: &Handle) -> Result<Account, IdentityError> {
        self.store
            .account_by_handle(handle)
            .await?
            .ok_or_else(|| IdentityError::NotFound(handle.to_string()))
    }

    /// Change the display name; the handle stays as issued
    pub async fn rename(&self, id: &AccountId, display_name: &str) -> Result<Account, IdentityError> {
        let display_name = DisplayName::parse(display_name)?;
        match self.store.rename_account(id, &display_name).await {
            Ok(account) => {
                info!(account = %account.handle, name = %display_name, "Renamed account");
                Ok(account)
            }
            Err(StoreError::NotFound { .. }) => Err(IdentityError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::handle::DEFAULT_MAX_ATTEMPTS;
    use crate::store::MemoryStore;

    fn service() -> IdentityService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let allocator = Arc::new(HandleAllocator::new(store.clone(), DEFAULT_MAX_ATTEMPTS));
        IdentityService::new(store, allocator, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_register_assigns_handle() {
        let identity = service();
        let account = identity.register("alice", "alice@example.com").await.unwrap();
        assert_eq!(account.handle.name().as_str(), "alice");
        assert!(account.memberships.is_empty());

        let by_handle = identity.account_by_handle(&account.handle).await.unwrap();
        assert_eq!(by_handle.id, account.id);
    }

    #[tokio::test]
    async fn test_same_name_gets_distinct_handles() {
        let identity = service();
        let a = identity.register("alice", "a1@example.com").await.unwrap();
        let b = identity.register("alice", "a2@example.com").await.unwrap();
        assert_ne!(a.handle, b.handle);
    }

    #[tokio::test]
    async fn test_mail_must_be_unique() {
        let identity = service();
        identity.register("alice", "alice@example.com").await.unwrap();
        let err = identity.register("alicia", "alice@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let identity = service();
        let err = identity.register("no spaces", "alice@example.com").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = identity.register("alice", "not-a-mail").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_rename_keeps_handle() {
        let identity = service();
        let account = identity.register("alice", "alice@example.com").await.unwrap();
        let renamed = identity.rename(&account.id, "alice_b").await.unwrap();
        assert_eq!(renamed.display_name.as_str(), "alice_b");
        assert_eq!(renamed.handle, account.handle);

        let missing = identity.rename(&AccountId::generate(), "bob").await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
