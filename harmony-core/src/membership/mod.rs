//! Community lifecycle and the two-sided membership graph
//!
//! A membership is recorded twice: in the community's roster and in the
//! account's membership list. The store cannot update both atomically, so
//! every operation here is a two-step saga:
//!
//! 1. Write the community side as one conditional store write. This is the
//!    source of truth; if it fails nothing has changed.
//! 2. Bring the account side in line with an idempotent write, retried with
//!    backoff until [`SagaPolicy::deadline`].
//!
//! When step 2 gives up, a [`Repair`] record is journaled and the caller gets
//! [`MembershipError::PartiallyApplied`]. [`MembershipRegistry::reconcile`]
//! later replays the account side from the community side.
//!
//! A step 1 write that reports [`StoreError::Timeout`] may still have
//! committed, so it is journaled the same way.

mod error;
mod reconcile;
mod saga;

pub use error::MembershipError;
pub use reconcile::ReconcileReport;
pub use saga::SagaPolicy;

use crate::clock::Clock;
use crate::handle::{DisplayName, Handle, HandleAllocator, Namespace};
use crate::model::{Community, CommunityPatch, Repair, SagaOperation};
use crate::role::Role;
use crate::store::{Store, StoreError};
use crate::telemetry;
use crate::types::{AccountId, CommunityId};
use futures::future::join_all;
use saga::retry_idempotent;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct MembershipRegistry {
    store: Arc<dyn Store>,
    allocator: Arc<HandleAllocator>,
    clock: Arc<dyn Clock>,
    policy: SagaPolicy,
}

impl MembershipRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        allocator: Arc<HandleAllocator>,
        clock: Arc<dyn Clock>,
        policy: SagaPolicy,
    ) -> Self {
        Self {
            store,
            allocator,
            clock,
            policy,
        }
    }

    /// Create a community owned by `owner`, who becomes its first member
    pub async fn create_community(
        &self,
        display_name: &str,
        owner: &Handle,
        image: Option<String>,
    ) -> Result<Community, MembershipError> {
        let display_name = DisplayName::parse(display_name)?;
        if self.store.account_by_handle(owner).await?.is_none() {
            return Err(MembershipError::AccountNotFound(owner.to_string()));
        }

        let handle = self
            .allocator
            .allocate(Namespace::Communities, &display_name)
            .await?;
        let community = Community::new(display_name, handle, owner.clone(), image, self.clock.now());
        match self.store.insert_community(&community).await {
            Ok(()) => {}
            Err(source @ StoreError::Timeout { .. }) => {
                return Err(self
                    .journal_unsettled(SagaOperation::Create, [(&community.handle, owner)], source)
                    .await)
            }
            Err(e) => return Err(e.into()),
        }

        self.complete_account_side(SagaOperation::Create, &community.handle, owner, Some(Role::Owner))
            .await?;

        info!(community = %community.handle, owner = %owner, "Created community");
        Ok(community)
    }

    /// Add `account` to the community as a member
    pub async fn join(&self, community_id: &CommunityId, account: &Handle) -> Result<Community, MembershipError> {
        let community = self.load_community(community_id).await?;
        let member = self
            .store
            .account_by_handle(account)
            .await?
            .ok_or_else(|| MembershipError::AccountNotFound(account.to_string()))?;

        if community.is_member(account) || member.memberships.contains(&community.handle) {
            return Err(MembershipError::AlreadyMember {
                account: account.clone(),
                community: community.handle,
            });
        }

        let updated = match self.store.add_member(community_id, account, Role::Member).await {
            Ok(updated) => updated,
            Err(StoreError::Duplicate { .. }) => {
                return Err(MembershipError::AlreadyMember {
                    account: account.clone(),
                    community: community.handle,
                })
            }
            Err(StoreError::NotFound { .. }) => {
                return Err(MembershipError::CommunityNotFound(community_id.to_string()))
            }
            Err(source @ StoreError::Timeout { .. }) => {
                return Err(self
                    .journal_unsettled(SagaOperation::Join, [(&community.handle, account)], source)
                    .await)
            }
            Err(e) => return Err(e.into()),
        };

        self.complete_account_side(SagaOperation::Join, &updated.handle, account, Some(Role::Member))
            .await?;

        info!(community = %updated.handle, account = %account, "Joined community");
        Ok(updated)
    }

    /// Remove `account` from the community. The owner cannot leave.
    pub async fn leave(&self, community_id: &CommunityId, account: &Handle) -> Result<(), MembershipError> {
        let community = self.load_community(community_id).await?;
        if community.is_owner(account) {
            return Err(MembershipError::OwnerCannotLeave {
                account: account.clone(),
                community: community.handle,
            });
        }

        let listed_by_account = self
            .store
            .account_by_handle(account)
            .await?
            .ok_or_else(|| MembershipError::AccountNotFound(account.to_string()))?
            .memberships
            .contains(&community.handle);
        if !community.is_member(account) && !listed_by_account {
            return Err(MembershipError::NotMember {
                account: account.clone(),
                community: community.handle,
            });
        }

        match self.store.remove_member(community_id, account).await {
            Ok(_) => {}
            Err(StoreError::Constraint(_)) => {
                return Err(MembershipError::OwnerCannotLeave {
                    account: account.clone(),
                    community: community.handle,
                })
            }
            Err(StoreError::NotFound { .. }) => {
                return Err(MembershipError::CommunityNotFound(community_id.to_string()))
            }
            Err(source @ StoreError::Timeout { .. }) => {
                return Err(self
                    .journal_unsettled(SagaOperation::Leave, [(&community.handle, account)], source)
                    .await)
            }
            Err(e) => return Err(e.into()),
        }

        self.complete_account_side(SagaOperation::Leave, &community.handle, account, None)
            .await?;

        info!(community = %community.handle, account = %account, "Left community");
        Ok(())
    }

    pub async fn community(&self, community_id: &CommunityId) -> Result<Community, MembershipError> {
        self.load_community(community_id).await
    }

    /// Rename and/or re-image a community; handle and owner are fixed
    pub async fn update_community(
        &self,
        community_id: &CommunityId,
        display_name: Option<&str>,
        image: Option<String>,
    ) -> Result<Community, MembershipError> {
        let patch = CommunityPatch {
            display_name: display_name.map(DisplayName::parse).transpose()?,
            image,
        };
        if patch.is_empty() {
            return self.load_community(community_id).await;
        }

        match self.store.update_community(community_id, &patch).await {
            Ok(community) => {
                info!(community = %community.handle, "Updated community");
                Ok(community)
            }
            Err(StoreError::NotFound { .. }) => Err(MembershipError::CommunityNotFound(community_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a community and strip it from every member's account
    ///
    /// The per-member account-side writes run concurrently, so the whole
    /// operation is bounded by one saga deadline however large the roster.
    pub async fn delete_community(&self, community_id: &CommunityId) -> Result<Community, MembershipError> {
        let current = self.load_community(community_id).await?;
        let community = match self.store.delete_community(community_id).await {
            Ok(Some(community)) => community,
            Ok(None) => return Err(MembershipError::CommunityNotFound(community_id.to_string())),
            Err(source @ StoreError::Timeout { .. }) => {
                let pairs: Vec<(&Handle, &Handle)> = current.members.handles().map(|member| (&current.handle, member)).collect();
                return Err(self
                    .journal_unsettled(SagaOperation::DeleteCommunity, pairs, source)
                    .await);
            }
            Err(e) => return Err(e.into()),
        };

        let strips = community.members.handles().map(|member| {
            self.complete_account_side(SagaOperation::DeleteCommunity, &community.handle, member, None)
        });
        let first_failure = join_all(strips).await.into_iter().find_map(Result::err);

        info!(community = %community.handle, members = community.members.len(), "Deleted community");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(community),
        }
    }

    /// Delete an account that owns no community, leaving every community it
    /// belongs to first
    pub async fn delete_account(&self, account_id: &AccountId) -> Result<(), MembershipError> {
        let account = self
            .store
            .account_by_id(account_id)
            .await?
            .ok_or_else(|| MembershipError::AccountNotFound(account_id.to_string()))?;

        let owned = self.store.communities_owned_by(&account.handle).await?;
        if !owned.is_empty() {
            return Err(MembershipError::OwnsCommunities {
                account: account.handle,
                count: owned.len(),
            });
        }

        // Every roster touched so far is journaled if a later one fails
        let mut touched: Vec<&Handle> = Vec::new();
        for community_handle in account.memberships.handles() {
            let removed = match self.store.community_by_handle(community_handle).await {
                Ok(Some(community)) => {
                    touched.push(community_handle);
                    self.store.remove_member(&community.id, &account.handle).await
                }
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };
            if let Err(source) = removed {
                let pairs: Vec<(&Handle, &Handle)> = touched.iter().map(|community| (*community, &account.handle)).collect();
                return Err(self
                    .journal_unsettled(SagaOperation::DeleteAccount, pairs, source)
                    .await);
            }
        }

        let store = &self.store;
        let deleted = retry_idempotent(&self.policy, "delete_account", move || async move {
            store.delete_account(account_id).await
        })
        .await;

        match deleted {
            Ok(_) => {
                info!(account = %account.handle, "Deleted account");
                Ok(())
            }
            Err(source) => {
                let pairs: Vec<(&Handle, &Handle)> = account
                    .memberships
                    .handles()
                    .map(|community| (community, &account.handle))
                    .collect();
                Err(self
                    .journal_unsettled(SagaOperation::DeleteAccount, pairs, source)
                    .await)
            }
        }
    }

    async fn load_community(&self, community_id: &CommunityId) -> Result<Community, MembershipError> {
        self.store
            .community_by_id(community_id)
            .await?
            .ok_or_else(|| MembershipError::CommunityNotFound(community_id.to_string()))
    }

    /// Make `account` list `community` with `role`, or not at all for `None`
    async fn complete_account_side(
        &self,
        operation: SagaOperation,
        community: &Handle,
        account: &Handle,
        role: Option<Role>,
    ) -> Result<(), MembershipError> {
        let store = &self.store;
        let result = retry_idempotent(&self.policy, operation.as_str(), move || async move {
            match role {
                Some(role) => store.put_membership(account, community, role).await,
                None => store.drop_membership(account, community).await.map(|_| ()),
            }
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(source) => Err(self
                .journal_unsettled(operation, [(community, account)], source)
                .await),
        }
    }

    /// Journal every `(community, account)` pair and report the first one as
    /// partially applied. With no pairs nothing changed and `source` is
    /// returned as a plain store error.
    async fn journal_unsettled<'a>(
        &self,
        operation: SagaOperation,
        pairs: impl IntoIterator<Item = (&'a Handle, &'a Handle)>,
        source: StoreError,
    ) -> MembershipError {
        let mut first = None;
        for (community, account) in pairs {
            self.journal(operation, community, account).await;
            first.get_or_insert((community, account));
        }
        match first {
            Some((community, account)) => MembershipError::PartiallyApplied {
                operation,
                community: community.clone(),
                account: account.clone(),
                source,
            },
            None => source.into(),
        }
    }

    async fn journal(&self, operation: SagaOperation, community: &Handle, account: &Handle) {
        metrics::counter!(telemetry::SAGA_PARTIAL, "op" => operation.as_str()).increment(1);
        let repair = Repair::new(operation, community.clone(), account.clone(), self.clock.now());
        match self.store.record_repair(&repair).await {
            Ok(()) => warn!(
                operation = %operation,
                community = %community,
                account = %account,
                repair = %repair.id,
                "Account side not applied, repair recorded"
            ),
            Err(e) => error!(
                operation = %operation,
                community = %community,
                account = %account,
                error = %e,
                "Account side not applied and repair could not be recorded"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Classify, ErrorKind};
    use crate::test_utils::{registry_fixture, Fixture};

    #[tokio::test]
    async fn test_create_lists_owner_on_both_sides() {
        let Fixture { registry, identity, .. } = registry_fixture();
        let alice = identity.register("alice", "alice@example.com").await.unwrap();

        let community = registry.create_community("Test", &alice.handle, None).await.unwrap();
        assert_eq!(community.owner, alice.handle);
        assert_eq!(community.role_of(&alice.handle), Some(Role::Owner));

        let alice = identity.account(&alice.id).await.unwrap();
        assert_eq!(alice.memberships.get(&community.handle), Some(Role::Owner));
    }

    #[tokio::test]
    async fn test_create_requires_owner_account() {
        let Fixture { registry, .. } = registry_fixture();
        let err = registry
            .create_community("Test", &"ghost:0001".parse().unwrap(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_second_join_conflicts() {
        let Fixture { registry, identity, .. } = registry_fixture();
        let alice = identity.register("alice", "alice@example.com").await.unwrap();
        let bob = identity.register("bob", "bob@example.com").await.unwrap();
        let community = registry.create_community("Test", &alice.handle, None).await.unwrap();

        registry.join(&community.id, &bob.handle).await.unwrap();
        let err = registry.join(&community.id, &bob.handle).await.unwrap_err();
        assert!(matches!(err, MembershipError::AlreadyMember { .. }));

        let community = registry.community(&community.id).await.unwrap();
        assert_eq!(community.members.len(), 2);
    }

    #[tokio::test]
    async fn test_owner_cannot_leave() {
        let Fixture { registry, identity, .. } = registry_fixture();
        let alice = identity.register("alice", "alice@example.com").await.unwrap();
        let community = registry.create_community("Test", &alice.handle, None).await.unwrap();

        let err = registry.leave(&community.id, &alice.handle).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(registry.community(&community.id).await.unwrap(), community);
    }

    #[tokio::test]
    async fn test_leave_without_membership_conflicts() {
        let Fixture { registry, identity, .. } = registry_fixture();
        let alice = identity.register("alice", "alice@example.com").await.unwrap();
        let bob = identity.register("bob", "bob@example.com").await.unwrap();
        let community = registry.create_community("Test", &alice.handle, None).await.unwrap();

        let err = registry.leave(&community.id, &bob.handle).await.unwrap_err();
        assert!(matches!(err, MembershipError::NotMember { .. }));
    }

    #[tokio::test]
    async fn test_update_keeps_handle_and_owner() {
        let Fixture { registry, identity, .. } = registry_fixture();
        let alice = identity.register("alice", "alice@example.com").await.unwrap();
        let community = registry.create_community("Test", &alice.handle, None).await.unwrap();

        let updated = registry
            .update_community(&community.id, Some("Renamed"), Some("https://img.example/r.png".into()))
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_str(), "Renamed");
        assert_eq!(updated.handle, community.handle);
        assert_eq!(updated.owner, community.owner);

        let err = registry
            .update_community(&community.id, Some("bad name"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_delete_community_strips_members() {
        let Fixture { registry, identity, .. } = registry_fixture();
        let alice = identity.register("alice", "alice@example.com").await.unwrap();
        let bob = identity.register("bob", "bob@example.com").await.unwrap();
        let community = registry.create_community("Test", &alice.handle, None).await.unwrap();
        registry.join(&community.id, &bob.handle).await.unwrap();

        registry.delete_community(&community.id).await.unwrap();
        for id in [&alice.id, &bob.id] {
            let account = identity.account(id).await.unwrap();
            assert!(account.memberships.is_empty());
        }
        let err = registry.community(&community.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_account_rules() {
        let Fixture { registry, identity, .. } = registry_fixture();
        let alice = identity.register("alice", "alice@example.com").await.unwrap();
        let bob = identity.register("bob", "bob@example.com").await.unwrap();
        let community = registry.create_community("Test", &alice.handle, None).await.unwrap();
        registry.join(&community.id, &bob.handle).await.unwrap();

        let err = registry.delete_account(&alice.id).await.unwrap_err();
        assert!(matches!(err, MembershipError::OwnsCommunities { count: 1, .. }));

        registry.delete_account(&bob.id).await.unwrap();
        let community = registry.community(&community.id).await.unwrap();
        assert!(!community.is_member(&bob.handle));
        assert_eq!(identity.account(&bob.id).await.unwrap_err().kind(), ErrorKind::NotFound);
    }
}
