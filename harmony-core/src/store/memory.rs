//! In-process backend

use super::{AccountStore, CommunityStore, RepairJournal, ReservationStore, StoreError};
use crate::handle::{DisplayName, Handle, Namespace};
use crate::model::{Account, Community, CommunityPatch, Mail, Repair, Reservation, RosterError};
use crate::role::Role;
use crate::types::{AccountId, CommunityId, RepairId};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    account_handles: HashMap<Handle, AccountId>,
    mails: HashMap<Mail, AccountId>,
    communities: HashMap<CommunityId, Community>,
    community_handles: HashMap<Handle, CommunityId>,
    reservations: HashMap<(Namespace, DisplayName), Reservation>,
    repairs: Vec<Repair>,
}

impl State {
    fn account_id(&self, handle: &Handle) -> Option<AccountId> {
        self.account_handles.get(handle).cloned()
    }
}

/// Store backed by hash maps behind one `RwLock`; each call takes the lock
/// once, so every write is atomic
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn load_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
    ) -> Result<Option<Reservation>, StoreError> {
        let state = self.state.read().await;
        Ok(state.reservations.get(&(namespace, name.clone())).cloned())
    }

    async fn commit_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
        codes: &BTreeSet<u16>,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let key = (namespace, name.clone());
        let current = state.reservations.get(&key).map(|r| r.version);
        if current != expected {
            return Err(StoreError::VersionConflict {
                key: format!("{}/{}", namespace, name),
            });
        }
        let version = current.map_or(1, |v| v + 1);
        state.reservations.insert(
            key,
            Reservation {
                codes: codes.clone(),
                version,
            },
        );
        Ok(version)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::Duplicate { field: "id" });
        }
        if state.mails.contains_key(&account.mail) {
            return Err(StoreError::Duplicate { field: "mail" });
        }
        if state.account_handles.contains_key(&account.handle) {
            return Err(StoreError::Duplicate { field: "handle" });
        }
        state.mails.insert(account.mail.clone(), account.id.clone());
        state
            .account_handles
            .insert(account.handle.clone(), account.id.clone());
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.state.read().await.accounts.get(id).cloned())
    }

    async fn account_by_handle(&self, handle: &Handle) -> Result<Option<Account>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .account_id(handle)
            .and_then(|id| state.accounts.get(&id).cloned()))
    }

    async fn account_by_mail(&self, mail: &Mail) -> Result<Option<Account>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .mails
            .get(mail)
            .and_then(|id| state.accounts.get(id).cloned()))
    }

    async fn rename_account(&self, id: &AccountId, name: &DisplayName) -> Result<Account, StoreError> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(id)
            .ok_or(StoreError::NotFound { entity: "account" })?;
        account.display_name = name.clone();
        Ok(account.clone())
    }

    async fn delete_account(&self, id: &AccountId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.accounts.remove(id) {
            Some(account) => {
                state.mails.remove(&account.mail);
                state.account_handles.remove(&account.handle);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn put_membership(
        &self,
        account: &Handle,
        community: &Handle,
        role: Role,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let id = state
            .account_id(account)
            .ok_or(StoreError::NotFound { entity: "account" })?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "account" })?;
        account.memberships.set(community.clone(), role);
        Ok(())
    }

    async fn drop_membership(&self, account: &Handle, community: &Handle) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(id) = state.account_id(account) else {
            return Ok(false);
        };
        Ok(state
            .accounts
            .get_mut(&id)
            .and_then(|a| a.memberships.remove(community))
            .is_some())
    }
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn insert_community(&self, community: &Community) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.communities.contains_key(&community.id) {
            return Err(StoreError::Duplicate { field: "id" });
        }
        if state.community_handles.contains_key(&community.handle) {
            return Err(StoreError::Duplicate { field: "handle" });
        }
        state
            .community_handles
            .insert(community.handle.clone(), community.id.clone());
        state.communities.insert(community.id.clone(), community.clone());
        Ok(())
    }

    async fn community_by_id(&self, id: &CommunityId) -> Result<Option<Community>, StoreError> {
        Ok(self.state.read().await.communities.get(id).cloned())
    }

    async fn community_by_handle(&self, handle: &Handle) -> Result<Option<Community>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .community_handles
            .get(handle)
            .and_then(|id| state.communities.get(id).cloned()))
    }

    async fn communities_owned_by(&self, owner: &Handle) -> Result<Vec<Community>, StoreError> {
        let state = self.state.read().await;
        let mut owned: Vec<Community> = state
            .communities
            .values()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|c| c.created_at);
        Ok(owned)
    }

    async fn update_community(
        &self,
        id: &CommunityId,
        patch: &CommunityPatch,
    ) -> Result<Community, StoreError> {
        let mut state = self.state.write().await;
        let community = state
            .communities
            .get_mut(id)
            .ok_or(StoreError::NotFound { entity: "community" })?;
        community.apply(patch);
        Ok(community.clone())
    }

    async fn delete_community(&self, id: &CommunityId) -> Result<Option<Community>, StoreError> {
        let mut state = self.state.write().await;
        let removed = state.communities.remove(id);
        if let Some(community) = &removed {
            state.community_handles.remove(&community.handle);
        }
        Ok(removed)
    }

    async fn add_member(
        &self,
        id: &CommunityId,
        account: &Handle,
        role: Role,
    ) -> Result<Community, StoreError> {
        let mut state = self.state.write().await;
        let community = state
            .communities
            .get_mut(id)
            .ok_or(StoreError::NotFound { entity: "community" })?;
        community
            .add_member(account.clone(), role)
            .map_err(|e| match e {
                RosterError::AlreadyMember(_) => StoreError::Duplicate { field: "member" },
                other => StoreError::Constraint(other.to_string()),
            })?;
        Ok(community.clone())
    }

    async fn remove_member(&self, id: &CommunityId, account: &Handle) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let community = state
            .communities
            .get_mut(id)
            .ok_or(StoreError::NotFound { entity: "community" })?;
        let removed = community
            .remove_member(account)
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        Ok(removed.is_some())
    }
}

#[async_trait]
impl RepairJournal for MemoryStore {
    async fn record_repair(&self, repair: &Repair) -> Result<(), StoreError> {
        self.state.write().await.repairs.push(repair.clone());
        Ok(())
    }

    async fn pending_repairs(&self) -> Result<Vec<Repair>, StoreError> {
        Ok(self.state.read().await.repairs.clone())
    }

    async fn resolve_repair(&self, id: &RepairId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let before = state.repairs.len();
        state.repairs.retain(|r| &r.id != id);
        Ok(state.repairs.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn name(raw: &str) -> DisplayName {
        DisplayName::parse(raw).unwrap()
    }

    fn account(handle: &str, mail: &str) -> Account {
        let handle: Handle = handle.parse().unwrap();
        Account::new(
            handle.name().clone(),
            handle,
            Mail::parse(mail).unwrap(),
            Timestamp::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_reservation_versioning() {
        let store = MemoryStore::new();
        let codes: BTreeSet<u16> = [12].into_iter().collect();

        let v1 = store
            .commit_reservation(Namespace::Accounts, &name("alice"), &codes, None)
            .await
            .unwrap();
        assert_eq!(v1, 1);

        // Insert-if-absent loses once a reservation exists
        let err = store
            .commit_reservation(Namespace::Accounts, &name("alice"), &codes, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        // Namespaces are independent
        store
            .commit_reservation(Namespace::Communities, &name("alice"), &codes, None)
            .await
            .unwrap();

        let loaded = store
            .load_reservation(Namespace::Accounts, &name("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.version, 1);
        assert!(loaded.codes.contains(&12));
    }

    #[tokio::test]
    async fn test_duplicate_mail_rejected() {
        let store = MemoryStore::new();
        store
            .insert_account(&account("alice:0001", "alice@example.com"))
            .await
            .unwrap();
        let err = store
            .insert_account(&account("alice:0002", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "mail" }));
    }

    #[tokio::test]
    async fn test_membership_writes_are_idempotent() {
        let store = MemoryStore::new();
        let alice = account("alice:0001", "alice@example.com");
        store.insert_account(&alice).await.unwrap();
        let community: Handle = "Test:0001".parse().unwrap();

        store.put_membership(&alice.handle, &community, Role::Member).await.unwrap();
        store.put_membership(&alice.handle, &community, Role::Member).await.unwrap();
        let stored = store.account_by_id(&alice.id).await.unwrap().unwrap();
        assert_eq!(stored.memberships.len(), 1);

        assert!(store.drop_membership(&alice.handle, &community).await.unwrap());
        assert!(!store.drop_membership(&alice.handle, &community).await.unwrap());
        assert!(!store
            .drop_membership(&"ghost:0001".parse().unwrap(), &community)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_put_membership_requires_account() {
        let store = MemoryStore::new();
        let err = store
            .put_membership(&"ghost:0001".parse().unwrap(), &"Test:0001".parse().unwrap(), Role::Member)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "account" }));
    }

    #[tokio::test]
    async fn test_roster_rules() {
        let store = MemoryStore::new();
        let owner: Handle = "alice:0001".parse().unwrap();
        let community = Community::new(
            name("Test"),
            "Test:0001".parse().unwrap(),
            owner.clone(),
            None,
            Timestamp::from_millis(1),
        );
        store.insert_community(&community).await.unwrap();

        let bob: Handle = "bob:0001".parse().unwrap();
        store.add_member(&community.id, &bob, Role::Member).await.unwrap();
        assert!(matches!(
            store.add_member(&community.id, &bob, Role::Member).await,
            Err(StoreError::Duplicate { field: "member" })
        ));
        assert!(matches!(
            store.remove_member(&community.id, &owner).await,
            Err(StoreError::Constraint(_))
        ));
        assert!(store.remove_member(&community.id, &bob).await.unwrap());
        assert!(!store.remove_member(&community.id, &bob).await.unwrap());
    }
}
