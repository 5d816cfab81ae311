use crate::handle::{DisplayName, Handle, Namespace};
use crate::model::{Account, Community, CommunityPatch, Mail, Repair, Reservation};
use crate::role::Role;
use crate::store::{AccountStore, CommunityStore, RepairJournal, ReservationStore, Store, StoreError};
use crate::types::{AccountId, CommunityId, RepairId};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store wrapper that fails writes on demand.
///
/// Injected failures are [`StoreError::Unavailable`], which the saga treats
/// as transient, so they exercise the retry path before the repair path.
/// Late roster writes instead apply the change and then report
/// [`StoreError::Timeout`].
pub struct FaultyStore {
    inner: Arc<dyn Store>,
    membership_faults: AtomicUsize,
    delete_faults: AtomicUsize,
    /// `remove_member` calls still allowed through; `usize::MAX` means no limit
    removals_allowed: AtomicUsize,
    late_roster_writes: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            membership_faults: AtomicUsize::new(0),
            delete_faults: AtomicUsize::new(0),
            removals_allowed: AtomicUsize::new(usize::MAX),
            late_roster_writes: AtomicBool::new(false),
        }
    }

    /// Fail the next `count` calls to `put_membership` / `drop_membership`
    pub fn fail_membership_writes(&self, count: usize) {
        self.membership_faults.store(count, Ordering::SeqCst);
    }

    /// Fail every account-side membership write until [`FaultyStore::heal`]
    pub fn break_membership_writes(&self) {
        self.fail_membership_writes(usize::MAX);
    }

    pub fn fail_account_deletes(&self, count: usize) {
        self.delete_faults.store(count, Ordering::SeqCst);
    }

    /// Let `allowed` more `remove_member` calls through, then fail the rest
    pub fn fail_member_removals_after(&self, allowed: usize) {
        self.removals_allowed.store(allowed, Ordering::SeqCst);
    }

    /// Apply community-side writes but answer with a timeout, like a
    /// blocking write that commits after its caller gave up
    pub fn time_out_after_roster_writes(&self) {
        self.late_roster_writes.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.membership_faults.store(0, Ordering::SeqCst);
        self.delete_faults.store(0, Ordering::SeqCst);
        self.removals_allowed.store(usize::MAX, Ordering::SeqCst);
        self.late_roster_writes.store(false, Ordering::SeqCst);
    }

    fn spend(budget: &AtomicUsize) -> Result<(), StoreError> {
        let spent = budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
            0 | usize::MAX => None,
            n => Some(n - 1),
        });
        match spent {
            Err(0) => Err(StoreError::Unavailable("injected fault".into())),
            _ => Ok(()),
        }
    }

    fn late<T>(&self, op: &'static str, result: Result<T, StoreError>) -> Result<T, StoreError> {
        match result {
            Ok(_) if self.late_roster_writes.load(Ordering::SeqCst) => Err(StoreError::Timeout {
                op,
                limit: Duration::ZERO,
            }),
            other => other,
        }
    }

    fn trip(counter: &AtomicUsize) -> Result<(), StoreError> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if tripped {
            return Err(StoreError::Unavailable("injected fault".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for FaultyStore {
    async fn load_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
    ) -> Result<Option<Reservation>, StoreError> {
        self.inner.load_reservation(namespace, name).await
    }

    async fn commit_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
        codes: &BTreeSet<u16>,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        self.inner.commit_reservation(namespace, name, codes, expected).await
    }
}

#[async_trait]
impl AccountStore for FaultyStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.insert_account(account).await
    }

    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        self.inner.account_by_id(id).await
    }

    async fn account_by_handle(&self, handle: &Handle) -> Result<Option<Account>, StoreError> {
        self.inner.account_by_handle(handle).await
    }

    async fn account_by_mail(&self, mail: &Mail) -> Result<Option<Account>, StoreError> {
        self.inner.account_by_mail(mail).await
    }

    async fn rename_account(&self, id: &AccountId, name: &DisplayName) -> Result<Account, StoreError> {
        self.inner.rename_account(id, name).await
    }

    async fn delete_account(&self, id: &AccountId) -> Result<bool, StoreError> {
        Self::trip(&self.delete_faults)?;
        self.inner.delete_account(id).await
    }

    async fn put_membership(
        &self,
        account: &Handle,
        community: &Handle,
        role: Role,
    ) -> Result<(), StoreError> {
        Self::trip(&self.membership_faults)?;
        self.inner.put_membership(account, community, role).await
    }

    async fn drop_membership(&self, account: &Handle, community: &Handle) -> Result<bool, StoreError> {
        Self::trip(&self.membership_faults)?;
        self.inner.drop_membership(account, community).await
    }
}

#[async_trait]
impl CommunityStore for FaultyStore {
    async fn insert_community(&self, community: &Community) -> Result<(), StoreError> {
        let result = self.inner.insert_community(community).await;
        self.late("insert_community", result)
    }

    async fn community_by_id(&self, id: &CommunityId) -> Result<Option<Community>, StoreError> {
        self.inner.community_by_id(id).await
    }

    async fn community_by_handle(&self, handle: &Handle) -> Result<Option<Community>, StoreError> {
        self.inner.community_by_handle(handle).await
    }

    async fn communities_owned_by(&self, owner: &Handle) -> Result<Vec<Community>, StoreError> {
        self.inner.communities_owned_by(owner).await
    }

    async fn update_community(
        &self,
        id: &CommunityId,
        patch: &CommunityPatch,
    ) -> Result<Community, StoreError> {
        self.inner.update_community(id, patch).await
    }

    async fn delete_community(&self, id: &CommunityId) -> Result<Option<Community>, StoreError> {
        let result = self.inner.delete_community(id).await;
        self.late("delete_community", result)
    }

    async fn add_member(
        &self,
        id: &CommunityId,
        account: &Handle,
        role: Role,
    ) -> Result<Community, StoreError> {
        let result = self.inner.add_member(id, account, role).await;
        self.late("add_member", result)
    }

    async fn remove_member(&self, id: &CommunityId, account: &Handle) -> Result<bool, StoreError> {
        Self::spend(&self.removals_allowed)?;
        let result = self.inner.remove_member(id, account).await;
        self.late("remove_member", result)
    }
}

#[async_trait]
impl RepairJournal for FaultyStore {
    async fn record_repair(&self, repair: &Repair) -> Result<(), StoreError> {
        self.inner.record_repair(repair).await
    }

    async fn pending_repairs(&self) -> Result<Vec<Repair>, StoreError> {
        self.inner.pending_repairs().await
    }

    async fn resolve_repair(&self, id: &RepairId) -> Result<bool, StoreError> {
        self.inner.resolve_repair(id).await
    }
}
