//! Per-call store deadlines

use super::{AccountStore, CommunityStore, RepairJournal, ReservationStore, Store, StoreError};
use crate::handle::{DisplayName, Handle, Namespace};
use crate::model::{Account, Community, CommunityPatch, Mail, Repair, Reservation};
use crate::role::Role;
use crate::types::{AccountId, CommunityId, RepairId};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Run `fut`, failing with [`StoreError::Timeout`] if it has not finished
/// after `limit`
pub async fn within<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(op, limit_ms = limit.as_millis() as u64, "Store call timed out");
            metrics::counter!(crate::telemetry::STORE_TIMEOUTS, "op" => op).increment(1);
            Err(StoreError::Timeout { op, limit })
        }
    }
}

/// Wraps a backend so every call is bounded by the same deadline
pub struct TimedStore {
    inner: Arc<dyn Store>,
    limit: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn Store>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

#[async_trait]
impl ReservationStore for TimedStore {
    async fn load_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
    ) -> Result<Option<Reservation>, StoreError> {
        within(self.limit, "load_reservation", self.inner.load_reservation(namespace, name)).await
    }

    async fn commit_reservation(
        &self,
        namespace: Namespace,
        name: &DisplayName,
        codes: &BTreeSet<u16>,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        within(
            self.limit,
            "commit_reservation",
            self.inner.commit_reservation(namespace, name, codes, expected),
        )
        .await
    }
}

#[async_trait]
impl AccountStore for TimedStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        within(self.limit, "insert_account", self.inner.insert_account(account)).await
    }

    async fn account_by_id(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        within(self.limit, "account_by_id", self.inner.account_by_id(id)).await
    }

    async fn account_by_handle(&self, handle: &Handle) -> Result<Option<Account>, StoreError> {
        within(self.limit, "account_by_handle", self.inner.account_by_handle(handle)).await
    }

    async fn account_by_mail(&self, mail: &Mail) -> Result<Option<Account>, StoreError> {
        within(self.limit, "account_by_mail", self.inner.account_by_mail(mail)).await
    }

    async fn rename_account(&self, id: &AccountId, name: &DisplayName) -> Result<Account, StoreError> {
        within(self.limit, "rename_account", self.inner.rename_account(id, name)).await
    }

    async fn delete_account(&self, id: &AccountId) -> Result<bool, StoreError> {
        within(self.limit, "delete_account", self.inner.delete_account(id)).await
    }

    async fn put_membership(
        &self,
        account: &Handle,
        community: &Handle,
        role: Role,
    ) -> Result<(), StoreError> {
        within(self.limit, "put_membership", self.inner.put_membership(account, community, role)).await
    }

    async fn drop_membership(&self, account: &Handle, community: &Handle) -> Result<bool, StoreError> {
        within(self.limit, "drop_membership", self.inner.drop_membership(account, community)).await
    }
}

#[async_trait]
impl CommunityStore for TimedStore {
    async fn insert_community(&self, community: &Community) -> Result<(), StoreError> {
        within(self.limit, "insert_community", self.inner.insert_community(community)).await
    }

    async fn community_by_id(&self, id: &CommunityId) -> Result<Option<Community>, StoreError> {
        within(self.limit, "community_by_id", self.inner.community_by_id(id)).await
    }

    async fn community_by_handle(&self, handle: &Handle) -> Result<Option<Community>, StoreError> {
        within(self.limit, "community_by_handle", self.inner.community_by_handle(handle)).await
    }

    async fn communities_owned_by(&self, owner: &Handle) -> Result<Vec<Community>, StoreError> {
        within(self.limit, "communities_owned_by", self.inner.communities_owned_by(owner)).await
    }

    async fn update_community(
        &self,
        id: &CommunityId,
        patch: &CommunityPatch,
    ) -> Result<Community, StoreError> {
        within(self.limit, "update_community", self.inner.update_community(id, patch)).await
    }

    async fn delete_community(&self, id: &CommunityId) -> Result<Option<Community>, StoreError> {
        within(self.limit, "delete_community", self.inner.delete_community(id)).await
    }

    async fn add_member(
        &self,
        id: &CommunityId,
        account: &Handle,
        role: Role,
    ) -> Result<Community, StoreError> {
        within(self.limit, "add_member", self.inner.add_member(id, account, role)).await
    }

    async fn remove_member(&self, id: &CommunityId, account: &Handle) -> Result<bool, StoreError> {
        within(self.limit, "remove_member", self.inner.remove_member(id, account)).await
    }
}

#[async_trait]
impl RepairJournal for TimedStore {
    async fn record_repair(&self, repair: &Repair) -> Result<(), StoreError> {
        within(self.limit, "record_repair", self.inner.record_repair(repair)).await
    }

    async fn pending_repairs(&self) -> Result<Vec<Repair>, StoreError> {
        within(self.limit, "pending_repairs", self.inner.pending_repairs()).await
    }

    async fn resolve_repair(&self, id: &RepairId) -> Result<bool, StoreError> {
        within(self.limit, "resolve_repair", self.inner.resolve_repair(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_within_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        };
        let err = within(Duration::from_secs(5), "slow_op", slow).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout { op: "slow_op", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_passes_results_through() {
        let value = within(Duration::from_secs(5), "fast_op", async { Ok::<_, StoreError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = within(Duration::from_secs(5), "fast_op", async {
            Err::<(), _>(StoreError::NotFound { entity: "account" })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
