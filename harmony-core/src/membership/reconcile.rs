//! Replaying journaled repairs

use super::{MembershipError, MembershipRegistry};
use crate::model::Repair;
use crate::store::StoreError;
use crate::telemetry;
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub repaired: usize,
    pub remaining: usize,
}

impl MembershipRegistry {
    /// Force the account side of every journaled pair to match its community
    /// side, clearing each record once done. Records that still fail stay in
    /// the journal for the next pass.
    pub async fn reconcile(&self) -> Result<ReconcileReport, MembershipError> {
        let pending = self.store.pending_repairs().await?;
        let mut report = ReconcileReport {
            examined: pending.len(),
            ..ReconcileReport::default()
        };

        for repair in &pending {
            match self.repair_pair(repair).await {
                Ok(()) => {
                    self.store.resolve_repair(&repair.id).await?;
                    report.repaired += 1;
                    metrics::counter!(telemetry::REPAIRS_RESOLVED).increment(1);
                }
                Err(e) => {
                    warn!(repair = %repair.id, community = %repair.community, account = %repair.account, error = %e, "Repair failed, keeping record");
                    report.remaining += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            repaired = report.repaired,
            remaining = report.remaining,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    async fn repair_pair(&self, repair: &Repair) -> Result<(), StoreError> {
        let community = self.store.community_by_handle(&repair.community).await?;
        let account = self.store.account_by_handle(&repair.account).await?;

        match (community, account) {
            // Community gone: the account must not list it
            (None, _) => {
                self.store
                    .drop_membership(&repair.account, &repair.community)
                    .await?;
            }
            // Account gone: drop its dangling roster entry
            (Some(community), None) => {
                if !community.is_owner(&repair.account) {
                    self.store.remove_member(&community.id, &repair.account).await?;
                }
            }
            (Some(community), Some(_)) => match community.role_of(&repair.account) {
                Some(role) => {
                    self.store
                        .put_membership(&repair.account, &community.handle, role)
                        .await?
                }
                None => {
                    self.store
                        .drop_membership(&repair.account, &community.handle)
                        .await?;
                }
            },
        }
        Ok(())
    }
}
