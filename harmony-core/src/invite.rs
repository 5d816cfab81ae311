//! Time-bounded join links
//!
//! An invite is the community id plus an absolute expiry in epoch
//! milliseconds. Nothing signs it: any future expiry admits a join to any
//! community, whoever minted it.

use crate::auth::{AuthError, Claims, Guard};
use crate::clock::Clock;
use crate::error::{Classify, ErrorKind};
use crate::role::Role;
use crate::store::{Store, StoreError};
use crate::telemetry;
use crate::types::{CommunityId, Timestamp};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default invite lifetime
pub const DEFAULT_INVITE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("invalid invite: {0}")]
    Invalid(String),

    #[error("invite expired at {expired_at}")]
    Expired { expired_at: Timestamp },

    #[error("community {0} not found")]
    CommunityNotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Classify for InviteError {
    fn kind(&self) -> ErrorKind {
        match self {
            InviteError::Invalid(_) => ErrorKind::Invalid,
            InviteError::Expired { .. } => ErrorKind::Expired,
            InviteError::CommunityNotFound(_) => ErrorKind::NotFound,
            InviteError::Auth(e) => e.kind(),
            InviteError::Store(e) => e.kind(),
        }
    }
}

/// A minted invite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InviteLink {
    pub community_id: CommunityId,
    pub expires_at: Timestamp,
}

impl InviteLink {
    /// `{base}/communities/{id}/join?t={expiry}`
    pub fn url(&self, base: &str) -> String {
        format!(
            "{}/communities/{}/join?t={}",
            base.trim_end_matches('/'),
            self.community_id,
            self.expires_at.as_millis()
        )
    }
}

pub struct InviteIssuer {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl InviteIssuer {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint an invite for `community_id`; the caller must be at least a member
    pub async fn issue(
        &self,
        community_id: &CommunityId,
        claims: Option<&Claims>,
    ) -> Result<InviteLink, InviteError> {
        let community = self
            .store
            .community_by_id(community_id)
            .await?
            .ok_or_else(|| InviteError::CommunityNotFound(community_id.to_string()))?;
        let requester = Guard::require(claims, &community.handle, Role::Member)?;

        let link = InviteLink {
            community_id: community.id,
            expires_at: self.clock.now().saturating_add(self.ttl),
        };
        info!(community = %community.handle, requester = %requester, expires_at = %link.expires_at, "Issued invite");
        metrics::counter!(telemetry::INVITES_ISSUED).increment(1);
        Ok(link)
    }

    /// Accept a join parameter if it parses and lies in the future
    pub fn validate_for_join(&self, community_id: &CommunityId, expiry: Option<&str>) -> Result<(), InviteError> {
        let result = self.check_expiry(expiry);
        if let Err(e) = &result {
            debug!(community_id = %community_id, error = %e, "Rejected invite");
            metrics::counter!(telemetry::INVITES_REJECTED).increment(1);
        }
        result
    }

    fn check_expiry(&self, expiry: Option<&str>) -> Result<(), InviteError> {
        let raw = expiry
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| InviteError::Invalid("missing expiry parameter".into()))?;
        let millis: u64 = raw
            .parse()
            .map_err(|_| InviteError::Invalid(format!("expiry `{}` is not an integer", raw)))?;
        let expires_at = Timestamp::from_millis(millis);
        if self.clock.now() >= expires_at {
            return Err(InviteError::Expired { expired_at: expires_at });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::DisplayName;
    use crate::model::Community;
    use crate::role::RoleMap;
    use crate::store::{CommunityStore, MemoryStore};
    use crate::test_utils::ManualClock;

    const NOW: u64 = 1_700_000_000_000;

    async fn setup() -> (InviteIssuer, Arc<ManualClock>, Community) {
        let store = Arc::new(MemoryStore::new());
        let community = Community::new(
            DisplayName::parse("Test").unwrap(),
            "Test:0001".parse().unwrap(),
            "alice:0001".parse().unwrap(),
            None,
            Timestamp::from_millis(NOW),
        );
        store.insert_community(&community).await.unwrap();
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(NOW)));
        let issuer = InviteIssuer::new(store, clock.clone(), DEFAULT_INVITE_TTL);
        (issuer, clock, community)
    }

    fn claims(subject: &str, roles: &[(&str, Role)]) -> Claims {
        Claims {
            subject: subject.into(),
            roles: roles.iter().map(|(h, r)| (h.parse().unwrap(), *r)).collect::<RoleMap>(),
            iat: 0,
            exp: u64::MAX,
        }
    }

    #[tokio::test]
    async fn test_member_gets_link() {
        let (issuer, _, community) = setup().await;
        let owner = claims("alice:0001", &[("Test:0001", Role::Owner)]);
        let link = issuer.issue(&community.id, Some(&owner)).await.unwrap();
        assert_eq!(link.expires_at.as_millis(), NOW + 300_000);
        assert_eq!(
            link.url("http://localhost:8080/"),
            format!("http://localhost:8080/communities/{}/join?t={}", community.id, NOW + 300_000)
        );
    }

    #[tokio::test]
    async fn test_outsider_cannot_invite() {
        let (issuer, _, community) = setup().await;
        let outsider = claims("mallory:0001", &[]);
        let err = issuer.issue(&community.id, Some(&outsider)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = issuer.issue(&CommunityId::generate(), Some(&outsider)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_expiry_checks() {
        let (issuer, clock, community) = setup().await;
        let id = &community.id;

        assert_eq!(issuer.validate_for_join(id, None).unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(issuer.validate_for_join(id, Some("soon")).unwrap_err().kind(), ErrorKind::Invalid);
        assert_eq!(issuer.validate_for_join(id, Some("-5")).unwrap_err().kind(), ErrorKind::Invalid);

        let now = NOW.to_string();
        assert_eq!(issuer.validate_for_join(id, Some(&now)).unwrap_err().kind(), ErrorKind::Expired);

        let future = (NOW + 1).to_string();
        assert!(issuer.validate_for_join(id, Some(&future)).is_ok());

        clock.advance(Duration::from_millis(1));
        assert_eq!(issuer.validate_for_join(id, Some(&future)).unwrap_err().kind(), ErrorKind::Expired);
    }

    #[tokio::test]
    async fn test_expiry_is_not_bound_to_community() {
        let (issuer, _, _) = setup().await;
        let future = (NOW + 60_000).to_string();
        assert!(issuer.validate_for_join(&CommunityId::generate(), Some(&future)).is_ok());
    }
}
