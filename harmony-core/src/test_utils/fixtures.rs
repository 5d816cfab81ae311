use super::{FaultyStore, ManualClock};
use crate::auth::Hs256Verifier;
use crate::config::{Config, StoreBackend};
use crate::context::Harmony;
use crate::handle::Handle;
use crate::identity::IdentityService;
use crate::invite::InviteIssuer;
use crate::membership::MembershipRegistry;
use crate::store::{MemoryStore, Store};
use crate::types::CommunityId;
use std::sync::Arc;
use std::time::Duration;

/// In-memory config with a short saga budget so failure paths finish fast
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.store.backend = StoreBackend::Memory;
    config.membership.saga_deadline = Duration::from_millis(200);
    config.membership.initial_backoff = Duration::from_millis(5);
    config.membership.max_backoff = Duration::from_millis(40);
    config.auth.token_secret = "fixture-secret-0123456789".into();
    config
}

/// Components over a fault-injectable memory store and a manual clock
pub struct Fixture {
    pub store: Arc<FaultyStore>,
    pub clock: Arc<ManualClock>,
    pub identity: IdentityService,
    pub registry: MembershipRegistry,
    pub invites: InviteIssuer,
    pub verifier: Arc<Hs256Verifier>,
}

pub fn registry_fixture() -> Fixture {
    let store = Arc::new(FaultyStore::new(Arc::new(MemoryStore::new())));
    let clock = Arc::new(ManualClock::default());
    let harmony = Harmony::with_store(test_config(), store.clone(), clock.clone());
    Fixture {
        store,
        clock,
        identity: harmony.identity,
        registry: harmony.registry,
        invites: harmony.invites,
        verifier: harmony.verifier,
    }
}

/// Panic unless every listed account and community agree on each membership
/// that involves both of them
pub async fn assert_mirrored(store: &dyn Store, accounts: &[Handle], communities: &[CommunityId]) {
    for id in communities {
        let Some(community) = store.community_by_id(id).await.expect("load community") else {
            continue;
        };
        for handle in accounts {
            let account = store
                .account_by_handle(handle)
                .await
                .expect("load account")
                .unwrap_or_else(|| panic!("account {handle} missing"));
            assert_eq!(
                community.role_of(handle),
                account.memberships.get(&community.handle),
                "{} and {} disagree",
                community.handle,
                handle
            );
        }
    }
}
