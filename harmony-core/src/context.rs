//! Process-wide wiring
//!
//! [`Harmony`] opens the configured store once, wraps it with the per-call
//! deadline, and hands the same `Arc<dyn Store>` to every component.

use crate::auth::Hs256Verifier;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StoreBackend};
use crate::handle::HandleAllocator;
use crate::identity::IdentityService;
use crate::invite::InviteIssuer;
use crate::membership::MembershipRegistry;
use crate::store::{MemoryStore, SqlStore, Store, StoreError, TimedStore};
use std::sync::Arc;
use tracing::info;

pub struct Harmony {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub identity: IdentityService,
    pub registry: MembershipRegistry,
    pub invites: InviteIssuer,
    pub verifier: Arc<Hs256Verifier>,
}

impl Harmony {
    /// Open the backend named by `config.store` and build every component
    pub fn from_config(config: Config) -> Result<Self, StoreError> {
        let store: Arc<dyn Store> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Sqlite => {
                if let Some(dir) = config.store.database_path.parent() {
                    if !dir.as_os_str().is_empty() {
                        std::fs::create_dir_all(dir).map_err(|e| {
                            StoreError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
                        })?;
                    }
                }
                Arc::new(SqlStore::open_with(
                    &config.store.database_path,
                    config.store.pool_size,
                    config.store.busy_timeout,
                )?)
            }
        };
        info!(
            backend = ?config.store.backend,
            path = %config.store.database_path.display(),
            "Opened store"
        );
        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    /// Build every component around an existing backend and clock
    pub fn with_store(config: Config, backend: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let store: Arc<dyn Store> = Arc::new(TimedStore::new(backend, config.store.operation_timeout));
        let allocator = Arc::new(HandleAllocator::new(store.clone(), config.handles.max_attempts));

        let identity = IdentityService::new(store.clone(), allocator.clone(), clock.clone());
        let registry = MembershipRegistry::new(
            store.clone(),
            allocator,
            clock.clone(),
            config.membership.saga_policy(),
        );
        let invites = InviteIssuer::new(store.clone(), clock.clone(), config.membership.invite_ttl);
        let verifier = Arc::new(Hs256Verifier::new(
            config.auth.token_secret.as_bytes().to_vec(),
            clock.clone(),
        ));

        Self {
            config,
            store,
            clock,
            identity,
            registry,
            invites,
            verifier,
        }
    }
}
