use super::{DisplayName, Handle, HandleError, Namespace, CODE_SPACE};
use crate::store::{Store, StoreError};
use crate::telemetry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Commit attempts before giving up on a contended reservation.
///
/// Every lost commit means another allocation for the same name went
/// through, so a burst of fewer callers than this cannot run out.
pub const DEFAULT_MAX_ATTEMPTS: usize = 256;

/// Upper bound of the random pause after a lost commit
const CONFLICT_BACKOFF_CAP: Duration = Duration::from_millis(8);

/// Above this many issued codes, draw from the free list instead of redrawing
const DENSE_THRESHOLD: usize = CODE_SPACE as usize / 2;

/// Issues `name:NNNN` handles.
///
/// Each allocation reads the reservation for `(namespace, name)` with its
/// version, picks an unused code and commits the extended set conditionally
/// on that version. A lost race waits a short random pause, re-reads and
/// tries again.
pub struct HandleAllocator {
    store: Arc<dyn Store>,
    rng: Mutex<StdRng>,
    max_attempts: usize,
}

impl HandleAllocator {
    pub fn new(store: Arc<dyn Store>, max_attempts: usize) -> Self {
        Self::with_rng(store, max_attempts, StdRng::from_os_rng())
    }

    /// Allocator with a caller-supplied generator (deterministic tests)
    pub fn with_rng(store: Arc<dyn Store>, max_attempts: usize, rng: StdRng) -> Self {
        Self {
            store,
            rng: Mutex::new(rng),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Reserve a fresh code for `name` and return the resulting handle
    pub async fn allocate(&self, namespace: Namespace, name: &DisplayName) -> Result<Handle, HandleError> {
        for attempt in 1..=self.max_attempts {
            let reservation = self.store.load_reservation(namespace, name).await?;
            let (mut codes, expected) = match reservation {
                Some(r) => (r.codes, Some(r.version)),
                None => (BTreeSet::new(), None),
            };

            if codes.len() >= CODE_SPACE as usize {
                warn!(namespace = %namespace, name = %name, "Handle pool exhausted");
                metrics::counter!(telemetry::HANDLE_EXHAUSTED, "namespace" => namespace.as_str())
                    .increment(1);
                return Err(HandleError::Capacity {
                    namespace,
                    name: name.to_string(),
                });
            }

            let code = self.draw(&codes);
            codes.insert(code);

            match self
                .store
                .commit_reservation(namespace, name, &codes, expected)
                .await
            {
                Ok(_) => {
                    let handle = Handle::new(name.clone(), code)?;
                    debug!(namespace = %namespace, handle = %handle, attempt, "Allocated handle");
                    metrics::counter!(telemetry::HANDLE_ALLOCATIONS, "namespace" => namespace.as_str())
                        .increment(1);
                    return Ok(handle);
                }
                Err(StoreError::VersionConflict { .. }) => {
                    debug!(namespace = %namespace, name = %name, attempt, "Reservation changed underneath, retrying");
                    metrics::counter!(telemetry::HANDLE_CONFLICTS).increment(1);
                    tokio::time::sleep(self.conflict_pause(attempt)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(namespace = %namespace, name = %name, attempts = self.max_attempts, "Gave up allocating handle");
        Err(HandleError::Contention {
            name: name.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Jittered pause growing with `attempt` up to [`CONFLICT_BACKOFF_CAP`]
    fn conflict_pause(&self, attempt: usize) -> Duration {
        let cap = CONFLICT_BACKOFF_CAP.as_micros() as u64;
        let ceiling = (attempt as u64 * 500).min(cap);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Duration::from_micros(rng.random_range(0..=ceiling))
    }

    /// Pick a code not in `issued`. `issued` must have room left.
    fn draw(&self, issued: &BTreeSet<u16>) -> u16 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        if issued.len() < DENSE_THRESHOLD {
            loop {
                let code = rng.random_range(0..CODE_SPACE);
                if !issued.contains(&code) {
                    return code;
                }
            }
        }
        let free: Vec<u16> = (0..CODE_SPACE).filter(|c| !issued.contains(c)).collect();
        free[rng.random_range(0..free.len())]
    }
}
