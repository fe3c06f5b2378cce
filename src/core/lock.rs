//! core::lock
//!
//! Keyed, time-leased mutual exclusion over resource key sets.
//!
//! # Architecture
//!
//! Every mutating catalog operation locks `dependencies() ∪ {resource()}`
//! for its whole duration. The default implementation,
//! [`LeasedResourceLock`], keeps a single mutex-guarded table of
//! `key → (holder generation, deadline)` and wakes waiters through a
//! condition variable.
//!
//! # Invariants
//!
//! - A key set is taken all at once or not at all
//! - A lease older than the configured duration expires on access, so a
//!   crashed holder cannot block forever
//! - Locking is therefore advisory: a holder that outlives its lease may
//!   overlap with the next holder
//! - The guard releases on drop (RAII pattern), including during a panic
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeSet;
//! use std::time::Duration;
//! use schemagraph::core::lock::{LeasedResourceLock, ResourceGuard};
//! use schemagraph::core::types::{ResourceKey, ResourceKind};
//!
//! let lock = LeasedResourceLock::new(Duration::from_secs(120));
//! let keys: BTreeSet<_> = [ResourceKey::new(ResourceKind::Model, "car")].into();
//!
//! {
//!     let guard = ResourceGuard::acquire(&lock, keys.clone()).unwrap();
//!     assert!(guard.is_held());
//!     assert!(ResourceGuard::try_acquire(&lock, keys.clone()).unwrap().is_none());
//! }
//!
//! // Released when the guard went out of scope
//! assert!(ResourceGuard::try_acquire(&lock, keys).unwrap().is_some());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use super::types::ResourceKey;

/// Default lease after which a held lock expires (120 seconds).
pub const DEFAULT_LEASE: Duration = Duration::from_secs(120);

/// Errors from locking operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// A thread panicked while holding the lock table.
    #[error("lock table poisoned")]
    Poisoned,

    /// Failed to release the lock.
    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),
}

/// Proof of a successful acquisition, needed to release.
///
/// Tickets carry the holder generation so a release after lease expiry
/// does not free a key somebody else has since taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTicket(u64);

impl LockTicket {
    pub fn new(generation: u64) -> Self {
        Self(generation)
    }

    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// Keyed mutual exclusion over resource key sets.
pub trait ResourceLock: Send + Sync {
    /// Block until every key is exclusively held.
    fn acquire(&self, keys: &BTreeSet<ResourceKey>) -> Result<LockTicket, LockError>;

    /// Take every key if none is held, otherwise return `None` immediately.
    fn try_acquire(&self, keys: &BTreeSet<ResourceKey>) -> Result<Option<LockTicket>, LockError>;

    /// Release keys taken with `ticket`.
    fn release(&self, keys: &BTreeSet<ResourceKey>, ticket: LockTicket) -> Result<(), LockError>;
}

#[derive(Debug)]
struct Lease {
    generation: u64,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct LockTable {
    held: HashMap<ResourceKey, Lease>,
    next_generation: u64,
}

impl LockTable {
    /// Take every key or report the earliest instant a blocker expires.
    fn try_take(
        &mut self,
        keys: &BTreeSet<ResourceKey>,
        now: Instant,
        lease: Duration,
    ) -> Result<LockTicket, Instant> {
        let mut earliest_expiry: Option<Instant> = None;

        for key in keys {
            let Some(existing) = self.held.get(key) else {
                continue;
            };
            if existing.deadline <= now {
                warn!(
                    key = %key,
                    generation = existing.generation,
                    "lease expired, reclaiming lock"
                );
                self.held.remove(key);
                continue;
            }
            earliest_expiry = Some(match earliest_expiry {
                Some(t) => t.min(existing.deadline),
                None => existing.deadline,
            });
        }

        if let Some(wake_at) = earliest_expiry {
            return Err(wake_at);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = now + lease;
        for key in keys {
            self.held.insert(
                key.clone(),
                Lease {
                    generation,
                    deadline,
                },
            );
        }
        Ok(LockTicket(generation))
    }
}

/// In-process lease-based implementation of [`ResourceLock`].
#[derive(Debug)]
pub struct LeasedResourceLock {
    table: Mutex<LockTable>,
    freed: Condvar,
    lease: Duration,
}

impl LeasedResourceLock {
    /// Create a lock whose holds expire after `lease`.
    pub fn new(lease: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            freed: Condvar::new(),
            lease,
        }
    }

    /// The configured lease.
    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Number of keys currently in the table, expired leases included.
    pub fn held_count(&self) -> usize {
        self.table.lock().map(|t| t.held.len()).unwrap_or(0)
    }

    fn table(&self) -> Result<MutexGuard<'_, LockTable>, LockError> {
        self.table.lock().map_err(|_| LockError::Poisoned)
    }
}

impl Default for LeasedResourceLock {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE)
    }
}

impl ResourceLock for LeasedResourceLock {
    fn acquire(&self, keys: &BTreeSet<ResourceKey>) -> Result<LockTicket, LockError> {
        let mut table = self.table()?;
        loop {
            let now = Instant::now();
            match table.try_take(keys, now, self.lease) {
                Ok(ticket) => {
                    debug!(keys = keys.len(), generation = ticket.0, "acquired resource lock");
                    return Ok(ticket);
                }
                Err(wake_at) => {
                    let wait = wake_at.saturating_duration_since(now);
                    let (guard, _) = self
                        .freed
                        .wait_timeout(table, wait)
                        .map_err(|_| LockError::Poisoned)?;
                    table = guard;
                }
            }
        }
    }

    fn try_acquire(&self, keys: &BTreeSet<ResourceKey>) -> Result<Option<LockTicket>, LockError> {
        let mut table = self.table()?;
        Ok(table.try_take(keys, Instant::now(), self.lease).ok())
    }

    fn release(&self, keys: &BTreeSet<ResourceKey>, ticket: LockTicket) -> Result<(), LockError> {
        let mut table = self.table()?;
        for key in keys {
            match table.held.get(key) {
                Some(lease) if lease.generation == ticket.0 => {
                    table.held.remove(key);
                }
                Some(lease) => {
                    warn!(
                        key = %key,
                        ours = ticket.0,
                        holder = lease.generation,
                        "lease was reclaimed before release"
                    );
                }
                None => {}
            }
        }
        drop(table);
        self.freed.notify_all();
        debug!(keys = keys.len(), generation = ticket.0, "released resource lock");
        Ok(())
    }
}

/// Scoped acquisition of a key set.
///
/// The keys are released automatically when this guard is dropped, on
/// every exit path.
pub struct ResourceGuard<'a> {
    lock: &'a dyn ResourceLock,
    keys: BTreeSet<ResourceKey>,
    ticket: Option<LockTicket>,
}

impl<'a> ResourceGuard<'a> {
    /// Block until every key in `keys` is held.
    pub fn acquire(
        lock: &'a dyn ResourceLock,
        keys: BTreeSet<ResourceKey>,
    ) -> Result<Self, LockError> {
        let ticket = lock.acquire(&keys)?;
        Ok(Self {
            lock,
            keys,
            ticket: Some(ticket),
        })
    }

    /// Try to take every key, returning `None` if any is held.
    pub fn try_acquire(
        lock: &'a dyn ResourceLock,
        keys: BTreeSet<ResourceKey>,
    ) -> Result<Option<Self>, LockError> {
        Ok(lock.try_acquire(&keys)?.map(|ticket| Self {
            lock,
            keys,
            ticket: Some(ticket),
        }))
    }

    /// Whether this guard still holds its keys.
    pub fn is_held(&self) -> bool {
        self.ticket.is_some()
    }

    /// The keys covered by this guard.
    pub fn keys(&self) -> &BTreeSet<ResourceKey> {
        &self.keys
    }

    /// Release the keys before the guard goes out of scope.
    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(ticket) = self.ticket.take() {
            self.lock.release(&self.keys, ticket)?;
        }
        Ok(())
    }
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            let _ = self.lock.release(&self.keys, ticket);
        }
    }
}

impl std::fmt::Debug for ResourceGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("keys", &self.keys)
            .field("ticket", &self.ticket)
            .finish()
    }
}
