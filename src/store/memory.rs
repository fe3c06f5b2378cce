//! store::memory
//!
//! In-memory graph store.
//!
//! # Design
//!
//! Records live in a single mutex-guarded map. A configurable visibility
//! lag hides new records from reads until it elapses, which mimics a
//! backing store with asynchronous indexing. Duplicate detection ignores
//! the lag, so a create can never race a lagging create of the same key.
//!
//! Failures can be injected per key to exercise error paths.
//!
//! # Example
//!
//! ```
//! use schemagraph::store::{GraphStore, MemoryGraphStore, Record};
//! use schemagraph::core::types::{ResourceKey, ResourceKind};
//!
//! let store = MemoryGraphStore::new();
//! let key = ResourceKey::new(ResourceKind::Model, "car");
//! store.create(Record { key: key.clone(), body: serde_json::json!({}), edges: vec![] }).unwrap();
//! assert!(store.exists(&key).unwrap());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{GraphStore, Record, StoreError};
use crate::core::types::{ResourceKey, ResourceKind};
use crate::model::IndexStatus;

/// In-memory store, cheap to clone (clones share state).
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: BTreeMap<ResourceKey, StoredRecord>,
    indices: BTreeMap<String, BTreeMap<String, IndexStatus>>,
    visibility_lag: Duration,
    failing_creates: BTreeSet<ResourceKey>,
    creates: usize,
}

#[derive(Debug)]
struct StoredRecord {
    record: Record,
    visible_at: Instant,
}

impl StoredRecord {
    fn is_visible(&self, now: Instant) -> bool {
        self.visible_at <= now
    }
}

impl MemoryGraphStore {
    /// Create an empty store with immediate visibility.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose new records stay invisible for `lag`.
    pub fn with_visibility_lag(lag: Duration) -> Self {
        let store = Self::new();
        store.lock().visibility_lag = lag;
        store
    }

    /// Make every create of `key` fail with a backend error.
    pub fn fail_create_of(&self, key: ResourceKey) {
        self.lock().failing_creates.insert(key);
    }

    /// Let creates of `key` succeed again.
    pub fn allow_create_of(&self, key: &ResourceKey) {
        self.lock().failing_creates.remove(key);
    }

    /// Number of successful creates so far.
    pub fn create_count(&self) -> usize {
        self.lock().creates
    }

    /// Number of records, visible or not.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // A panic while holding this lock can only come from a test
        // assertion; the map itself is always left consistent.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl GraphStore for MemoryGraphStore {
    fn create(&self, record: Record) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.failing_creates.contains(&record.key) {
            return Err(StoreError::Backend(format!(
                "injected create failure for {}",
                record.key
            )));
        }
        if inner.records.contains_key(&record.key) {
            return Err(StoreError::AlreadyExists(record.key.to_string()));
        }
        let visible_at = Instant::now() + inner.visibility_lag;
        inner.creates += 1;
        inner
            .records
            .insert(record.key.clone(), StoredRecord { record, visible_at });
        Ok(())
    }

    fn replace(&self, record: Record) -> Result<(), StoreError> {
        let mut inner = self.lock();
        match inner.records.get_mut(&record.key) {
            Some(stored) => {
                stored.record = record;
                Ok(())
            }
            None => Err(StoreError::NotFound(record.key.to_string())),
        }
    }

    fn read(&self, key: &ResourceKey) -> Result<Option<Record>, StoreError> {
        let now = Instant::now();
        Ok(self
            .lock()
            .records
            .get(key)
            .filter(|s| s.is_visible(now))
            .map(|s| s.record.clone()))
    }

    fn delete(&self, key: &ResourceKey) -> Result<bool, StoreError> {
        Ok(self.lock().records.remove(key).is_some())
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<Record>, StoreError> {
        let now = Instant::now();
        Ok(self
            .lock()
            .records
            .values()
            .filter(|s| s.record.key.kind() == kind && s.is_visible(now))
            .map(|s| s.record.clone())
            .collect())
    }

    fn referrers(&self, key: &ResourceKey) -> Result<Vec<ResourceKey>, StoreError> {
        let now = Instant::now();
        Ok(self
            .lock()
            .records
            .values()
            .filter(|s| s.is_visible(now))
            .filter(|s| s.record.key != *key && s.record.edges.iter().any(|e| e.target == *key))
            .map(|s| s.record.key.clone())
            .collect())
    }

    fn register_index(&self, name: &str, properties: &[String]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.indices.contains_key(name) {
            return Err(StoreError::AlreadyExists(format!("index {name}")));
        }
        let status = properties
            .iter()
            .map(|p| (p.clone(), IndexStatus::Enabled))
            .collect();
        inner.indices.insert(name.to_string(), status);
        Ok(())
    }

    fn unregister_index(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.lock().indices.remove(name).is_some())
    }

    fn index_status(&self, name: &str) -> Result<BTreeMap<String, IndexStatus>, StoreError> {
        self.lock()
            .indices
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("index {name}")))
    }
}
