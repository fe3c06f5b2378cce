//! state::cache
//!
//! Caches used by an import run.
//!
//! - [`ImportCache`] records resources already reconstructed, so an
//!   interrupted import can resume without recreating them.
//! - [`ExistenceCache`] remembers keys recently observed in the store,
//!   bounded by LRU eviction, so dependency polling does not hit the store
//!   for every repeat dependency.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};

use super::storage::write_atomic;
use super::StateError;
use crate::core::types::ResourceKey;

/// Durable record of imported resources.
pub trait ImportCache: Send + Sync {
    fn contains(&self, key: &ResourceKey) -> Result<bool, StateError>;

    /// Record `key` as imported.
    fn mark(&self, key: &ResourceKey) -> Result<(), StateError>;

    /// Forget everything.
    fn clear(&self) -> Result<(), StateError>;
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Import cache held in memory for a single run.
#[derive(Debug, Default)]
pub struct MemoryImportCache {
    keys: Mutex<BTreeSet<ResourceKey>>,
}

impl MemoryImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        locked(&self.keys).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImportCache for MemoryImportCache {
    fn contains(&self, key: &ResourceKey) -> Result<bool, StateError> {
        Ok(locked(&self.keys).contains(key))
    }

    fn mark(&self, key: &ResourceKey) -> Result<(), StateError> {
        locked(&self.keys).insert(key.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StateError> {
        locked(&self.keys).clear();
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheFile {
    #[serde(default)]
    imported: BTreeSet<String>,
}

/// Import cache persisted as JSON, rewritten atomically on each mark.
#[derive(Debug)]
pub struct FsImportCache {
    path: PathBuf,
    keys: Mutex<BTreeSet<String>>,
}

impl FsImportCache {
    /// Default file name inside a state directory.
    pub const FILE_NAME: &'static str = "import-cache.json";

    /// Open the cache at `path`; a missing file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let keys = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                StateError::ReadError(format!("cannot read {}: {}", path.display(), e))
            })?;
            serde_json::from_str::<CacheFile>(&content)?.imported
        } else {
            BTreeSet::new()
        };
        Ok(Self {
            path,
            keys: Mutex::new(keys),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn persist(&self, keys: &BTreeSet<String>) -> Result<(), StateError> {
        let file = CacheFile {
            imported: keys.clone(),
        };
        write_atomic(&self.path, &serde_json::to_string_pretty(&file)?)
    }
}

impl ImportCache for FsImportCache {
    fn contains(&self, key: &ResourceKey) -> Result<bool, StateError> {
        Ok(locked(&self.keys).contains(&key.to_string()))
    }

    fn mark(&self, key: &ResourceKey) -> Result<(), StateError> {
        let mut keys = locked(&self.keys);
        if keys.insert(key.to_string()) {
            self.persist(&keys)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StateError> {
        let mut keys = locked(&self.keys);
        keys.clear();
        self.persist(&keys)
    }
}

/// Bounded set of keys known to exist, evicting the least recently used.
#[derive(Debug)]
pub struct ExistenceCache {
    capacity: usize,
    entries: LinkedHashMap<ResourceKey, ()>,
}

impl ExistenceCache {
    /// A cache holding at most `capacity` keys (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: LinkedHashMap::new(),
        }
    }

    /// Whether `key` is cached, refreshing its recency on a hit.
    pub fn contains(&mut self, key: &ResourceKey) -> bool {
        self.entries.get_refresh(key).is_some()
    }

    /// Remember `key`, evicting the oldest entry when full.
    pub fn insert(&mut self, key: ResourceKey) {
        if self.entries.get_refresh(&key).is_some() {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.insert(key, ());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
