//! store
//!
//! The graph storage seam.
//!
//! # Design
//!
//! The catalog never talks to a physical graph engine directly. It goes
//! through [`GraphStore`], which offers typed records with a JSON body and
//! outgoing reference edges, per-kind enumeration, reverse edge lookup and
//! index registration.
//!
//! Implementations must guarantee atomic single-record creates: a failed
//! `create` leaves no partial record. Reads may lag behind writes; the
//! importer absorbs that lag by polling.
//!
//! # Modules
//!
//! - [`memory`] - In-memory implementation with optional visibility lag

pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{ResourceKey, ResourceKind};
use crate::model::IndexStatus;

pub use memory::MemoryGraphStore;

/// Errors from graph store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A record with this key already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// The record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The store is temporarily unable to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// An outgoing reference from one record to another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub label: String,
    pub target: ResourceKey,
}

impl Edge {
    pub fn new(label: impl Into<String>, target: ResourceKey) -> Self {
        Self {
            label: label.into(),
            target,
        }
    }
}

/// A stored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: ResourceKey,
    pub body: serde_json::Value,
    pub edges: Vec<Edge>,
}

impl Record {
    /// Edges carrying `label`.
    pub fn edges_labeled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.label == label)
    }
}

/// Storage collaborator consumed by the catalog.
pub trait GraphStore: Send + Sync {
    /// Create a record. Fails with `AlreadyExists` if the key is taken.
    fn create(&self, record: Record) -> Result<(), StoreError>;

    /// Overwrite an existing record. Fails with `NotFound` if absent.
    fn replace(&self, record: Record) -> Result<(), StoreError>;

    /// Read a record if it exists and is visible.
    fn read(&self, key: &ResourceKey) -> Result<Option<Record>, StoreError>;

    /// Delete a record. Returns whether it existed.
    fn delete(&self, key: &ResourceKey) -> Result<bool, StoreError>;

    /// Whether a record exists and is visible.
    fn exists(&self, key: &ResourceKey) -> Result<bool, StoreError> {
        Ok(self.read(key)?.is_some())
    }

    /// Every visible record of `kind`.
    fn list(&self, kind: ResourceKind) -> Result<Vec<Record>, StoreError>;

    /// Keys of visible records with an edge pointing at `key`.
    fn referrers(&self, key: &ResourceKey) -> Result<Vec<ResourceKey>, StoreError>;

    /// Build and register an index over `properties`.
    fn register_index(&self, name: &str, properties: &[String]) -> Result<(), StoreError>;

    /// Drop a registered index. Returns false if it was not registered.
    fn unregister_index(&self, name: &str) -> Result<bool, StoreError>;

    /// Per-property registration status of an index.
    fn index_status(&self, name: &str) -> Result<BTreeMap<String, IndexStatus>, StoreError>;
}
