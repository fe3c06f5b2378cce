//! state
//!
//! Export and import of a catalog as a directory of JSON files.
//!
//! # Modules
//!
//! - [`storage`] - File I/O and the resource ⟷ file-id map
//! - [`cache`] - Import cache and bounded existence cache
//! - [`lock`] - Exclusive lock on a state directory
//! - [`export`] - Serialize every entity, tolerating per-object failure
//! - [`import`] - Rebuild a catalog, dependencies before dependents
//!
//! # Layout
//!
//! ```text
//! <dir>/ids.json
//! <dir>/<kind-dir>/<file-id>.json
//! ```
//!
//! Each file holds one [`CatalogObject`](crate::model::CatalogObject).
//! File ids are derived from the resource string, so exporting the same
//! catalog twice rewrites the same files.

pub mod cache;
pub mod export;
pub mod import;
pub mod lock;
pub mod storage;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use cache::{ExistenceCache, FsImportCache, ImportCache, MemoryImportCache};
pub use export::{ExportManager, ExportReport};
pub use import::{ImportManager, ImportReport};
pub use lock::StateDirLock;
pub use storage::{FsStateStorage, StateStorage};

use crate::catalog::CatalogError;
use crate::core::types::{ResourceKey, ResourceKind};

/// Errors from state export and import.
#[derive(Debug, Error)]
pub enum StateError {
    /// Failed to read state.
    #[error("failed to read state: {0}")]
    ReadError(String),

    /// Failed to write state.
    #[error("failed to write state: {0}")]
    WriteError(String),

    /// Another run holds the state directory.
    #[error("state directory is locked by another run: {}", .0.display())]
    AlreadyLocked(PathBuf),

    /// The state directory lock could not be taken or released.
    #[error("state lock error: {0}")]
    LockFailed(String),

    /// A dependency did not become visible in time.
    #[error("timed out after {waited:?} waiting for {key}")]
    Timeout { key: ResourceKey, waited: Duration },

    /// A file has no entry in the id map.
    #[error("no resource recorded for file id {0}")]
    UnknownFile(String),

    /// A state file could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The catalog rejected an operation.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Kinds with files of their own, in the order the importer walks them.
pub const IMPORT_ORDER: [ResourceKind; 8] = [
    ResourceKind::PrimProperty,
    ResourceKind::Index,
    ResourceKind::RefProperty,
    ResourceKind::ModelSchema,
    ResourceKind::Model,
    ResourceKind::ViewSchema,
    ResourceKind::View,
    ResourceKind::Feature,
];

/// Directory holding files of `kind`, if that kind is stored on its own.
pub fn kind_dir(kind: ResourceKind) -> Option<&'static str> {
    match kind {
        ResourceKind::PrimProperty => Some("properties"),
        ResourceKind::Index => Some("indices"),
        ResourceKind::RefProperty => Some("ref-properties"),
        ResourceKind::ModelSchema => Some("model-schemas"),
        ResourceKind::Model => Some("models"),
        ResourceKind::ViewSchema => Some("view-schemas"),
        ResourceKind::View => Some("views"),
        ResourceKind::Feature => Some("features"),
        ResourceKind::FeatureSchema | ResourceKind::GenericProperty => None,
    }
}
