//! catalog::error
//!
//! Errors surfaced by catalog operations.
//!
//! Integrity, not-found and reserved-keyword errors abort only the current
//! operation; nothing was written. Collaborator errors are wrapped and
//! propagated without interpretation.

use thiserror::Error;

use crate::core::cardinality::CardinalityError;
use crate::core::lock::LockError;
use crate::core::schema::SchemaError;
use crate::core::types::{ResourceKey, TypeError};
use crate::store::StoreError;

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A schema, cardinality, reference or allow-list rule was violated.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(ResourceKey),

    /// The entity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(ResourceKey),

    /// A name uses the reserved prefix without the install override.
    #[error("reserved keyword: '{0}' is reserved for internal use")]
    ReservedKeyword(String),

    /// A name or key is malformed.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// The graph store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A record body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The resource lock failed.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}

impl CatalogError {
    /// Whether retrying the same call could succeed.
    ///
    /// Nothing in the catalog retries automatically; this only informs
    /// callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Store(e) if e.is_transient())
    }

    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        CatalogError::Integrity(message.into())
    }
}

impl From<TypeError> for CatalogError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::ReservedName(name) => CatalogError::ReservedKeyword(name),
            other => CatalogError::Invalid(other.to_string()),
        }
    }
}

impl From<SchemaError> for CatalogError {
    fn from(err: SchemaError) -> Self {
        CatalogError::Integrity(err.to_string())
    }
}

impl From<CardinalityError> for CatalogError {
    fn from(err: CardinalityError) -> Self {
        CatalogError::Integrity(err.to_string())
    }
}
