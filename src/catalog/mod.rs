//! catalog
//!
//! Repositories over the graph store and the [`Catalog`] that wires them.
//!
//! # Modules
//!
//! - [`property`] - Primitive and reference property definitions
//! - [`schema`] - Model and View schemas
//! - [`model`] - Models, inheritance and feature-schema resolution
//! - [`feature`] - Features and subtype verification
//! - [`view`] - Views
//! - [`index`] - Indices
//!
//! # Architecture
//!
//! Every mutating call follows the same shape:
//! 1. Validate names (reserved prefix only under the install override)
//! 2. Lock `dependencies() ∪ {resource()}` with a scoped guard
//! 3. Check prerequisites and reconcile values against the schema
//! 4. Perform one atomic create (or replace) in the store
//!
//! The guard is released on every exit path. Reads take no lock.
//!
//! # Example
//!
//! ```
//! use schemagraph::catalog::{Catalog, EMPTY_MODEL_SCHEMA};
//! use schemagraph::core::schema::{Schema, SchemaRole};
//! use schemagraph::core::types::{DataType, PropertyValue, Value};
//! use schemagraph::model::{Model, NewFeature, PrimitiveProperty};
//!
//! let catalog = Catalog::in_memory();
//! catalog.install().unwrap();
//!
//! catalog.properties().create_primitive(PrimitiveProperty::new("wheels", DataType::Integer)).unwrap();
//! catalog.models().create(
//!     Model::new("vehicle", EMPTY_MODEL_SCHEMA).with_feature_schema(
//!         Schema::new("vehicle", SchemaRole::Feature)
//!             .with_default(PropertyValue::new("wheels", Value::Integer(4))),
//!     ),
//! ).unwrap();
//!
//! let bike = catalog.features().create(NewFeature::new("bike", "vehicle")).unwrap();
//! assert_eq!(bike.properties, vec![PropertyValue::new("wheels", Value::Integer(4))]);
//! ```

pub mod error;
pub mod feature;
pub mod index;
pub mod model;
pub mod property;
pub mod schema;
pub mod view;

mod values;

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

pub use error::CatalogError;
pub use feature::FeatureRepository;
pub use index::IndexRepository;
pub use model::ModelRepository;
pub use property::PropertyRepository;
pub use schema::SchemaRepository;
pub use view::ViewRepository;

use crate::core::config::Config;
use crate::core::lock::{LeasedResourceLock, ResourceGuard, ResourceLock};
use crate::core::resource::DependencyResource;
use crate::core::schema::{Schema, SchemaRole};
use crate::core::types::{NameGuard, ResourceKey, ResourceKind};
use crate::model::{CatalogObject, Index};
use crate::store::{Edge, GraphStore, MemoryGraphStore, Record, StoreError};

/// Reserved empty Model schema created by [`Catalog::install`].
pub const EMPTY_MODEL_SCHEMA: &str = "__empty.model";
/// Reserved empty View schema created by [`Catalog::install`].
pub const EMPTY_VIEW_SCHEMA: &str = "__empty.view";

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// A schema-governed catalog over a graph store.
///
/// Configured at construction with a store, a resource lock and
/// configuration. Cheap to share by reference across threads.
pub struct Catalog {
    store: Arc<dyn GraphStore>,
    lock: Arc<dyn ResourceLock>,
    config: Config,
    /// Property keys known to exist, for fast generic-slot resolution.
    known_properties: Mutex<HashSet<ResourceKey>>,
}

impl Catalog {
    /// Create a catalog from its collaborators.
    pub fn new(store: Arc<dyn GraphStore>, lock: Arc<dyn ResourceLock>, config: Config) -> Self {
        Self {
            store,
            lock,
            config,
            known_properties: Mutex::new(HashSet::new()),
        }
    }

    /// Create a catalog over `store` with a lease lock sized from `config`.
    pub fn with_store(store: Arc<dyn GraphStore>, config: Config) -> Self {
        let lock = Arc::new(LeasedResourceLock::new(config.lock_lease()));
        Self::new(store, lock, config)
    }

    /// Create a catalog over a fresh in-memory store with default config.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryGraphStore::new()), Config::default())
    }

    pub fn store(&self) -> &dyn GraphStore {
        self.store.as_ref()
    }

    pub fn lock(&self) -> &dyn ResourceLock {
        self.lock.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn properties(&self) -> PropertyRepository<'_> {
        PropertyRepository::new(self)
    }

    pub fn schemas(&self) -> SchemaRepository<'_> {
        SchemaRepository::new(self)
    }

    pub fn models(&self) -> ModelRepository<'_> {
        ModelRepository::new(self)
    }

    pub fn features(&self) -> FeatureRepository<'_> {
        FeatureRepository::new(self)
    }

    pub fn views(&self) -> ViewRepository<'_> {
        ViewRepository::new(self)
    }

    pub fn indices(&self) -> IndexRepository<'_> {
        IndexRepository::new(self)
    }

    /// One-time install of the reserved empty schemas.
    ///
    /// Idempotent: schemas that already exist are left alone.
    pub fn install(&self) -> CatalogResult<()> {
        for schema in [
            Schema::new(EMPTY_MODEL_SCHEMA, SchemaRole::Model),
            Schema::new(EMPTY_VIEW_SCHEMA, SchemaRole::View),
        ] {
            if self.store.exists(&schema.resource_key())? {
                continue;
            }
            match self
                .schemas()
                .create_guarded(schema, NameGuard::DangerouslyAllowReserved)
            {
                Ok(_) | Err(CatalogError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        info!("catalog install complete");
        Ok(())
    }

    /// Create any entity through its repository.
    ///
    /// Derived fields (a Feature's ancestry, an Index's status) are
    /// recomputed rather than taken from `object`.
    pub fn create_object(&self, object: CatalogObject) -> CatalogResult<ResourceKey> {
        let key = object.resource();
        match object {
            CatalogObject::PrimProperty(p) => {
                self.properties().create_primitive(p)?;
            }
            CatalogObject::RefProperty(r) => {
                self.properties().create_reference(r)?;
            }
            CatalogObject::Schema(s) => {
                self.schemas().create(s)?;
            }
            CatalogObject::Model(m) => {
                self.models().create(m)?;
            }
            CatalogObject::Feature(f) => {
                self.features().create(f.to_new())?;
            }
            CatalogObject::View(v) => {
                self.views().create(v)?;
            }
            CatalogObject::Index(i) => {
                self.indices().create(i)?;
            }
        }
        Ok(key)
    }

    /// Every stored entity of `kind` as a [`CatalogObject`].
    ///
    /// `GenericProperty` and `FeatureSchema` have no records of their own
    /// and yield nothing.
    pub fn list_objects(&self, kind: ResourceKind) -> CatalogResult<Vec<CatalogObject>> {
        self.store
            .list(kind)?
            .iter()
            .map(|record| self.decode(record))
            .collect()
    }

    /// Turn a stored record back into its entity.
    ///
    /// Index status is refreshed from the store.
    pub fn decode(&self, record: &Record) -> CatalogResult<CatalogObject> {
        let body = record.body.clone();
        let object = match record.key.kind() {
            ResourceKind::PrimProperty => CatalogObject::PrimProperty(serde_json::from_value(body)?),
            ResourceKind::RefProperty => CatalogObject::RefProperty(serde_json::from_value(body)?),
            ResourceKind::ModelSchema | ResourceKind::ViewSchema => {
                CatalogObject::Schema(serde_json::from_value(body)?)
            }
            ResourceKind::Model => CatalogObject::Model(serde_json::from_value(body)?),
            ResourceKind::Feature => CatalogObject::Feature(serde_json::from_value(body)?),
            ResourceKind::View => CatalogObject::View(serde_json::from_value(body)?),
            ResourceKind::Index => {
                let mut index: Index = serde_json::from_value(body)?;
                index.property_index_status = self.store.index_status(&index.name)?;
                CatalogObject::Index(index)
            }
            kind @ (ResourceKind::FeatureSchema | ResourceKind::GenericProperty) => {
                return Err(CatalogError::Invalid(format!(
                    "{kind} records are never stored: {}",
                    record.key
                )))
            }
        };
        Ok(object)
    }

    /// Lock everything a mutation of `entity` touches.
    pub(crate) fn guard(&self, entity: &impl DependencyResource) -> CatalogResult<ResourceGuard<'_>> {
        Ok(ResourceGuard::acquire(self.lock.as_ref(), entity.lock_set())?)
    }

    /// Lock an explicit key set.
    pub(crate) fn guard_keys(&self, keys: BTreeSet<ResourceKey>) -> CatalogResult<ResourceGuard<'_>> {
        Ok(ResourceGuard::acquire(self.lock.as_ref(), keys)?)
    }

    /// Fail with `AlreadyExists` if `key` is stored.
    pub(crate) fn ensure_absent(&self, key: &ResourceKey) -> CatalogResult<()> {
        if self.store.exists(key)? {
            return Err(CatalogError::AlreadyExists(key.clone()));
        }
        Ok(())
    }

    /// Fail with `NotFound` unless `key` is stored.
    pub(crate) fn ensure_present(&self, key: &ResourceKey) -> CatalogResult<()> {
        if !self.store.exists(key)? {
            return Err(CatalogError::NotFound(key.clone()));
        }
        Ok(())
    }

    /// Fail with `Integrity` if anything other than `key` itself refers to it.
    pub(crate) fn ensure_unreferenced(&self, key: &ResourceKey) -> CatalogResult<()> {
        let referrers = self.store.referrers(key)?;
        if let Some(first) = referrers.first() {
            return Err(CatalogError::integrity(format!(
                "{key} is still referenced by {first}{}",
                if referrers.len() > 1 {
                    format!(" and {} more", referrers.len() - 1)
                } else {
                    String::new()
                }
            )));
        }
        Ok(())
    }

    /// Serialize and create a record.
    pub(crate) fn insert<T: Serialize>(
        &self,
        key: ResourceKey,
        entity: &T,
        edges: Vec<Edge>,
    ) -> CatalogResult<()> {
        let record = Record {
            key: key.clone(),
            body: serde_json::to_value(entity)?,
            edges,
        };
        match self.store.create(record) {
            Ok(()) => Ok(()),
            Err(StoreError::AlreadyExists(_)) => Err(CatalogError::AlreadyExists(key)),
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize and overwrite a record.
    pub(crate) fn overwrite<T: Serialize>(
        &self,
        key: ResourceKey,
        entity: &T,
        edges: Vec<Edge>,
    ) -> CatalogResult<()> {
        let record = Record {
            key,
            body: serde_json::to_value(entity)?,
            edges,
        };
        Ok(self.store.replace(record)?)
    }

    /// Read and deserialize a record.
    pub(crate) fn fetch<T: DeserializeOwned>(&self, key: &ResourceKey) -> CatalogResult<Option<T>> {
        match self.store.read(key)? {
            Some(record) => Ok(Some(serde_json::from_value(record.body)?)),
            None => Ok(None),
        }
    }

    /// Read and deserialize a record, failing with `NotFound` if absent.
    pub(crate) fn fetch_required<T: DeserializeOwned>(&self, key: &ResourceKey) -> CatalogResult<T> {
        self.fetch(key)?
            .ok_or_else(|| CatalogError::NotFound(key.clone()))
    }

    /// Deserialize every record of `kind`.
    pub(crate) fn fetch_all<T: DeserializeOwned>(&self, kind: ResourceKind) -> CatalogResult<Vec<T>> {
        self.store
            .list(kind)?
            .into_iter()
            .map(|record| Ok(serde_json::from_value(record.body)?))
            .collect()
    }

    pub(crate) fn known_properties(&self) -> MutexGuard<'_, HashSet<ResourceKey>> {
        match self.known_properties.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let catalog = Catalog::in_memory();
        catalog.install().unwrap();
        catalog.install().unwrap();

        let model_schema = catalog
            .schemas()
            .get(EMPTY_MODEL_SCHEMA, SchemaRole::Model)
            .unwrap();
        assert!(model_schema.is_some());
        assert!(catalog
            .schemas()
            .get(EMPTY_VIEW_SCHEMA, SchemaRole::View)
            .unwrap()
            .is_some());
    }

    #[test]
    fn reserved_names_need_the_override() {
        let catalog = Catalog::in_memory();
        let err = catalog
            .schemas()
            .create(Schema::new("__mine", SchemaRole::Model))
            .unwrap_err();
        assert!(matches!(err, CatalogError::ReservedKeyword(_)));
    }

    #[test]
    fn list_objects_for_placeholder_kinds_is_empty() {
        let catalog = Catalog::in_memory();
        catalog.install().unwrap();
        assert!(catalog
            .list_objects(ResourceKind::GenericProperty)
            .unwrap()
            .is_empty());
        assert_eq!(
            catalog.list_objects(ResourceKind::ModelSchema).unwrap().len(),
            1
        );
    }
}
