//! catalog::index
//!
//! Indices over primitive properties. The store builds and registers the
//! index; the per-property status is always read back from it.

use tracing::{info, warn};

use super::{Catalog, CatalogError, CatalogResult};
use crate::core::resource::DependencyResource;
use crate::core::types::{validate_name, NameGuard, ResourceKey, ResourceKind};
use crate::model::Index;
use crate::store::Edge;

pub struct IndexRepository<'a> {
    catalog: &'a Catalog,
}

impl<'a> IndexRepository<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Create and register an index.
    ///
    /// Every indexed name must be an existing primitive property.
    pub fn create(&self, mut index: Index) -> CatalogResult<Index> {
        validate_name(&index.name, NameGuard::Enforce)?;
        if index.properties.is_empty() {
            return Err(CatalogError::Invalid(format!(
                "index '{}' names no properties",
                index.name
            )));
        }

        let _guard = self.catalog.guard(&index)?;
        let key = index.resource();
        self.catalog.ensure_absent(&key)?;

        let mut edges = Vec::with_capacity(index.properties.len());
        for property in &index.properties {
            let prop_key = ResourceKey::new(ResourceKind::PrimProperty, property);
            if !self.catalog.store().exists(&prop_key)? {
                if self
                    .catalog
                    .store()
                    .exists(&prop_key.with_kind(ResourceKind::RefProperty))?
                {
                    return Err(CatalogError::integrity(format!(
                        "index '{}' cannot cover reference property '{property}'",
                        index.name
                    )));
                }
                return Err(CatalogError::NotFound(
                    prop_key.with_kind(ResourceKind::GenericProperty),
                ));
            }
            edges.push(Edge::new("indexes", prop_key));
        }

        self.catalog
            .store()
            .register_index(&index.name, &index.properties)?;
        let inserted = self
            .catalog
            .store()
            .index_status(&index.name)
            .map_err(CatalogError::from)
            .and_then(|status| {
                index.property_index_status = status;
                self.catalog.insert(key, &index, edges)
            });
        if let Err(e) = inserted {
            if let Err(undo) = self.catalog.store().unregister_index(&index.name) {
                warn!(index = %index.name, error = %undo, "failed to unregister index after failed create");
            }
            return Err(e);
        }

        info!(index = %index.name, properties = index.properties.len(), unique = index.unique, "created index");
        Ok(index)
    }

    /// The index with its status refreshed from the store.
    pub fn get(&self, name: &str) -> CatalogResult<Option<Index>> {
        let Some(mut index) = self
            .catalog
            .fetch::<Index>(&ResourceKey::new(ResourceKind::Index, name))?
        else {
            return Ok(None);
        };
        index.property_index_status = self.catalog.store().index_status(name)?;
        Ok(Some(index))
    }

    pub fn list(&self) -> CatalogResult<Vec<Index>> {
        let mut indices: Vec<Index> = self.catalog.fetch_all(ResourceKind::Index)?;
        for index in &mut indices {
            index.property_index_status = self.catalog.store().index_status(&index.name)?;
        }
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EMPTY_MODEL_SCHEMA;
    use crate::core::types::DataType;
    use crate::core::config::Config;
    use crate::model::{FieldType, IndexStatus, IndexType, Model, PrimitiveProperty, ReferenceProperty};
    use crate::store::{GraphStore, MemoryGraphStore};
    use std::sync::Arc;

    fn catalog() -> Catalog {
        let catalog = Catalog::in_memory();
        catalog.install().unwrap();
        catalog
            .properties()
            .create_primitive(PrimitiveProperty::new("name", DataType::String))
            .unwrap();
        catalog
    }

    #[test]
    fn create_fills_status_from_store() {
        let catalog = catalog();
        let index = catalog
            .indices()
            .create(Index::new("by_name", FieldType::Vertex, IndexType::Composite).on("name"))
            .unwrap();
        assert_eq!(
            index.property_index_status.get("name"),
            Some(&IndexStatus::Enabled)
        );
        assert_eq!(catalog.indices().get("by_name").unwrap(), Some(index));
    }

    #[test]
    fn reference_properties_cannot_be_indexed() {
        let catalog = catalog();
        catalog
            .models()
            .create(Model::new("m", EMPTY_MODEL_SCHEMA))
            .unwrap();
        catalog
            .properties()
            .create_reference(ReferenceProperty::new("link", "m"))
            .unwrap();

        let err = catalog
            .indices()
            .create(Index::new("by_link", FieldType::Edge, IndexType::Mixed).on("link"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Integrity(_)));
        assert!(catalog.indices().list().unwrap().is_empty());
    }

    #[test]
    fn unknown_property_is_not_found() {
        let catalog = catalog();
        let err = catalog
            .indices()
            .create(Index::new("i", FieldType::Vertex, IndexType::Composite).on("ghost"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn failed_insert_leaves_no_registration_behind() {
        let store = Arc::new(MemoryGraphStore::new());
        let catalog = Catalog::with_store(store.clone(), Config::default());
        catalog.install().unwrap();
        catalog
            .properties()
            .create_primitive(PrimitiveProperty::new("name", DataType::String))
            .unwrap();
        let key = ResourceKey::new(ResourceKind::Index, "by_name");
        store.fail_create_of(key.clone());

        let index = Index::new("by_name", FieldType::Vertex, IndexType::Composite).on("name");
        assert!(catalog.indices().create(index.clone()).is_err());
        assert!(!store.exists(&key).unwrap());
        assert!(store.index_status("by_name").is_err());

        store.allow_create_of(&key);
        let created = catalog.indices().create(index).unwrap();
        assert_eq!(
            created.property_index_status.get("name"),
            Some(&IndexStatus::Enabled)
        );
    }
}
