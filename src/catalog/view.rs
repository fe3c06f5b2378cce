//! catalog::view
//!
//! Views group Models and child Views. The child graph is not checked for
//! cycles; a View may list itself as a child.

use std::collections::BTreeSet;

use tracing::info;

use super::values::apply_values;
use super::{Catalog, CatalogResult};
use crate::core::resource::DependencyResource;
use crate::core::schema::{calc_props_to_use, Schema};
use crate::core::types::{validate_name, NameGuard, ResourceKey, ResourceKind};
use crate::model::View;
use crate::store::Edge;

pub struct ViewRepository<'a> {
    catalog: &'a Catalog,
}

impl<'a> ViewRepository<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Create a View. Its ViewSchema, Models and child Views must exist.
    pub fn create(&self, mut view: View) -> CatalogResult<View> {
        validate_name(&view.id, NameGuard::Enforce)?;

        let _guard = self.catalog.guard(&view)?;
        let key = view.resource();
        self.catalog.ensure_absent(&key)?;

        let schema_key = ResourceKey::new(ResourceKind::ViewSchema, &view.view_schema_id);
        let schema: Schema = self.catalog.fetch_required(&schema_key)?;
        let mut edges = vec![Edge::new("view_schema", schema_key)];

        for model in &view.model_ids {
            let model_key = ResourceKey::new(ResourceKind::Model, model);
            self.catalog.ensure_present(&model_key)?;
            edges.push(Edge::new("model", model_key));
        }
        for child in &view.view_ids {
            let child_key = ResourceKey::new(ResourceKind::View, child);
            if child_key != key {
                self.catalog.ensure_present(&child_key)?;
            }
            edges.push(Edge::new("child", child_key));
        }

        let used = calc_props_to_use(&schema, &view.properties)?;
        let applied = apply_values(self.catalog, &used)?;
        view.properties = applied.values;
        edges.extend(applied.edges);

        self.catalog.insert(key, &view, edges)?;
        info!(view = %view.id, models = view.model_ids.len(), children = view.view_ids.len(), "created view");
        Ok(view)
    }

    pub fn get(&self, id: &str) -> CatalogResult<Option<View>> {
        self.catalog.fetch(&ResourceKey::new(ResourceKind::View, id))
    }

    pub fn list(&self) -> CatalogResult<Vec<View>> {
        self.catalog.fetch_all(ResourceKind::View)
    }

    /// Delete a View that no other View lists as a child.
    pub fn delete(&self, id: &str) -> CatalogResult<()> {
        let key = ResourceKey::new(ResourceKind::View, id);
        let _guard = self.catalog.guard_keys(BTreeSet::from([key.clone()]))?;
        self.catalog.ensure_present(&key)?;
        self.catalog.ensure_unreferenced(&key)?;
        self.catalog.store().delete(&key)?;
        info!(view = %id, "deleted view");
        Ok(())
    }
}
