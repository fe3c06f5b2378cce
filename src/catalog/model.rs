//! catalog::model
//!
//! Models, their inheritance graph and feature-schema resolution.
//!
//! # Architecture
//!
//! Inheritance is stored as `inherits` edges between Model records. Every
//! resolution loads the reachable part of the graph into an
//! [`InheritanceGraph`] arena first and then works on that arena, so the
//! traversal is an explicit worklist and never recursion over the store.

use std::collections::HashMap;

use tracing::{info, warn};

use super::values::apply_values;
use super::{Catalog, CatalogError, CatalogResult};
use crate::core::graph::InheritanceGraph;
use crate::core::resource::DependencyResource;
use crate::core::schema::{self, calc_props_to_use, filter_to_keys, Schema};
use crate::core::types::{validate_name, NameGuard, ResourceKey, ResourceKind};
use crate::model::Model;
use crate::store::Edge;

/// Repository for Models.
pub struct ModelRepository<'a> {
    catalog: &'a Catalog,
}

impl<'a> ModelRepository<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Create a Model.
    ///
    /// Parents and the ModelSchema must exist. The Model's properties are
    /// reconciled with its ModelSchema; its own feature schema must name
    /// existing properties and its defaults are checked like any value.
    pub fn create(&self, mut model: Model) -> CatalogResult<Model> {
        validate_name(&model.id, NameGuard::Enforce)?;
        model.feature_schema.id = model.id.clone();
        model.feature_schema.role = schema::SchemaRole::Feature;

        let _guard = self.catalog.guard(&model)?;
        let key = model.resource();
        self.catalog.ensure_absent(&key)?;

        let mut edges = Vec::new();
        for parent in &model.inherits_from {
            let parent_key = ResourceKey::new(ResourceKind::Model, parent);
            self.catalog.ensure_present(&parent_key)?;
            edges.push(Edge::new("inherits", parent_key));
        }

        let schema_key = ResourceKey::new(ResourceKind::ModelSchema, &model.model_schema_id);
        let model_schema: Schema = self.catalog.fetch_required(&schema_key)?;
        edges.push(Edge::new("model_schema", schema_key));

        for key in &model.feature_schema.property_keys {
            self.catalog.properties().definition(key)?;
        }
        let own = &model.feature_schema;
        let kept = filter_to_keys(&own.property_keys, &own.default_properties);
        if kept.len() != own.default_properties.len() {
            warn!(model = %model.id, "dropping feature defaults for properties outside the feature schema");
        }
        let defaults = apply_values(self.catalog, &kept)?;
        model.feature_schema.default_properties = defaults.values;
        edges.extend(defaults.edges);

        let used = calc_props_to_use(&model_schema, &model.properties)?;
        let applied = apply_values(self.catalog, &used)?;
        model.properties = applied.values;
        edges.extend(applied.edges);

        self.catalog.insert(key, &model, edges)?;
        info!(model = %model.id, parents = model.inherits_from.len(), "created model");
        Ok(model)
    }

    pub fn get(&self, id: &str) -> CatalogResult<Option<Model>> {
        self.catalog.fetch(&ResourceKey::new(ResourceKind::Model, id))
    }

    pub fn list(&self) -> CatalogResult<Vec<Model>> {
        self.catalog.fetch_all(ResourceKind::Model)
    }

    /// Delete a Model nothing inherits from, instantiates or targets.
    pub fn delete(&self, id: &str) -> CatalogResult<()> {
        let key = ResourceKey::new(ResourceKind::Model, id);
        let _guard = self
            .catalog
            .guard_keys([key.clone(), key.with_kind(ResourceKind::FeatureSchema)].into())?;
        self.catalog.ensure_present(&key)?;
        self.catalog.ensure_unreferenced(&key)?;
        self.catalog.store().delete(&key)?;
        info!(model = %id, "deleted model");
        Ok(())
    }

    /// The inheritance graph reachable from `id`.
    pub fn graph_for(&self, id: &str) -> CatalogResult<InheritanceGraph> {
        Ok(self.load(id)?.0)
    }

    /// Transitive ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> CatalogResult<Vec<String>> {
        Ok(self.graph_for(id)?.ancestors(id))
    }

    /// The feature schema of `id` merged with those of all its ancestors.
    pub fn resolve_feature_schema(&self, id: &str) -> CatalogResult<Schema> {
        self.catalog
            .ensure_present(&ResourceKey::new(ResourceKind::Model, id))?;
        let (graph, own) = self.load(id)?;
        Ok(schema::resolve_feature_schema(id, &graph, &own))
    }

    /// Whether `model` is `target` or transitively inherits from it.
    pub fn is_subtype(&self, model: &str, target: &str) -> CatalogResult<bool> {
        if model == target {
            return Ok(true);
        }
        Ok(self.graph_for(model)?.is_subtype(model, target))
    }

    fn load(&self, id: &str) -> CatalogResult<(InheritanceGraph, HashMap<String, Schema>)> {
        let mut own = HashMap::new();
        let graph = InheritanceGraph::load(id, |current| {
            let model = self.get(current)?;
            Ok::<_, CatalogError>(model.map(|m| {
                own.insert(m.id.clone(), m.feature_schema);
                m.inherits_from
            }))
        })?;
        if let Some(model) = graph.find_cycle() {
            warn!(model = %model, start = %id, "inheritance cycle detected");
        }
        Ok((graph, own))
    }
}
