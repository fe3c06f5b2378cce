//! core::schema
//!
//! Schemas and schema resolution.
//!
//! # Architecture
//!
//! A [`Schema`] names the property keys an entity must carry and the
//! defaults applied when a key is not supplied. The same two primitives
//! serve every role:
//!
//! - [`resolve_feature_schema`] merges a Model's feature schema with those
//!   of all its ancestors, nearest first.
//! - [`calc_props_to_use`] reconciles a schema with supplied values.
//!
//! # Precedence
//!
//! Ancestors are expanded frontier by frontier. Required keys are the
//! union over the whole ancestry; for defaults the first Model (in
//! breadth-first order) that defaults a name owns that name. Two Models at
//! the same depth defaulting the same name have no defined winner.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::graph::InheritanceGraph;
use super::resource::{value_dependencies, DependencyResource};
use super::types::{PropertyValue, ResourceKey, ResourceKind};

/// Errors from schema reconciliation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Required keys have no value after defaults were applied.
    #[error("schema '{schema}' requires missing properties: {}", missing.join(", "))]
    MissingRequired {
        schema: String,
        missing: Vec<String>,
    },
}

/// What a schema is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRole {
    Model,
    Feature,
    View,
}

impl SchemaRole {
    /// Resource kind of a schema with this role.
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            SchemaRole::Model => ResourceKind::ModelSchema,
            SchemaRole::Feature => ResourceKind::FeatureSchema,
            SchemaRole::View => ResourceKind::ViewSchema,
        }
    }
}

/// Required property keys plus ordered defaults.
///
/// More than one default under the same key is only valid when that
/// key's property is multi-valued; the catalog checks this on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    pub id: String,
    pub role: SchemaRole,
    #[serde(default)]
    pub property_keys: BTreeSet<String>,
    #[serde(default)]
    pub default_properties: Vec<PropertyValue>,
}

impl Schema {
    /// An empty schema.
    pub fn new(id: impl Into<String>, role: SchemaRole) -> Self {
        Self {
            id: id.into(),
            role,
            property_keys: BTreeSet::new(),
            default_properties: Vec::new(),
        }
    }

    /// Add a required key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.property_keys.insert(key.into());
        self
    }

    /// Add a required key together with a default value for it.
    pub fn with_default(mut self, value: PropertyValue) -> Self {
        self.property_keys.insert(value.name.clone());
        self.default_properties.push(value);
        self
    }

    /// The schema's resource key.
    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(self.role.resource_kind(), &self.id)
    }

    /// Defaults declared under `name`, in order.
    pub fn defaults_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PropertyValue> {
        self.default_properties.iter().filter(move |pv| pv.name == name)
    }
}

impl DependencyResource for Schema {
    fn resource(&self) -> ResourceKey {
        self.resource_key()
    }

    fn dependencies(&self) -> BTreeSet<ResourceKey> {
        let mut deps: BTreeSet<ResourceKey> = self
            .property_keys
            .iter()
            .map(|k| ResourceKey::new(ResourceKind::GenericProperty, k))
            .collect();
        // Only the referenced Features; the property slots are covered above.
        deps.extend(
            value_dependencies(&self.default_properties)
                .into_iter()
                .filter(|k| k.kind() == ResourceKind::Feature),
        );
        deps
    }
}

/// Merge the feature schema of `model_id` with all of its ancestors'.
///
/// `own_schemas` maps a Model id to that Model's own feature schema;
/// Models without an entry contribute nothing.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use schemagraph::core::graph::InheritanceGraph;
/// use schemagraph::core::schema::{resolve_feature_schema, Schema, SchemaRole};
/// use schemagraph::core::types::{PropertyValue, Value};
///
/// let mut graph = InheritanceGraph::new();
/// graph.add_model("a", Default::default());
/// graph.add_model("b", ["a".to_string()].into());
///
/// let mut own = HashMap::new();
/// own.insert("a".to_string(), Schema::new("a", SchemaRole::Feature)
///     .with_default(PropertyValue::new("p", Value::Integer(1))));
/// own.insert("b".to_string(), Schema::new("b", SchemaRole::Feature)
///     .with_default(PropertyValue::new("p", Value::Integer(2))));
///
/// let merged = resolve_feature_schema("b", &graph, &own);
/// assert_eq!(merged.default_properties, vec![PropertyValue::new("p", Value::Integer(2))]);
/// ```
pub fn resolve_feature_schema(
    model_id: &str,
    graph: &InheritanceGraph,
    own_schemas: &HashMap<String, Schema>,
) -> Schema {
    let mut merged = Schema::new(model_id, SchemaRole::Feature);
    let mut claimed: HashSet<String> = HashSet::new();

    for level in graph.levels(model_id) {
        for id in level {
            let Some(own) = own_schemas.get(&id) else {
                continue;
            };
            merged.property_keys.extend(own.property_keys.iter().cloned());

            let mut newly_claimed = Vec::new();
            for default in &own.default_properties {
                if claimed.contains(&default.name) {
                    continue;
                }
                merged.default_properties.push(default.clone());
                newly_claimed.push(default.name.clone());
            }
            claimed.extend(newly_claimed);
        }
    }

    merged
}

/// Keep only values whose name is a key of the schema.
pub fn filter_to_keys(keys: &BTreeSet<String>, values: &[PropertyValue]) -> Vec<PropertyValue> {
    values
        .iter()
        .filter(|pv| keys.contains(&pv.name))
        .cloned()
        .collect()
}

/// Reconcile a schema with supplied values.
///
/// 1. Keep supplied values whose name is in `schema.property_keys`.
/// 2. Append defaults whose name was not supplied and whose value is not
///    null.
/// 3. Fail unless every required key has at least one non-null value.
///
/// # Example
///
/// ```
/// use schemagraph::core::schema::{calc_props_to_use, Schema, SchemaRole, SchemaError};
/// use schemagraph::core::types::{PropertyValue, Value};
///
/// let schema = Schema::new("s", SchemaRole::Feature)
///     .with_key("name")
///     .with_default(PropertyValue::new("wheels", Value::Integer(4)));
///
/// let used = calc_props_to_use(&schema, &[
///     PropertyValue::new("name", Value::String("bike".into())),
///     PropertyValue::new("unrelated", Value::Boolean(true)),
/// ]).unwrap();
/// assert_eq!(used.len(), 2);
/// assert_eq!(used[1].name, "wheels");
///
/// let err = calc_props_to_use(&schema, &[]).unwrap_err();
/// assert_eq!(err, SchemaError::MissingRequired {
///     schema: "s".into(),
///     missing: vec!["name".into()],
/// });
/// ```
pub fn calc_props_to_use(
    schema: &Schema,
    supplied: &[PropertyValue],
) -> Result<Vec<PropertyValue>, SchemaError> {
    let mut used = filter_to_keys(&schema.property_keys, supplied);
    let supplied_names: HashSet<&str> = used.iter().map(|pv| pv.name.as_str()).collect();

    let defaults: Vec<PropertyValue> = schema
        .default_properties
        .iter()
        .filter(|pv| !supplied_names.contains(pv.name.as_str()) && pv.value.is_some())
        .cloned()
        .collect();
    used.extend(defaults);

    let present: HashSet<&str> = used
        .iter()
        .filter(|pv| pv.value.is_some())
        .map(|pv| pv.name.as_str())
        .collect();
    let missing: Vec<String> = schema
        .property_keys
        .iter()
        .filter(|key| !present.contains(key.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(SchemaError::MissingRequired {
            schema: schema.id.clone(),
            missing,
        });
    }

    Ok(used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;

    fn int(name: &str, n: i32) -> PropertyValue {
        PropertyValue::new(name, Value::Integer(n))
    }

    fn own(entries: Vec<Schema>) -> HashMap<String, Schema> {
        entries.into_iter().map(|s| (s.id.clone(), s)).collect()
    }

    #[test]
    fn nearer_model_default_wins() {
        let mut graph = InheritanceGraph::new();
        graph.add_model("a", BTreeSet::new());
        graph.add_model("b", ["a".to_string()].into());
        let schemas = own(vec![
            Schema::new("a", SchemaRole::Feature).with_default(int("p", 1)),
            Schema::new("b", SchemaRole::Feature).with_default(int("p", 2)),
        ]);

        let merged = resolve_feature_schema("b", &graph, &schemas);
        assert_eq!(merged.default_properties, vec![int("p", 2)]);

        let used = calc_props_to_use(&merged, &[]).unwrap();
        assert_eq!(used, vec![int("p", 2)]);
    }

    #[test]
    fn required_keys_union_across_ancestry() {
        let mut graph = InheritanceGraph::new();
        graph.add_model("a", BTreeSet::new());
        graph.add_model("x", BTreeSet::new());
        graph.add_model("b", ["a".to_string(), "x".to_string()].into());
        let schemas = own(vec![
            Schema::new("a", SchemaRole::Feature).with_key("from_a"),
            Schema::new("x", SchemaRole::Feature).with_key("from_x"),
            Schema::new("b", SchemaRole::Feature).with_key("from_b"),
        ]);

        let merged = resolve_feature_schema("b", &graph, &schemas);
        let keys: Vec<&str> = merged.property_keys.iter().map(String::as_str).collect();
        assert_eq!(keys, vec!["from_a", "from_b", "from_x"]);
        assert_eq!(merged.id, "b");
        assert_eq!(merged.role, SchemaRole::Feature);
    }

    #[test]
    fn multi_valued_defaults_come_from_one_owner() {
        let mut graph = InheritanceGraph::new();
        graph.add_model("a", BTreeSet::new());
        graph.add_model("b", ["a".to_string()].into());
        let schemas = own(vec![
            Schema::new("a", SchemaRole::Feature)
                .with_default(int("tags", 1))
                .with_default(int("tags", 2)),
            Schema::new("b", SchemaRole::Feature)
                .with_default(int("tags", 7))
                .with_default(int("tags", 8)),
        ]);

        let merged = resolve_feature_schema("b", &graph, &schemas);
        assert_eq!(merged.default_properties, vec![int("tags", 7), int("tags", 8)]);
    }

    #[test]
    fn grandparent_default_used_when_nearer_models_silent() {
        let mut graph = InheritanceGraph::new();
        graph.add_model("a", BTreeSet::new());
        graph.add_model("b", ["a".to_string()].into());
        graph.add_model("c", ["b".to_string()].into());
        let schemas = own(vec![
            Schema::new("a", SchemaRole::Feature).with_default(int("p", 1)),
            Schema::new("c", SchemaRole::Feature).with_key("q"),
        ]);

        let merged = resolve_feature_schema("c", &graph, &schemas);
        assert!(merged.property_keys.contains("p"));
        assert!(merged.property_keys.contains("q"));
        assert_eq!(merged.default_properties, vec![int("p", 1)]);
    }

    #[test]
    fn user_value_beats_default() {
        let schema = Schema::new("s", SchemaRole::Model).with_default(int("p", 1));
        let used = calc_props_to_use(&schema, &[int("p", 9)]).unwrap();
        assert_eq!(used, vec![int("p", 9)]);
    }

    #[test]
    fn null_defaults_are_not_applied() {
        let schema = Schema::new("s", SchemaRole::View)
            .with_default(PropertyValue::null("p"));
        let err = calc_props_to_use(&schema, &[]).unwrap_err();
        assert!(matches!(err, SchemaError::MissingRequired { ref missing, .. } if missing == &["p"]));
    }

    #[test]
    fn null_user_value_does_not_satisfy_key() {
        let schema = Schema::new("s", SchemaRole::View).with_key("p");
        let err = calc_props_to_use(&schema, &[PropertyValue::null("p")]).unwrap_err();
        assert!(err.to_string().contains("p"));
    }

    #[test]
    fn values_outside_schema_are_dropped() {
        let schema = Schema::new("s", SchemaRole::Feature);
        let used = calc_props_to_use(&schema, &[int("stray", 1)]).unwrap();
        assert!(used.is_empty());
    }

    #[test]
    fn schema_wire_format_rejects_unknown_fields() {
        let json = r#"{"id":"s","role":"model","property_keys":[],"bogus":1}"#;
        assert!(serde_json::from_str::<Schema>(json).is_err());
    }

    #[test]
    fn schema_depends_on_key_slots_and_default_targets() {
        let schema = Schema::new("s", SchemaRole::Feature)
            .with_key("name")
            .with_default(PropertyValue::reference("owner", "alice"));
        let deps: Vec<String> = schema.dependencies().iter().map(ToString::to_string).collect();
        assert_eq!(
            deps,
            vec!["Feature:alice", "GenericProperty:name", "GenericProperty:owner"]
        );
    }

    #[test]
    fn schema_resource_key_follows_role() {
        let schema = Schema::new("s", SchemaRole::View);
        assert_eq!(schema.resource_key().to_string(), "ViewSchema:s");
    }
}
