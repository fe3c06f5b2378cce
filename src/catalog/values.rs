//! Validation and cardinality-constrained application of property values.

use tracing::debug;

use super::{Catalog, CatalogError, CatalogResult};
use crate::core::cardinality::{Applied, ValueApplier};
use crate::core::types::{PropertyValue, ResourceKey, ResourceKind, Value};
use crate::model::{Feature, PrimitiveProperty, PropertyDefinition, ReferenceProperty};
use crate::store::Edge;

/// Edge label prefix for reference values.
pub(crate) const REF_EDGE_PREFIX: &str = "ref:";

/// Values accepted by one call, plus the edges their references produce.
#[derive(Debug, Default)]
pub(crate) struct AppliedValues {
    pub values: Vec<PropertyValue>,
    pub edges: Vec<Edge>,
}

/// Check every value against its definition and apply it under the
/// definition's cardinality. Tracking is fresh for each call.
///
/// Null values must name a defined property but are not stored.
pub(crate) fn apply_values(
    catalog: &Catalog,
    values: &[PropertyValue],
) -> CatalogResult<AppliedValues> {
    let mut applier = ValueApplier::new();
    let mut edges = Vec::new();

    for pv in values {
        let definition = catalog.properties().definition(&pv.name)?;
        let Some(value) = &pv.value else {
            continue;
        };

        match &definition {
            PropertyDefinition::Primitive(def) => check_primitive(def, value)?,
            PropertyDefinition::Reference(def) => check_reference(catalog, def, value)?,
        }

        let outcome = applier.apply(&pv.name, definition.cardinality(), value.clone())?;
        match (outcome, value.as_reference()) {
            (Applied::Added, Some(target)) => edges.push(Edge::new(
                format!("{REF_EDGE_PREFIX}{}", pv.name),
                ResourceKey::new(ResourceKind::Feature, target),
            )),
            (Applied::Ignored, _) => {
                debug!(property = %pv.name, value = %value, "duplicate value ignored");
            }
            _ => {}
        }
    }

    Ok(AppliedValues {
        values: applier.into_values(),
        edges,
    })
}

fn check_primitive(def: &PrimitiveProperty, value: &Value) -> CatalogResult<()> {
    match value.data_type() {
        None => {
            return Err(CatalogError::integrity(format!(
                "property '{}' is primitive but was given a reference ({value})",
                def.name
            )))
        }
        Some(dt) if dt != def.data_type => {
            return Err(CatalogError::integrity(format!(
                "property '{}' expects {}, got {}",
                def.name, def.data_type, dt
            )))
        }
        Some(_) => {}
    }
    if !value.is_finite() {
        return Err(CatalogError::integrity(format!(
            "property '{}' cannot hold non-finite value {value}",
            def.name
        )));
    }

    if let Some(allowed) = &def.allowed_values {
        if !allowed.contains(value) {
            return Err(CatalogError::integrity(format!(
                "value {value} is not allowed for property '{}'",
                def.name
            )));
        }
    }
    Ok(())
}

fn check_reference(catalog: &Catalog, def: &ReferenceProperty, value: &Value) -> CatalogResult<()> {
    let Some(target) = value.as_reference() else {
        return Err(CatalogError::integrity(format!(
            "property '{}' is a reference but was given {value}",
            def.name
        )));
    };

    if let Some(allowed) = &def.allowed_values {
        if !allowed.contains(target) {
            return Err(CatalogError::integrity(format!(
                "feature '{target}' is not allowed for property '{}'",
                def.name
            )));
        }
    }

    let feature: Feature =
        catalog.fetch_required(&ResourceKey::new(ResourceKind::Feature, target))?;
    if !catalog
        .models()
        .is_subtype(&feature.model_id, &def.target_model_id)?
    {
        return Err(CatalogError::integrity(format!(
            "feature '{target}' of model '{}' is not a subtype of '{}' required by '{}'",
            feature.model_id, def.target_model_id, def.name
        )));
    }
    Ok(())
}
