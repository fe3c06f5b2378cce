//! Integration tests for state export and import.
//!
//! Each test builds a catalog, exports it into a tempfile directory and
//! imports the directory into a fresh catalog over its own in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use schemagraph::catalog::{Catalog, EMPTY_MODEL_SCHEMA, EMPTY_VIEW_SCHEMA};
use schemagraph::core::config::Config;
use schemagraph::core::schema::{Schema, SchemaRole};
use schemagraph::core::types::{
    Cardinality, DataType, PropertyValue, ResourceKey, ResourceKind, Value,
};
use schemagraph::model::{
    FieldType, Index, IndexType, Model, NewFeature, PrimitiveProperty, ReferenceProperty, View,
};
use schemagraph::state::cache::{FsImportCache, MemoryImportCache};
use schemagraph::state::export::ExportManager;
use schemagraph::state::import::{ImportManager, ImportReport};
use schemagraph::state::storage::{object_path, FsStateStorage, StateStorage};
use schemagraph::store::MemoryGraphStore;

// =============================================================================
// Test Helpers
// =============================================================================

/// Route catalog logs through the test harness's captured output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn installed() -> Catalog {
    init_tracing();
    let catalog = Catalog::in_memory();
    catalog.install().expect("install");
    catalog
}

fn export(catalog: &Catalog) -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    let report = ExportManager::export_to_dir(catalog, dir.path()).expect("export");
    assert!(report.is_clean(), "export failed for {:?}", report.failed);
    dir
}

fn import_into(catalog: &Catalog, dir: &TempDir) -> ImportReport {
    let cache = MemoryImportCache::new();
    ImportManager::import_from_dir(catalog, dir.path(), &cache).expect("import")
}

fn key(kind: ResourceKind, name: &str) -> ResourceKey {
    ResourceKey::new(kind, name)
}

/// Two-parent model hierarchy with one of everything.
fn populated() -> Catalog {
    let catalog = installed();
    catalog
        .properties()
        .create_primitive(PrimitiveProperty::new("name", DataType::String))
        .unwrap();
    catalog
        .properties()
        .create_primitive(
            PrimitiveProperty::new("color", DataType::String)
                .with_cardinality(Cardinality::Set)
                .with_allowed_values(vec![
                    Value::String("red".into()),
                    Value::String("blue".into()),
                ]),
        )
        .unwrap();

    catalog
        .models()
        .create(
            Model::new("named", EMPTY_MODEL_SCHEMA)
                .with_feature_schema(Schema::new("named", SchemaRole::Feature).with_key("name")),
        )
        .unwrap();
    catalog
        .models()
        .create(
            Model::new("colored", EMPTY_MODEL_SCHEMA).with_feature_schema(
                Schema::new("colored", SchemaRole::Feature)
                    .with_key("color")
                    .with_default(PropertyValue::new("color", Value::String("red".into()))),
            ),
        )
        .unwrap();
    catalog
        .models()
        .create(Model::new("car", EMPTY_MODEL_SCHEMA).inheriting(["named", "colored"]))
        .unwrap();

    catalog
        .properties()
        .create_reference(ReferenceProperty::new("favorite", "car"))
        .unwrap();

    catalog
        .features()
        .create(
            NewFeature::new("herbie", "car")
                .with_property(PropertyValue::new("name", Value::String("Herbie".into()))),
        )
        .unwrap();

    catalog
        .schemas()
        .create(Schema::new("showroom", SchemaRole::View).with_key("favorite"))
        .unwrap();
    catalog
        .views()
        .create(
            View::new("lot", "showroom")
                .with_model("car")
                .with_property(PropertyValue::reference("favorite", "herbie")),
        )
        .unwrap();

    catalog
        .indices()
        .create(Index::new("by-name", FieldType::Vertex, IndexType::Composite).on("name"))
        .unwrap();

    catalog
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn export_then_import_reproduces_every_entity() {
    let source = populated();
    let dir = export(&source);

    let target = Catalog::in_memory();
    let report = import_into(&target, &dir);
    assert!(report.is_clean(), "import failed for {:?}", report.failed);
    assert_eq!(report.skipped, 0);

    for id in ["named", "colored", "car"] {
        assert_eq!(
            target.models().get(id).unwrap(),
            source.models().get(id).unwrap(),
            "model {id}"
        );
    }
    assert_eq!(
        target.features().get("herbie").unwrap(),
        source.features().get("herbie").unwrap()
    );
    assert_eq!(
        target.views().get("lot").unwrap(),
        source.views().get("lot").unwrap()
    );
    assert_eq!(
        target.schemas().get("showroom", SchemaRole::View).unwrap(),
        source.schemas().get("showroom", SchemaRole::View).unwrap()
    );
    assert_eq!(
        target.indices().get("by-name").unwrap(),
        source.indices().get("by-name").unwrap()
    );
    assert_eq!(
        target.properties().get_primitive("color").unwrap(),
        source.properties().get_primitive("color").unwrap()
    );
    assert_eq!(
        target.properties().get_reference("favorite").unwrap(),
        source.properties().get_reference("favorite").unwrap()
    );

    let herbie = target.features().get("herbie").unwrap().unwrap();
    assert_eq!(herbie.inherits_from.first().map(String::as_str), Some("car"));
    assert!(herbie
        .values("color")
        .any(|pv| pv.value == Some(Value::String("red".into()))));
}

#[test]
fn reexport_of_imported_catalog_is_identical() {
    let source = populated();
    let first = export(&source);

    let target = Catalog::in_memory();
    assert!(import_into(&target, &first).is_clean());
    let second = export(&target);

    let a = FsStateStorage::open(first.path()).unwrap();
    let b = FsStateStorage::open(second.path()).unwrap();
    for resource in [
        key(ResourceKind::Feature, "herbie"),
        key(ResourceKind::Model, "car"),
        key(ResourceKind::View, "lot"),
        key(ResourceKind::Index, "by-name"),
    ] {
        let id = a.lookup_file_id(&resource).expect("exported");
        assert_eq!(b.lookup_file_id(&resource).as_deref(), Some(id.as_str()));
        let path = object_path(resource.kind(), &id).unwrap();
        assert_eq!(
            a.read_string_file(&path).unwrap(),
            b.read_string_file(&path).unwrap(),
            "{resource}"
        );
    }
}

#[test]
fn reexport_into_same_dir_drops_deleted_entities() {
    let source = populated();
    source
        .models()
        .create(Model::new("scrapped", EMPTY_MODEL_SCHEMA))
        .unwrap();
    let dir = export(&source);

    source.models().delete("scrapped").unwrap();
    let report = ExportManager::export_to_dir(&source, dir.path()).expect("re-export");
    assert!(report.is_clean());
    assert_eq!(report.pruned, 1);

    let target = Catalog::in_memory();
    let report = import_into(&target, &dir);
    assert!(report.is_clean(), "import failed for {:?}", report.failed);
    assert!(target.models().get("scrapped").unwrap().is_none());
    assert!(target.models().get("car").unwrap().is_some());
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn feature_referenced_by_model_default_is_imported_first() {
    let source = installed();
    source
        .models()
        .create(Model::new("car", EMPTY_MODEL_SCHEMA))
        .unwrap();
    source
        .features()
        .create(NewFeature::new("beetle", "car"))
        .unwrap();
    source
        .properties()
        .create_reference(ReferenceProperty::new("parked", "car"))
        .unwrap();
    source
        .models()
        .create(
            Model::new("garage", EMPTY_MODEL_SCHEMA).with_feature_schema(
                Schema::new("garage", SchemaRole::Feature)
                    .with_key("parked")
                    .with_default(PropertyValue::reference("parked", "beetle")),
            ),
        )
        .unwrap();
    let dir = export(&source);

    let target = Catalog::in_memory();
    let report = import_into(&target, &dir);
    assert!(report.is_clean(), "import failed for {:?}", report.failed);
    assert_eq!(report.imported, 4);

    let garage = target.models().get("garage").unwrap().unwrap();
    assert_eq!(
        garage.feature_schema.default_properties,
        vec![PropertyValue::reference("parked", "beetle")]
    );
}

#[test]
fn self_dependencies_do_not_block_import() {
    let source = installed();
    source
        .properties()
        .create_primitive(PrimitiveProperty::new("name", DataType::String))
        .unwrap();
    source
        .views()
        .create(View::new("root", EMPTY_VIEW_SCHEMA).with_view("root"))
        .unwrap();
    let dir = export(&source);

    let target = Catalog::in_memory();
    let report = import_into(&target, &dir);
    assert!(report.is_clean());
    assert_eq!(report.imported, 2);
    assert_eq!(
        target.views().get("root").unwrap().unwrap().view_ids,
        BTreeSet::from(["root".to_string()])
    );
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn failed_prerequisite_fails_its_dependents_only() {
    let source = installed();
    source
        .properties()
        .create_primitive(PrimitiveProperty::new("name", DataType::String))
        .unwrap();
    source
        .schemas()
        .create(Schema::new("fleet", SchemaRole::Model))
        .unwrap();
    source
        .models()
        .create(Model::new("truck", "fleet"))
        .unwrap();
    source
        .features()
        .create(NewFeature::new("t1", "truck"))
        .unwrap();
    let dir = export(&source);

    let store = Arc::new(MemoryGraphStore::new());
    store.fail_create_of(key(ResourceKind::ModelSchema, "fleet"));
    let target = Catalog::with_store(store, Config::default());
    let report = import_into(&target, &dir);

    assert_eq!(
        report.failed,
        BTreeSet::from([
            key(ResourceKind::ModelSchema, "fleet"),
            key(ResourceKind::Model, "truck"),
            key(ResourceKind::Feature, "t1"),
        ])
    );
    assert_eq!(report.imported, 1);
    assert!(target.properties().get_primitive("name").unwrap().is_some());
}

#[test]
fn import_waits_for_lagging_visibility() {
    let source = installed();
    source
        .models()
        .create(Model::new("a", EMPTY_MODEL_SCHEMA))
        .unwrap();
    source
        .models()
        .create(Model::new("b", EMPTY_MODEL_SCHEMA).inheriting(["a"]))
        .unwrap();
    let dir = export(&source);

    let store = Arc::new(MemoryGraphStore::with_visibility_lag(Duration::from_millis(20)));
    let target = Catalog::with_store(store, Config::default());
    let report = import_into(&target, &dir);
    assert!(report.is_clean(), "import failed for {:?}", report.failed);

    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(
        target.models().get("b").unwrap().unwrap().inherits_from,
        BTreeSet::from(["a".to_string()])
    );
}

#[test]
fn durable_cache_resumes_without_recreating() {
    let source = populated();
    let dir = export(&source);
    let cache_dir = TempDir::new().unwrap();
    let cache_path = cache_dir.path().join(FsImportCache::FILE_NAME);

    let first = Catalog::in_memory();
    let cache = FsImportCache::open(&cache_path).unwrap();
    let report = ImportManager::import_from_dir(&first, dir.path(), &cache).unwrap();
    assert!(report.is_clean());
    let imported = report.imported;

    let second = Catalog::in_memory();
    let reopened = FsImportCache::open(&cache_path).unwrap();
    let report = ImportManager::import_from_dir(&second, dir.path(), &reopened).unwrap();
    assert_eq!(report.imported, 0);
    assert_eq!(report.skipped, imported);
    assert!(second.models().get("car").unwrap().is_none());
}
