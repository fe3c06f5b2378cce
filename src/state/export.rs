//! state::export
//!
//! Serialize every catalog entity into a state directory.
//!
//! A failure on one object is recorded and the run goes on; nothing is
//! rolled back. Reserved objects (ids starting with `__`) belong to the
//! install routine and are not exported. Files left by an earlier export
//! whose resource is gone from the catalog are removed, along with their
//! id-map entries.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, warn};

use super::lock::StateDirLock;
use super::storage::{object_path, FsStateStorage, StateStorage};
use super::{kind_dir, StateError, IMPORT_ORDER};
use crate::catalog::{Catalog, CatalogError};
use crate::core::resource::DependencyResource;
use crate::core::types::{ResourceKey, ResourceKind, RESERVED_PREFIX};
use crate::store::Record;

/// Outcome of an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub exported: usize,
    /// Stale files removed from earlier exports.
    pub pruned: usize,
    pub failed: BTreeSet<ResourceKey>,
}

impl ExportReport {
    /// Whether every object was written.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes a catalog through a [`StateStorage`].
pub struct ExportManager<'a> {
    catalog: &'a Catalog,
    storage: &'a dyn StateStorage,
}

impl<'a> ExportManager<'a> {
    pub fn new(catalog: &'a Catalog, storage: &'a dyn StateStorage) -> Self {
        Self { catalog, storage }
    }

    /// Lock `dir`, open it as state storage and export into it.
    ///
    /// Waits up to the configured lock lease for another run to finish.
    pub fn export_to_dir(catalog: &Catalog, dir: &Path) -> Result<ExportReport, StateError> {
        let config = catalog.config();
        let _lock = StateDirLock::wait(dir, config.lock_poll_interval(), config.lock_lease())?;
        let storage = FsStateStorage::open(dir)?;
        ExportManager::new(catalog, &storage).export_all()
    }

    /// Export every entity of every stored kind.
    ///
    /// Only a failure to enumerate a kind aborts the run.
    pub fn export_all(&self) -> Result<ExportReport, StateError> {
        let mut report = ExportReport::default();

        for kind in IMPORT_ORDER {
            let records = self
                .catalog
                .store()
                .list(kind)
                .map_err(CatalogError::from)?;
            let mut current = BTreeSet::new();
            for record in records {
                if record.key.name().starts_with(RESERVED_PREFIX) {
                    debug!(key = %record.key, "skipping reserved object");
                    continue;
                }
                match self.export_one(&record) {
                    Ok(()) => report.exported += 1,
                    Err(e) => {
                        warn!(key = %record.key, error = %e, "failed to export object");
                        report.failed.insert(record.key.clone());
                    }
                }
                current.insert(record.key);
            }
            report.pruned += self.prune_stale(kind, &current)?;
        }

        info!(
            exported = report.exported,
            pruned = report.pruned,
            failed = report.failed.len(),
            "export finished"
        );
        Ok(report)
    }

    /// Remove files under the kind's directory whose resource is not in
    /// `current`, or is not in the id map at all.
    fn prune_stale(
        &self,
        kind: ResourceKind,
        current: &BTreeSet<ResourceKey>,
    ) -> Result<usize, StateError> {
        let Some(dir) = kind_dir(kind) else {
            return Ok(0);
        };
        let mut pruned = 0;
        for path in self
            .storage
            .list_files_in_directory(Path::new(dir), "*.json")?
        {
            let Some(id) = file_stem(&path) else {
                continue;
            };
            match self.storage.resource_for(&id) {
                Some(key) if current.contains(&key) => continue,
                Some(key) => debug!(key = %key, file_id = %id, "pruning stale export"),
                None => debug!(path = %path.display(), "pruning unmapped export file"),
            }
            self.storage.remove_file(&path)?;
            self.storage.forget_file_id(&id)?;
            pruned += 1;
        }
        Ok(pruned)
    }

    fn export_one(&self, record: &Record) -> Result<(), StateError> {
        let object = self.catalog.decode(record)?;
        let key = object.resource();
        let id = self.storage.file_id_for(&key)?;
        let path = object_path(key.kind(), &id)
            .ok_or_else(|| StateError::WriteError(format!("{key} has no state directory")))?;
        self.storage
            .store_string_file(&path, &serde_json::to_string_pretty(&object)?)
    }
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}
