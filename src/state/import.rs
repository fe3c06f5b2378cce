//! state::import
//!
//! Rebuild a catalog from a state directory.
//!
//! # Architecture
//!
//! Files are visited kind by kind in [`IMPORT_ORDER`], which already puts
//! most prerequisites first. For each object:
//!
//! 1. Skip it if the import cache or this run already handled it.
//! 2. Read it and compute its dependencies.
//! 3. For each dependency: resolve a generic property slot, skip the
//!    object's own key, import the dependency first if it has a file, then
//!    poll the store until the dependency is visible.
//! 4. Create the object. A failure is recorded and the run goes on; the
//!    object still counts as processed.
//! 5. Mark it in the import cache.
//!
//! A failed dependency is not waited for. Its dependents are created
//! anyway and fail on the missing prerequisite, so both end up in
//! [`ImportReport::failed`].

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::cache::{ExistenceCache, ImportCache};
use super::lock::StateDirLock;
use super::storage::{FsStateStorage, StateStorage};
use super::{kind_dir, StateError, IMPORT_ORDER};
use crate::catalog::{Catalog, CatalogError};
use crate::core::resource::DependencyResource;
use crate::core::types::{ResourceKey, ResourceKind};
use crate::model::CatalogObject;

/// Outcome of an import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Objects the import cache already listed.
    pub skipped: usize,
    pub failed: BTreeSet<ResourceKey>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Per-run bookkeeping.
struct Run {
    files: HashMap<ResourceKey, PathBuf>,
    in_progress: BTreeSet<ResourceKey>,
    processed: BTreeSet<ResourceKey>,
    existence: ExistenceCache,
    report: ImportReport,
}

/// Reads state through a [`StateStorage`] and recreates it in a catalog.
pub struct ImportManager<'a> {
    catalog: &'a Catalog,
    storage: &'a dyn StateStorage,
    cache: &'a dyn ImportCache,
    poll_timeout: Duration,
    poll_interval: Duration,
    existence_capacity: usize,
}

impl<'a> ImportManager<'a> {
    /// Create an importer with polling settings from the catalog's config.
    pub fn new(
        catalog: &'a Catalog,
        storage: &'a dyn StateStorage,
        cache: &'a dyn ImportCache,
    ) -> Self {
        let config = catalog.config();
        Self {
            catalog,
            storage,
            cache,
            poll_timeout: config.import_poll_timeout(),
            poll_interval: config.import_poll_interval(),
            existence_capacity: config.existence_cache_capacity(),
        }
    }

    /// Override how long a dependency is polled for.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Lock `dir`, open it as state storage and import from it.
    pub fn import_from_dir(
        catalog: &Catalog,
        dir: &Path,
        cache: &dyn ImportCache,
    ) -> Result<ImportReport, StateError> {
        let config = catalog.config();
        let _lock = StateDirLock::wait(dir, config.lock_poll_interval(), config.lock_lease())?;
        let storage = FsStateStorage::open(dir)?;
        ImportManager::new(catalog, &storage, cache).import_all()
    }

    /// Import every file in the state directory.
    ///
    /// Installs the catalog's reserved schemas first. Per-object failures
    /// are collected in the report; only storage, cache or install
    /// failures abort the run.
    pub fn import_all(&self) -> Result<ImportReport, StateError> {
        self.catalog.install()?;

        let ordered = self.index_files()?;
        let mut run = Run {
            files: ordered.iter().cloned().collect(),
            in_progress: BTreeSet::new(),
            processed: BTreeSet::new(),
            existence: ExistenceCache::new(self.existence_capacity),
            report: ImportReport::default(),
        };

        for (key, _) in &ordered {
            self.process(&mut run, key)?;
        }

        info!(
            imported = run.report.imported,
            skipped = run.report.skipped,
            failed = run.report.failed.len(),
            "import finished"
        );
        Ok(run.report)
    }

    /// Every state file with its resource key, in import order.
    fn index_files(&self) -> Result<Vec<(ResourceKey, PathBuf)>, StateError> {
        let mut ordered = Vec::new();
        for kind in IMPORT_ORDER {
            let Some(dir) = kind_dir(kind) else {
                continue;
            };
            for path in self
                .storage
                .list_files_in_directory(Path::new(dir), "*.json")?
            {
                let file_id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let key = match self.storage.resource_for(&file_id) {
                    Some(key) => key,
                    None => match self.read_object(&path) {
                        Ok(object) => object.resource(),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "skipping unreadable state file");
                            continue;
                        }
                    },
                };
                ordered.push((key, path));
            }
        }
        Ok(ordered)
    }

    fn read_object(&self, path: &Path) -> Result<CatalogObject, StateError> {
        let content = self.storage.read_string_file(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn process(&self, run: &mut Run, key: &ResourceKey) -> Result<(), StateError> {
        if run.processed.contains(key) || run.in_progress.contains(key) {
            return Ok(());
        }
        if self.cache.contains(key)? {
            debug!(key = %key, "already imported");
            run.processed.insert(key.clone());
            run.report.skipped += 1;
            return Ok(());
        }

        run.in_progress.insert(key.clone());
        let result = self.import_object(run, key);
        run.in_progress.remove(key);
        run.processed.insert(key.clone());

        match result {
            Ok(()) => {
                run.report.imported += 1;
                self.cache.mark(key)?;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to import object");
                run.report.failed.insert(key.clone());
            }
        }
        Ok(())
    }

    fn import_object(&self, run: &mut Run, key: &ResourceKey) -> Result<(), StateError> {
        let path = run
            .files
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::ReadError(format!("no state file for {key}")))?;
        let object = self.read_object(&path)?;
        if object.resource() != *key {
            return Err(StateError::ReadError(format!(
                "{} holds {} instead of {key}",
                path.display(),
                object.resource()
            )));
        }

        for dependency in object.dependencies() {
            // Feature schemas travel inside their Model.
            if dependency.kind() == ResourceKind::FeatureSchema {
                continue;
            }
            let dependency = self.resolve(run, &dependency)?;
            if dependency == *key {
                continue;
            }

            if run.files.contains_key(&dependency) {
                self.process(run, &dependency)?;
            }
            if run.report.failed.contains(&dependency) || run.in_progress.contains(&dependency) {
                continue;
            }
            self.wait_visible(run, &dependency)?;
        }

        self.catalog.create_object(object)?;
        debug!(key = %key, "imported");
        Ok(())
    }

    /// Turn a generic property slot into a concrete key.
    ///
    /// Existing properties win; otherwise a primitive then a reference
    /// file with that name is used.
    fn resolve(&self, run: &Run, dependency: &ResourceKey) -> Result<ResourceKey, StateError> {
        if dependency.kind() != ResourceKind::GenericProperty {
            return Ok(dependency.clone());
        }
        match self.catalog.properties().resolve_generic(dependency) {
            Ok(resolved) => Ok(resolved),
            Err(CatalogError::NotFound(_)) => [ResourceKind::PrimProperty, ResourceKind::RefProperty]
                .into_iter()
                .map(|kind| dependency.with_kind(kind))
                .find(|candidate| run.files.contains_key(candidate))
                .ok_or_else(|| StateError::from(CatalogError::NotFound(dependency.clone()))),
            Err(e) => Err(e.into()),
        }
    }

    /// Block until `key` is visible in the store or the timeout passes.
    fn wait_visible(&self, run: &mut Run, key: &ResourceKey) -> Result<(), StateError> {
        if run.existence.contains(key) {
            return Ok(());
        }

        let start = Instant::now();
        loop {
            if self
                .catalog
                .store()
                .exists(key)
                .map_err(CatalogError::from)?
            {
                run.existence.insert(key.clone());
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= self.poll_timeout {
                error!(key = %key, waited_ms = waited.as_millis() as u64, "dependency never became visible");
                return Err(StateError::Timeout {
                    key: key.clone(),
                    waited,
                });
            }
            thread::sleep(self.poll_interval.min(self.poll_timeout - waited));
        }
    }
}
