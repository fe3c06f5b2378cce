//! state::storage
//!
//! File I/O for exported state and the durable resource ⟷ file-id map.
//!
//! # Design
//!
//! All paths handed to a [`StateStorage`] are relative to its root. File
//! ids are the first 32 hex digits of the SHA-256 of the resource string,
//! so the same resource always lands in the same file. The map is kept in
//! `<root>/ids.json` so the importer can go from a file back to its key
//! without parsing the file.
//!
//! Every write is atomic: content goes to a temp file that is synced and
//! then renamed over the target.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{kind_dir, StateError};
use crate::core::types::{ResourceKey, ResourceKind};

/// Name of the id map file under the storage root.
pub const IDS_FILE: &str = "ids.json";

const FILE_ID_LEN: usize = 32;

/// Byte I/O plus the resource ⟷ file-id map.
pub trait StateStorage: Send + Sync {
    /// Write `contents` to `path`, creating parent directories.
    fn store_string_file(&self, path: &Path, contents: &str) -> Result<(), StateError>;

    /// Read the whole file at `path`.
    fn read_string_file(&self, path: &Path) -> Result<String, StateError>;

    fn path_exists(&self, path: &Path) -> bool;

    /// Files directly under `dir` whose name matches `glob`, sorted.
    ///
    /// A missing directory yields an empty list.
    fn list_files_in_directory(&self, dir: &Path, glob: &str) -> Result<Vec<PathBuf>, StateError>;

    /// The file id for `key`, recording it durably if new.
    fn file_id_for(&self, key: &ResourceKey) -> Result<String, StateError>;

    /// The file id already recorded for `key`.
    fn lookup_file_id(&self, key: &ResourceKey) -> Option<String>;

    /// The resource recorded for `file_id`.
    fn resource_for(&self, file_id: &str) -> Option<ResourceKey>;

    /// Remove the file at `path`. Returns false if there was none.
    fn remove_file(&self, path: &Path) -> Result<bool, StateError>;

    /// Drop the map entry for `file_id`, if any.
    fn forget_file_id(&self, file_id: &str) -> Result<(), StateError>;
}

/// Relative path of the file for `key` with id `file_id`.
///
/// `None` for kinds that are never stored on their own.
pub fn object_path(kind: ResourceKind, file_id: &str) -> Option<PathBuf> {
    kind_dir(kind).map(|dir| Path::new(dir).join(format!("{file_id}.json")))
}

/// Deterministic file id for a resource.
///
/// # Example
///
/// ```
/// use schemagraph::core::types::{ResourceKey, ResourceKind};
/// use schemagraph::state::storage::file_id;
///
/// let key = ResourceKey::new(ResourceKind::Model, "car");
/// assert_eq!(file_id(&key), file_id(&key));
/// assert_eq!(file_id(&key).len(), 32);
/// ```
pub fn file_id(key: &ResourceKey) -> String {
    let digest = Sha256::digest(key.to_string().as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(FILE_ID_LEN);
    id
}

/// On-disk form of the id map.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdFile {
    #[serde(default)]
    resources: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct IdMap {
    by_resource: BTreeMap<String, String>,
    by_file: HashMap<String, ResourceKey>,
}

/// Filesystem-backed state storage rooted at one directory.
#[derive(Debug)]
pub struct FsStateStorage {
    root: PathBuf,
    ids: Mutex<IdMap>,
}

impl FsStateStorage {
    /// Open (creating if needed) a state directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StateError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            StateError::WriteError(format!("cannot create {}: {}", root.display(), e))
        })?;

        let ids_path = root.join(IDS_FILE);
        let mut ids = IdMap::default();
        if ids_path.exists() {
            let content = fs::read_to_string(&ids_path).map_err(|e| {
                StateError::ReadError(format!("cannot read {}: {}", ids_path.display(), e))
            })?;
            let file: IdFile = serde_json::from_str(&content)?;
            for (resource, id) in file.resources {
                let key: ResourceKey = resource.parse().map_err(|e| {
                    StateError::ReadError(format!("bad entry in {}: {}", ids_path.display(), e))
                })?;
                ids.by_file.insert(id.clone(), key);
                ids.by_resource.insert(resource, id);
            }
        }

        Ok(Self {
            root,
            ids: Mutex::new(ids),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ids(&self) -> MutexGuard<'_, IdMap> {
        match self.ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn save_ids(&self, ids: &IdMap) -> Result<(), StateError> {
        let file = IdFile {
            resources: ids.by_resource.clone(),
        };
        write_atomic(&self.root.join(IDS_FILE), &serde_json::to_string_pretty(&file)?)
    }
}

impl StateStorage for FsStateStorage {
    fn store_string_file(&self, path: &Path, contents: &str) -> Result<(), StateError> {
        write_atomic(&self.root.join(path), contents)
    }

    fn read_string_file(&self, path: &Path) -> Result<String, StateError> {
        let full = self.root.join(path);
        fs::read_to_string(&full)
            .map_err(|e| StateError::ReadError(format!("cannot read {}: {}", full.display(), e)))
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.root.join(path).exists()
    }

    fn list_files_in_directory(&self, dir: &Path, glob: &str) -> Result<Vec<PathBuf>, StateError> {
        let full = self.root.join(dir);
        if !full.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&full)
            .map_err(|e| StateError::ReadError(format!("cannot list {}: {}", full.display(), e)))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StateError::ReadError(e.to_string()))?;
            let is_file = entry
                .file_type()
                .map_err(|e| StateError::ReadError(e.to_string()))?
                .is_file();
            let name = entry.file_name();
            if is_file && glob_matches(glob, &name.to_string_lossy()) {
                files.push(dir.join(name));
            }
        }
        files.sort();
        Ok(files)
    }

    fn file_id_for(&self, key: &ResourceKey) -> Result<String, StateError> {
        let resource = key.to_string();
        let mut ids = self.ids();
        if let Some(id) = ids.by_resource.get(&resource) {
            return Ok(id.clone());
        }

        let id = file_id(key);
        if let Some(other) = ids.by_file.get(&id) {
            return Err(StateError::WriteError(format!(
                "file id {id} already belongs to {other}"
            )));
        }
        ids.by_resource.insert(resource, id.clone());
        ids.by_file.insert(id.clone(), key.clone());
        self.save_ids(&ids)?;
        debug!(key = %key, file_id = %id, "recorded file id");
        Ok(id)
    }

    fn lookup_file_id(&self, key: &ResourceKey) -> Option<String> {
        self.ids().by_resource.get(&key.to_string()).cloned()
    }

    fn resource_for(&self, file_id: &str) -> Option<ResourceKey> {
        self.ids().by_file.get(file_id).cloned()
    }

    fn remove_file(&self, path: &Path) -> Result<bool, StateError> {
        let full = self.root.join(path);
        match fs::remove_file(&full) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StateError::WriteError(format!(
                "cannot remove {}: {}",
                full.display(),
                e
            ))),
        }
    }

    fn forget_file_id(&self, file_id: &str) -> Result<(), StateError> {
        let mut ids = self.ids();
        let Some(key) = ids.by_file.remove(file_id) else {
            return Ok(());
        };
        ids.by_resource.remove(&key.to_string());
        self.save_ids(&ids)?;
        debug!(key = %key, file_id = %file_id, "forgot file id");
        Ok(())
    }
}

/// Write `contents` to `path` via a synced temp file and a rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StateError::WriteError(format!("cannot create directory: {}", e)))?;
    }

    let temp_path = path.with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| StateError::WriteError(format!("cannot create temp file: {}", e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| StateError::WriteError(format!("cannot write {}: {}", path.display(), e)))?;
        file.sync_all()
            .map_err(|e| StateError::WriteError(format!("cannot sync to disk: {}", e)))?;
    }

    fs::rename(&temp_path, path)
        .map_err(|e| StateError::WriteError(format!("cannot rename temp file: {}", e)))
}

#[derive(Debug, PartialEq)]
enum GlobToken {
    Any,
    One,
    Literal(char),
    Class { negated: bool, ranges: Vec<(char, char)> },
}

impl GlobToken {
    fn matches(&self, c: char) -> bool {
        match self {
            GlobToken::Any | GlobToken::One => true,
            GlobToken::Literal(l) => *l == c,
            GlobToken::Class { negated, ranges } => {
                ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi) != *negated
            }
        }
    }
}

/// Split a pattern into tokens. An unterminated `[` is a literal.
fn parse_glob(pattern: &str) -> Vec<GlobToken> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => tokens.push(GlobToken::Any),
            '?' => tokens.push(GlobToken::One),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                tokens.push(GlobToken::Literal(chars[i]));
            }
            '[' => match parse_class(&chars[i + 1..]) {
                Some((token, used)) => {
                    tokens.push(token);
                    i += used;
                }
                None => tokens.push(GlobToken::Literal('[')),
            },
            c => tokens.push(GlobToken::Literal(c)),
        }
        i += 1;
    }
    tokens
}

/// Parse the body of a `[...]` class. Returns the token and the number of
/// chars consumed, closing bracket included.
fn parse_class(chars: &[char]) -> Option<(GlobToken, usize)> {
    let mut i = 0;
    let negated = matches!(chars.first(), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut ranges = Vec::new();
    let mut first = true;
    loop {
        let c = *chars.get(i)?;
        if c == ']' && !first {
            return Some((GlobToken::Class { negated, ranges }, i + 1));
        }
        first = false;
        let lo = if c == '\\' {
            i += 1;
            *chars.get(i)?
        } else {
            c
        };
        match (chars.get(i + 1), chars.get(i + 2)) {
            (Some('-'), Some(&hi)) if hi != ']' => {
                ranges.push((lo, hi));
                i += 3;
            }
            _ => {
                ranges.push((lo, lo));
                i += 1;
            }
        }
    }
}

/// Shell-style match supporting `*`, `?`, `[...]` classes (negated with
/// `!` or `^`) and `\` escapes.
fn glob_matches(pattern: &str, name: &str) -> bool {
    let p = parse_glob(pattern);
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ni < n.len() {
        match p.get(pi) {
            Some(GlobToken::Any) => {
                backtrack = Some((pi, ni));
                pi += 1;
            }
            Some(token) if token.matches(n[ni]) => {
                pi += 1;
                ni += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    ni = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|t| *t == GlobToken::Any)
}
