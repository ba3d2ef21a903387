//! Key/value document storage.
//!
//! Values are opaque text blobs (JSON in practice) addressed by short keys.
//! [`FileStore`] keeps one `<key>.json` file per key inside a data
//! directory; [`MemoryStore`] keeps everything in a map and backs the tests.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use attendance_core::error::{AttendanceError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Minimal get/set/remove contract over serialized values.
pub trait KeyValueStore {
    /// Value stored under `key`, or `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value entirely.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;

    /// All keys currently present, sorted.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Reject keys that are empty or contain anything outside `[A-Za-z0-9_-]`.
///
/// Keys become file names, so path separators and dots are never allowed.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AttendanceError::InvalidKey(key.to_string()))
    }
}

// ── FileStore ─────────────────────────────────────────────────────────────────

const VALUE_EXTENSION: &str = "json";

/// Directory-backed store: `<root>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if missing) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| AttendanceError::FileAccess {
            path: root.clone(),
            source,
        })?;
        debug!("Opened file store at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", key, VALUE_EXTENSION))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(AttendanceError::FileAccess { path, source }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.path_for(key);

        // Each write gets its own temp file in the store directory, then is
        // renamed over the value; readers never see a torn value.
        let access = |source: std::io::Error| AttendanceError::FileAccess {
            path: path.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(access)?;
        tmp.write_all(value.as_bytes()).map_err(access)?;
        tmp.persist(&path).map_err(|e| access(e.error))?;

        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AttendanceError::FileAccess { path, source }),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable store entry: {}", e);
                    None
                }
            })
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .map(|ext| ext == VALUE_EXTENSION)
                        .unwrap_or(false)
            })
            .filter_map(|entry| {
                entry
                    .path()
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .filter(|key| validate_key(key).is_ok())
            .collect();

        keys.sort();
        Ok(keys)
    }
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// In-memory store with the same key rules as [`FileStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
