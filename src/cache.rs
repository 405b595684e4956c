//! Per-call cache of fully resolved external documents.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

/// Resolved documents keyed by target identifier (normalized path or URL).
///
/// Lives for a single `deref` call. Entries are cloned out on every hit,
/// so callers never hold a tree the cache also owns.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: HashMap<String, Value>,
    hits: usize,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the cached document for `key`.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let value = self.entries.get(key).cloned();
        if value.is_some() {
            self.hits += 1;
        }
        value
    }

    pub fn insert(&mut self, key: impl Into<String>, document: Value) {
        self.entries.insert(key.into(), document);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of lookups served from the cache.
    pub fn hits(&self) -> usize {
        self.hits
    }
}

/// Resolve `path` against `base` and normalize it lexically.
///
/// `.` is dropped and `..` pops the previous component. The file system
/// is not consulted, so the target does not need to exist.
pub fn normalize_path(base: &Path, path: &Path) -> PathBuf {
    let joined = base.join(path);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` above the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(component),
            },
            other => normalized.push(other),
        }
    }
    normalized
}

/// Make `folder` absolute against the process working directory.
pub fn absolute_folder(folder: &Path) -> PathBuf {
    if folder.is_absolute() {
        return normalize_path(Path::new(""), folder);
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    normalize_path(&cwd, folder)
}
