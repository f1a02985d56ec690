//! Change tracking for watch mode.
//!
//! Filesystem events are folded into a [`ChangeSet`] keyed by extension and by
//! path. The set is shared between the watcher callback thread and the watch
//! loop, so [`ChangeTracker`] wraps it in a mutex.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// One changed file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeRecord {
    /// Absolute path of the changed file
    pub path: PathBuf,
    /// Lowercased extension with a leading dot (empty if none)
    pub extension: String,
}

impl ChangeRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let extension = normalize_extension(&path);
        Self { path, extension }
    }
}

/// Extension of `path` as `.ext`, lowercased. Empty when there is none.
pub fn normalize_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Distinct extensions and paths touched since the last pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    extensions: BTreeSet<String>,
    paths: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a change set from a list of paths.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut set = Self::new();
        for path in paths {
            set.insert(ChangeRecord::new(path));
        }
        set
    }

    /// Insert a record. Returns false if the path was already present.
    pub fn insert(&mut self, record: ChangeRecord) -> bool {
        if !record.extension.is_empty() {
            self.extensions.insert(record.extension);
        }
        self.paths.insert(record.path)
    }

    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }

    pub fn paths(&self) -> &BTreeSet<PathBuf> {
        &self.paths
    }

    pub fn contains_extension(&self, ext: &str) -> bool {
        self.extensions.contains(ext)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

/// Thread-safe accumulator of filesystem changes.
///
/// Cloning yields another handle to the same underlying set.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    inner: Arc<Mutex<ChangeSet>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChangeSet> {
        // A panic while holding the lock cannot leave the set half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a changed path. Re-recording a path is a no-op.
    pub fn record(&self, path: impl Into<PathBuf>) {
        self.lock().insert(ChangeRecord::new(path));
    }

    /// Copy of the current set without clearing it.
    pub fn snapshot(&self) -> ChangeSet {
        self.lock().clone()
    }

    /// Take the accumulated set, leaving an empty one behind.
    ///
    /// Called once at the start of a pass, so changes that arrive while the
    /// pass is running land in the fresh set and trigger the next pass.
    pub fn take(&self) -> ChangeSet {
        std::mem::take(&mut *self.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
