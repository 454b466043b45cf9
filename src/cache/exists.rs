//! Memoised file existence probes.

use crate::source::is_remote_url;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Read-through cache of `Path::exists`, one probe per path
#[derive(Debug, Default)]
pub struct ExistsCache {
    entries: Mutex<HashMap<PathBuf, bool>>,
    lookups: AtomicUsize,
}

impl ExistsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote URLs never exist on disk.
    pub fn exists(&self, path: &Path) -> bool {
        if path.to_str().is_some_and(is_remote_url) {
            return false;
        }

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(known) = entries.get(path) {
            return *known;
        }

        let exists = path.exists();
        self.lookups.fetch_add(1, Ordering::Relaxed);
        entries.insert(path.to_path_buf(), exists);
        exists
    }

    /// Number of real filesystem probes so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
