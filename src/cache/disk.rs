//! Output file cache: an output whose fingerprinted path already exists is reused.

use crate::cache::ExistsCache;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct DiskCache {
    exists: Arc<ExistsCache>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl DiskCache {
    pub fn new(exists: Arc<ExistsCache>) -> Self {
        Self {
            exists,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Whether `output_path` can be reused.
    ///
    /// Only lookups with `count` set touch the hit/miss counters; a request
    /// sets it on its first variant only. A remote source that was just
    /// fetched fresh (`remote_cache_hit == Some(false)`) always regenerates.
    pub fn is_cached(&self, output_path: &Path, count: bool, remote_cache_hit: Option<bool>) -> bool {
        if remote_cache_hit == Some(false) {
            debug!("Remote source was re-fetched, regenerating {}", output_path.display());
            return false;
        }

        let cached = self.exists.exists(output_path);
        if count {
            if cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        cached
    }

    /// `(hits, misses)`
    pub fn counts(&self) -> (usize, usize) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    pub fn reset_counts(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
