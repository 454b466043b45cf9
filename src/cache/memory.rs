//! In-process cache of request handles.
//!
//! Lookup and insertion happen under one lock, so two identical requests
//! admitted at the same time share a single handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
pub struct MemoryCache<V> {
    entries: Mutex<HashMap<String, V>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }
}

impl<V: Clone> MemoryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: String, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, value);
        debug!("Unique images processed: {}", entries.len());
    }

    pub fn get(&self, key: &str, count: bool) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let found = entries.get(key).cloned();
        if count {
            self.record(found.is_some());
        }
        found
    }

    /// Returns the cached value, or stores and returns `make()`. The flag is
    /// true on a hit.
    pub fn get_or_insert_with(&self, key: String, count: bool, make: impl FnOnce() -> V) -> (V, bool) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(found) = entries.get(&key) {
            if count {
                self.record(true);
            }
            return (found.clone(), true);
        }

        if count {
            self.record(false);
        }
        let value = make();
        entries.insert(key, value.clone());
        debug!("Unique images processed: {}", entries.len());
        (value, false)
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `(hits, misses)`
    pub fn counts(&self) -> (usize, usize) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    /// Clears the counters, keeps the entries.
    pub fn reset_counts(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
