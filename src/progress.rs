//! # Build Statistics Module
//!
//! Questo modulo raccoglie le statistiche delle cache della pipeline.
//!
//! ## Responsabilità:
//! - Snapshot dei contatori hit/miss di memory cache e disk cache
//! - Numero di probe reali sul filesystem (exists cache)
//! - Riepilogo testuale per i log di fine build
//!
//! ## Esempio:
//! ```rust,ignore
//! let stats = pipeline.cache_stats();
//! info!("{}", stats.format_summary());
//! pipeline.reset_counts();
//! ```

use serde::Serialize;

/// Snapshot of the pipeline cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub memory_hits: usize,
    pub memory_misses: usize,
    pub disk_hits: usize,
    pub disk_misses: usize,
    pub exists_lookups: usize,
    /// Distinct requests held by the memory cache
    pub unique_requests: usize,
}

impl BuildStats {
    /// Requests served without generating anything
    pub fn reused(&self) -> usize {
        self.memory_hits + self.disk_hits
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Unique images: {} | Re-used: {} (memory: {}, disk: {}) | Generated: {} | Existence probes: {}",
            self.unique_requests,
            self.reused(),
            self.memory_hits,
            self.disk_hits,
            self.disk_misses,
            self.exists_lookups
        )
    }
}
