//! # File Management Module
//!
//! Questo modulo gestisce le operazioni su file della pipeline.
//!
//! ## Responsabilità:
//! - Lettura delle sorgenti locali e degli output già presenti
//! - Scrittura degli output, creando prima le directory parent
//! - `DirectoryManager`: crea ogni directory di output una sola volta
//! - Formattazione human-readable delle dimensioni per i log
//!
//! ## Esempio:
//! ```rust,ignore
//! let dirs = DirectoryManager::new();
//! let size = FileManager::write_file(&dirs, &output_path, &bytes).await?;
//! info!("Wrote {} ({})", output_path.display(), FileManager::format_size(size));
//! ```

use crate::error::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tracing::debug;

/// Creates output directories at most once per pipeline
#[derive(Debug, Default)]
pub struct DirectoryManager {
    created: Mutex<HashSet<PathBuf>>,
}

impl DirectoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_created(&self, dir: &Path) -> bool {
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(dir)
    }

    pub async fn create(&self, dir: &Path) -> Result<()> {
        if dir.as_os_str().is_empty() || self.is_created(dir) {
            return Ok(());
        }

        debug!("Creating directory {}", dir.display());
        fs::create_dir_all(dir).await?;
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(dir.to_path_buf());
        Ok(())
    }

    /// Creates the parent directory of `file_path`.
    pub async fn create_for_file(&self, file_path: &Path) -> Result<()> {
        match file_path.parent() {
            Some(parent) => self.create(parent).await,
            None => Ok(()),
        }
    }
}

/// File helpers
pub struct FileManager;

impl FileManager {
    pub async fn read_file(path: &Path) -> Result<Vec<u8>> {
        debug!("Reading {}", path.display());
        Ok(fs::read(path).await?)
    }

    pub async fn file_size(path: &Path) -> Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Writes `contents` after creating the parent directory, returns the byte count.
    pub async fn write_file(dirs: &DirectoryManager, path: &Path, contents: &[u8]) -> Result<u64> {
        dirs.create_for_file(path).await?;
        debug!("Writing {}", path.display());
        fs::write(path, contents).await?;
        Ok(contents.len() as u64)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
