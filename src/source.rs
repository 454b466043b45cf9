//! # Source Descriptor
//!
//! Descrive da dove arrivano i byte dell'immagine sorgente.
//!
//! ## Responsabilità:
//! - Distingue file locale, buffer in memoria e URL remoto
//! - Riconosce gli URL remoti (`http:`/`https:`) a partire da una stringa
//! - Fornisce un'identità stabile della sorgente per i contatori della disk cache
//! - Fornisce un nome leggibile per i log

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Where the source image bytes come from
#[derive(Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Buffer(Arc<[u8]>),
    Url(String),
}

impl Source {
    /// Classifies a string as a remote URL or a local path.
    pub fn parse(src: &str) -> Self {
        if is_remote_url(src) {
            Source::Url(src.to_string())
        } else {
            Source::Path(PathBuf::from(src))
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Source::Buffer(Arc::from(bytes.into().into_boxed_slice()))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Source::Url(_))
    }

    /// Stable identity used to count disk cache lookups once per input.
    pub fn identity(&self) -> String {
        match self {
            Source::Path(path) => path.to_string_lossy().into_owned(),
            Source::Url(url) => url.clone(),
            Source::Buffer(bytes) => format!("buffer:{}", hex::encode(Sha256::digest(bytes))),
        }
    }

    /// Short human readable name for log lines.
    pub fn friendly_name(&self) -> String {
        match self {
            Source::Path(path) => path.display().to_string(),
            Source::Url(url) => url.clone(),
            Source::Buffer(bytes) => format!("<buffer {} bytes>", bytes.len()),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Source::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Source::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
        }
    }
}

impl From<&str> for Source {
    fn from(src: &str) -> Self {
        Source::parse(src)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::from_bytes(bytes)
    }
}

/// `http:` and `https:` URLs are remote; anything else (including Windows
/// drive letters, which parse as a one-letter scheme) is local.
pub fn is_remote_url(src: &str) -> bool {
    match Url::parse(src) {
        Ok(url) => url.scheme() == "http" || url.scheme() == "https",
        Err(_) => false,
    }
}
