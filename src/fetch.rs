//! # Remote Fetch Contract
//!
//! La pipeline non include un client HTTP: i byte delle sorgenti remote
//! arrivano da un `RemoteFetcher` fornito dal chiamante.
//!
//! ## Responsabilità:
//! - Definisce il trait `RemoteFetcher` (async)
//! - Definisce le opzioni della cache remota (`FetchOptions`)
//! - Riporta se l'ultimo fetch è stato servito da una cache ancora valida:
//!   un fetch "fresco" invalida la disk cache degli output

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Cache options forwarded to the remote fetcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// How long a fetched asset stays valid: `"30s"`, `"5m"`, `"1h"`, `"1d"`, `"2w"`, `"1y"` or `"*"`
    pub duration: String,
    /// Where the fetcher keeps its own cache
    pub directory: Option<PathBuf>,
    /// `None` inherits the request's `dry_run`
    pub dry_run: Option<bool>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            duration: "1d".to_string(),
            directory: None,
            dry_run: None,
        }
    }
}

impl FetchOptions {
    /// Options as seen by the fetcher for a request with the given `dry_run`.
    pub fn resolved(&self, request_dry_run: bool) -> Self {
        Self {
            dry_run: Some(self.dry_run.unwrap_or(request_dry_run)),
            ..self.clone()
        }
    }

    /// Parsed `duration`; `None` means the asset never expires.
    pub fn max_age(&self) -> Result<Option<Duration>> {
        let text = self.duration.trim();
        if text == "*" {
            return Ok(None);
        }

        let invalid = || crate::error::PipelineError::Configuration(format!("Invalid cache duration: {:?}", self.duration));
        let split = text.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let (amount, unit) = text.split_at(split);
        let amount: u64 = amount.parse().map_err(|_| invalid())?;
        let unit_secs = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            "d" => 24 * 60 * 60,
            "w" => 7 * 24 * 60 * 60,
            "y" => 365 * 24 * 60 * 60,
            _ => return Err(invalid()),
        };
        let secs = amount.checked_mul(unit_secs).ok_or_else(invalid)?;
        Ok(Some(Duration::from_secs(secs)))
    }
}

/// Bytes of a fetched remote source
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    /// True when served from a still-valid cache entry
    pub cache_hit: bool,
}

/// Source of remote image bytes
#[async_trait::async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetch the bytes behind `url`.
    ///
    /// Failures should be reported as [`crate::PipelineError::SourceRead`].
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedAsset>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        let with = |d: &str| FetchOptions {
            duration: d.to_string(),
            ..Default::default()
        };
        assert_eq!(with("1d").max_age().unwrap(), Some(Duration::from_secs(86_400)));
        assert_eq!(with("30s").max_age().unwrap(), Some(Duration::from_secs(30)));
        assert_eq!(with("2w").max_age().unwrap(), Some(Duration::from_secs(1_209_600)));
        assert_eq!(with("*").max_age().unwrap(), None);
        assert!(with("soon").max_age().is_err());
        assert!(with("10").max_age().is_err());
        assert!(with("10q").max_age().is_err());
        assert!(with("99999999999999w").max_age().unwrap_err().is_configuration());
    }

    #[test]
    fn test_dry_run_inheritance() {
        let options = FetchOptions::default();
        assert_eq!(options.resolved(true).dry_run, Some(true));

        let explicit = FetchOptions {
            dry_run: Some(false),
            ..Default::default()
        };
        assert_eq!(explicit.resolved(true).dry_run, Some(false));
    }
}
