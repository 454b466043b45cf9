//! # Logging Setup
//!
//! Inizializzazione del subscriber `tracing` per chi usa la libreria da un
//! binario o da un test.
//!
//! ## Livelli:
//! - INFO di default, DEBUG con `verbose`
//! - `RUST_LOG` ha la precedenza quando è impostata

use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // the first call may lose against another test's subscriber; the second never succeeds
        let _ = init(true);
        assert!(init(false).is_err());
    }
}
