//! # Cache Module
//!
//! Tre livelli di cache che decidono solo *se* si può saltare il lavoro;
//! la correttezza del contenuto è garantita dal fingerprint nel nome file.
//!
//! - `memory`: richieste identiche in volo o già risolte (stesso handle)
//! - `disk`: output già presenti su disco, contati una volta per sorgente
//! - `exists`: memoizzazione delle probe di esistenza su filesystem

pub mod disk;
pub mod exists;
pub mod memory;

pub use disk::DiskCache;
pub use exists::ExistsCache;
pub use memory::MemoryCache;
