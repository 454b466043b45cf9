//! # Responsive Image Pipeline Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della pipeline
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita ai generatori di siti che la integrano
//!
//! ## Architettura dei moduli:
//! - `config`: Opzioni per richiesta, hook del chiamante e validazione
//! - `error`: Tipi di errore della pipeline
//! - `source`: File locale, buffer o URL remoto
//! - `format`: Nomi canonici, alias e MIME type dei formati
//! - `fingerprint`: Hash stabile della richiesta usato nei nomi file
//! - `planner`: Larghezze e formati di output per una sorgente
//! - `codec`: Contratto del codec immagini e implementazione col crate `image`
//! - `fetch`: Contratto del fetcher remoto
//! - `cache`: Memory cache, disk cache ed exists cache
//! - `file_manager`: Letture/scritture e creazione directory
//! - `optimizer`: Orchestratore (`ImagePipeline`), worker per richiesta e coda
//! - `progress`: Statistiche delle cache
//! - `logging`: Setup del subscriber `tracing`
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use responsive_image_pipeline::{ImagePipeline, Options, Width};
//!
//! let pipeline = ImagePipeline::new(Options::default());
//! let mut options = pipeline.options();
//! options.widths = vec![Width::Px(300), Width::Px(600)];
//! let results = pipeline.run("./photo.jpg", options).await?;
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod fetch;
pub mod file_manager;
pub mod fingerprint;
pub mod format;
pub mod logging;
pub mod optimizer;
pub mod planner;
pub mod progress;
pub mod source;
pub mod utils;

pub use codec::{Codec, ImageCrateCodec, SourceMetadata, TransformPipeline};
pub use config::{Options, SvgShortCircuit, Width};
pub use error::{PipelineError, Result};
pub use fetch::{FetchOptions, FetchedAsset, RemoteFetcher};
pub use optimizer::{HandleState, ImagePipeline, ResultHandle, ResultSet, Variant};
pub use progress::BuildStats;
pub use source::Source;
