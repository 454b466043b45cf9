//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `PipelineError` enum per categorizzare tutti gli errori possibili
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//! - E' `Clone`: lo stesso risultato (anche d'errore) viene condiviso fra
//!   tutti i chiamanti che attendono la stessa richiesta
//!
//! ## Categorie di errori:
//! - `Configuration`: opzioni ambigue o mancanti (es. formato `auto` non risolvibile)
//! - `SourceRead`: file locale illeggibile o fetch remoto fallito
//! - `Codec`: errore di decode/resize/encode dal codec
//! - `Io`: errori di I/O in scrittura output
//! - `Hook`: errore restituito da un hook fornito dal chiamante
//! - `Task`: il task in coda è andato in panic o è stato abortito
//!
//! ## Esempio:
//! ```rust,ignore
//! if format == "auto" {
//!     return Err(PipelineError::Configuration("unresolved `auto` format".to_string()));
//! }
//! ```

use std::sync::Arc;

/// Errors surfaced by the image pipeline
#[derive(thiserror::Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unable to read source {source_name}: {message}")]
    SourceRead {
        source_name: String,
        message: String,
    },

    #[error("Image processing error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Hook error: {0}")]
    Hook(String),

    #[error("Processing task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub fn source_read(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::SourceRead {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Option and planning problems, as opposed to I/O or codec failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
