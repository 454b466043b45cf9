//! # Optimizer Module
//!
//! Separa le responsabilità della pipeline in sottomoduli:
//! - `media_optimizer`: contesto di processo (`ImagePipeline`) e handle condivisi
//! - `task_optimizer`: worker per una singola richiesta
//! - `queue`: coda a concorrenza limitata
//! - `assembler`: raggruppamento dei risultati per formato
//! - `path_resolver`: logica di calcolo di nomi file, path e URL centralizzata

pub mod assembler;
pub mod media_optimizer;
pub mod path_resolver;
pub mod queue;
pub mod task_optimizer;

pub use assembler::{ResultSet, Variant};
pub use media_optimizer::{HandleState, ImagePipeline, ImagePipelineBuilder, ResultHandle};
pub use path_resolver::PathResolver;
pub use queue::{ProcessingQueue, QueueStatus};
pub use task_optimizer::ImageTask;
