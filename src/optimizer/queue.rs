//! # Processing Queue
//!
//! Coda a concorrenza limitata: tutto il lavoro di decodifica/trasformazione
//! delle richieste passa da qui (backpressure su CPU e memoria).
//!
//! ## Responsabilità:
//! - Limita i job attivi con un `Semaphore` tokio
//! - Espone quanti job sono attivi e quanti in attesa, per diagnostica

use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Queue occupancy snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub concurrency: usize,
    pub active: usize,
    pub waiting: usize,
}

/// Decrements a counter when dropped, so cancelled jobs stay accounted for.
struct Gauge<'a>(&'a AtomicUsize);

impl<'a> Gauge<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Gauge<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct ProcessingQueue {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    active: AtomicUsize,
    waiting: AtomicUsize,
}

impl ProcessingQueue {
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        debug!("Processing queue with {} concurrent jobs", concurrency);
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            active: AtomicUsize::new(0),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Waits for a free slot, then runs `job` to completion.
    pub async fn add<F, T>(&self, job: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let permit = {
            let _waiting = Gauge::enter(&self.waiting);
            self.semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Task(format!("Processing queue closed: {}", e)))?
        };

        let _active = Gauge::enter(&self.active);
        debug!("Job admitted ({:?})", self.status());
        let output = job.await;
        drop(permit);
        Ok(output)
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            concurrency: self.concurrency,
            active: self.active.load(Ordering::SeqCst),
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }
}
