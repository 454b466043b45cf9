//! # Image Pipeline Orchestrator
//!
//! Contesto di processo: possiede codec, fetcher, cache e coda, e
//! delega ogni richiesta a un `ImageTask`.
//!
//! ## Responsabilità:
//! - Validazione sincrona delle opzioni prima di accodare lavoro
//! - Ammissione nella memory cache sotto un unico lock: richieste identiche
//!   ricevono lo stesso `ResultHandle`
//! - Avvio immediato del task in coda (il lavoro parte anche se nessuno
//!   attende l'handle)
//! - API di sola pianificazione: `stats_sync`, `stats_by_dimensions`
//! - Contatori delle cache e stato della coda per la diagnostica
//!
//! ## Esempio:
//! ```rust,ignore
//! let pipeline = ImagePipeline::new(Options::default());
//! let handle = pipeline.process("./photo.jpg", pipeline.options())?;
//! if let Some(results) = handle.await? {
//!     for variant in results.variants() {
//!         println!("{}", variant.srcset);
//!     }
//! }
//! ```

use crate::cache::MemoryCache;
use crate::codec::{Codec, ImageCrateCodec, SourceMetadata};
use crate::config::Options;
use crate::error::{PipelineError, Result};
use crate::fetch::RemoteFetcher;
use crate::optimizer::assembler::ResultSet;
use crate::optimizer::queue::{ProcessingQueue, QueueStatus};
use crate::optimizer::task_optimizer::{ImageTask, TaskContext};
use crate::progress::BuildStats;
use crate::source::Source;
use crate::utils::canonical_json;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{json, Value};
use std::fmt;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

type SharedOutcome = Shared<BoxFuture<'static, Result<Option<Arc<ResultSet>>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Resolved,
}

/// Shared, awaitable result of one request.
///
/// Every clone resolves to the same value; `None` means the request failed
/// in degraded mode.
#[derive(Clone)]
pub struct ResultHandle {
    key: Arc<str>,
    done: Arc<AtomicBool>,
    outcome: SharedOutcome,
}

impl ResultHandle {
    /// Queues `task` right away on the current tokio runtime.
    fn spawn(key: Arc<str>, queue: Arc<ProcessingQueue>, task: ImageTask) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let finished = done.clone();
        let job = tokio::spawn(async move {
            let outcome = queue.add(task.run()).await.and_then(|outcome| outcome);
            finished.store(true, Ordering::SeqCst);
            outcome
        });

        let outcome = async move { job.await.map_err(PipelineError::from).and_then(|outcome| outcome) }
            .boxed()
            .shared();

        Self { key, done, outcome }
    }

    pub fn state(&self) -> HandleState {
        if self.done.load(Ordering::SeqCst) {
            HandleState::Resolved
        } else {
            HandleState::Pending
        }
    }

    /// Whether both handles come from the same admitted request.
    pub fn same_request(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.key, &other.key)
    }
}

impl IntoFuture for ResultHandle {
    type Output = Result<Option<Arc<ResultSet>>>;
    type IntoFuture = SharedOutcome;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome
    }
}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle").field("state", &self.state()).finish()
    }
}

/// Builder for an `ImagePipeline` with a custom codec or remote fetcher
#[derive(Default)]
pub struct ImagePipelineBuilder {
    defaults: Option<Options>,
    codec: Option<Arc<dyn Codec>>,
    fetcher: Option<Arc<dyn RemoteFetcher>>,
}

impl ImagePipelineBuilder {
    pub fn options(mut self, defaults: Options) -> Self {
        self.defaults = Some(defaults);
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> ImagePipeline {
        let defaults = self.defaults.unwrap_or_default();
        let codec = self.codec.unwrap_or_else(|| Arc::new(ImageCrateCodec::new()));
        ImagePipeline {
            queue: Arc::new(ProcessingQueue::new(defaults.concurrency)),
            context: Arc::new(TaskContext::new(codec, self.fetcher)),
            memory: MemoryCache::new(),
            defaults,
        }
    }
}

/// Process-wide image pipeline
pub struct ImagePipeline {
    defaults: Options,
    context: Arc<TaskContext>,
    memory: MemoryCache<ResultHandle>,
    queue: Arc<ProcessingQueue>,
}

impl ImagePipeline {
    /// Pipeline backed by the `image` crate codec, without remote fetching.
    pub fn new(defaults: Options) -> Self {
        Self::builder().options(defaults).build()
    }

    pub fn builder() -> ImagePipelineBuilder {
        ImagePipelineBuilder::default()
    }

    /// A copy of the process-wide defaults, to customise per request.
    pub fn options(&self) -> Options {
        self.defaults.clone()
    }

    /// Defaults deep-merged with a partial JSON object.
    pub fn options_with(&self, overrides: Value) -> Result<Options> {
        self.defaults.with_overrides(overrides)
    }

    /// Admits a request and returns its handle.
    ///
    /// Option errors are returned here, before anything is queued. Identical
    /// requests share one handle while `use_cache` is on. Must be called from
    /// within a tokio runtime.
    pub fn process(&self, source: impl Into<Source>, options: Options) -> Result<ResultHandle> {
        options.validate()?;
        let source = source.into();
        let key = self.memory_key(&source, &options)?;
        let options = Arc::new(options);

        if !options.use_cache {
            return Ok(self.spawn(Arc::from(key), source, options));
        }

        let (handle, hit) = self.memory.get_or_insert_with(key.clone(), true, || {
            self.spawn(Arc::from(key), source.clone(), options)
        });
        if hit {
            debug!("Re-using in-flight request for {}", source.friendly_name());
        }
        Ok(handle)
    }

    /// `process` followed by awaiting the handle.
    pub async fn run(&self, source: impl Into<Source>, options: Options) -> Result<Option<Arc<ResultSet>>> {
        self.process(source, options)?.await
    }

    fn spawn(&self, key: Arc<str>, source: Source, options: Arc<Options>) -> ResultHandle {
        let task = ImageTask::new(source, options, self.context.clone());
        ResultHandle::spawn(key, self.queue.clone(), task)
    }

    /// Plans the variants of a local file or buffer from a header probe.
    pub fn stats_sync(&self, source: impl Into<Source>, options: Options) -> Result<ResultSet> {
        options.validate()?;
        let source = source.into();
        let bytes: Arc<[u8]> = match &source {
            Source::Url(url) => {
                return Err(PipelineError::Configuration(format!(
                    "Cannot plan remote source {} synchronously, use stats_only with process",
                    url
                )))
            }
            Source::Path(path) => {
                Arc::from(std::fs::read(path).map_err(|e| PipelineError::source_read(source.friendly_name(), e))?)
            }
            Source::Buffer(bytes) => bytes.clone(),
        };

        let metadata = self.context.codec.probe(&bytes)?;
        ImageTask::new(source, Arc::new(options), self.context.clone()).stats(&metadata, Some(&bytes[..]), true)
    }

    /// Plans the variants of a source whose dimensions are already known.
    pub fn stats_by_dimensions(
        &self,
        source: impl Into<Source>,
        width: u32,
        height: u32,
        options: Options,
    ) -> Result<ResultSet> {
        options.validate()?;
        let source = source.into();
        let contents = match &source {
            Source::Path(path) if self.context.exists.exists(path) => std::fs::read(path).ok(),
            _ => None,
        };

        let metadata = SourceMetadata::from_dimensions(width, height, None);
        ImageTask::new(source, Arc::new(options), self.context.clone()).stats(&metadata, contents.as_deref(), true)
    }

    pub fn cache_stats(&self) -> BuildStats {
        let (memory_hits, memory_misses) = self.memory.counts();
        let (disk_hits, disk_misses) = self.context.disk.counts();
        BuildStats {
            memory_hits,
            memory_misses,
            disk_hits,
            disk_misses,
            exists_lookups: self.context.exists.lookup_count(),
            unique_requests: self.memory.len(),
        }
    }

    /// Clears hit/miss counters; cached entries stay.
    pub fn reset_counts(&self) {
        self.memory.reset_counts();
        self.context.disk.reset_counts();
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Canonical JSON of the options, the hooks and the source identity.
    fn memory_key(&self, source: &Source, options: &Options) -> Result<String> {
        let mut key = serde_json::to_value(options)
            .map_err(|e| PipelineError::Configuration(format!("Cannot serialize options: {}", e)))?;

        if let Value::Object(map) = &mut key {
            map.insert("hooks".to_string(), options.hooks.describe());
            map.insert("__originalSrc".to_string(), Value::from(source.identity()));
            match source {
                Source::Url(url) => {
                    map.insert("sourceUrl".to_string(), Value::from(url.as_str()));
                }
                Source::Buffer(bytes) => {
                    map.insert("__originalSize".to_string(), json!(bytes.len()));
                }
                Source::Path(path) => {
                    // a changed source file gets a new entry
                    let size = std::fs::metadata(path).map(|m| m.len()).ok();
                    map.insert("__originalSize".to_string(), json!(size));
                }
            }
        }

        Ok(canonical_json(&key))
    }
}
