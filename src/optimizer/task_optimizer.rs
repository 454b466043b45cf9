//! # Task Optimizer Module
//!
//! Worker per una singola richiesta (sorgente + opzioni).
//! Separato dall'orchestratore principale: qui vive la macchina a stati
//! `Planned → PerVariantCheck → {CacheHit | Transform} → Collected → Grouped`.
//!
//! ## Responsabilità:
//! - Lettura o fetch della sorgente, probe dei metadati con il codec
//! - Fingerprint della richiesta (calcolato una sola volta)
//! - Per ogni variante pianificata: riuso dell'output su disco oppure
//!   trasformazione (hook `transform`, rotazione, resize, format hook o encode)
//! - Scrittura su disco, oppure buffer in memoria in dry-run
//! - Modalità stats-only: solo pianificazione, nessuna trasformazione
//! - Politica d'errore: propagazione, oppure log + `None` se `fail_on_error` è falso

use crate::cache::{DiskCache, ExistsCache};
use crate::codec::{Codec, Encode, FormatHookInput, Rotation, SourceMetadata, TransformPipeline};
use crate::config::{CompressionReport, Options};
use crate::error::{PipelineError, Result};
use crate::fetch::RemoteFetcher;
use crate::file_manager::{DirectoryManager, FileManager};
use crate::fingerprint::{compute_fingerprint, HashSource};
use crate::format;
use crate::optimizer::assembler::{assemble, ResultSet, Variant};
use crate::optimizer::path_resolver::PathResolver;
use crate::planner;
use crate::source::Source;
use crate::utils::brotli_size;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

/// Services shared by every task of a pipeline
pub(crate) struct TaskContext {
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) fetcher: Option<Arc<dyn RemoteFetcher>>,
    pub(crate) exists: Arc<ExistsCache>,
    pub(crate) disk: DiskCache,
    pub(crate) dirs: DirectoryManager,
}

impl TaskContext {
    pub(crate) fn new(codec: Arc<dyn Codec>, fetcher: Option<Arc<dyn RemoteFetcher>>) -> Self {
        let exists = Arc::new(ExistsCache::new());
        Self {
            codec,
            fetcher,
            disk: DiskCache::new(exists.clone()),
            exists,
            dirs: DirectoryManager::new(),
        }
    }
}

/// Source bytes plus how they were obtained
struct LoadedSource {
    bytes: Arc<[u8]>,
    /// `Some` for remote sources: whether the fetch was a still-valid cache hit
    remote_cache_hit: Option<bool>,
}

/// One image request
pub struct ImageTask {
    source: Source,
    identity: String,
    options: Arc<Options>,
    context: Arc<TaskContext>,
    hash: OnceLock<String>,
    /// Set once this request has recorded its disk-cache hit or miss
    disk_counted: AtomicBool,
}

impl ImageTask {
    pub(crate) fn new(source: Source, options: Arc<Options>, context: Arc<TaskContext>) -> Self {
        Self {
            identity: source.identity(),
            source,
            options,
            context,
            hash: OnceLock::new(),
            disk_counted: AtomicBool::new(false),
        }
    }

    /// Runs the request, applying the failure policy.
    pub async fn run(self) -> Result<Option<Arc<ResultSet>>> {
        let outcome = if self.options.stats_only {
            self.stats_only().await
        } else {
            self.generate().await
        };

        match outcome {
            Ok(results) => Ok(Some(Arc::new(results))),
            Err(e) if self.options.fail_on_error => Err(e),
            Err(e) => {
                error!("Skipping {}: {}", self.source.friendly_name(), e);
                Ok(None)
            }
        }
    }

    async fn generate(&self) -> Result<ResultSet> {
        info!("Processing {}", self.source.friendly_name());

        let loaded = self.load().await?;
        let metadata = {
            let codec = self.context.codec.clone();
            let bytes = loaded.bytes.clone();
            let codec_options = self.options.codec_options.clone();
            tokio::task::spawn_blocking(move || codec.metadata(&bytes, &codec_options)).await??
        };

        let hash = self
            .fingerprint(Some(&loaded.bytes[..]), loaded.remote_cache_hit.unwrap_or(true))
            .to_string();
        let planned = self.describe_plan(&metadata, Some(&hash))?;
        debug!("{} variants planned for {}", planned.len(), self.source.friendly_name());

        let outputs = join_all(
            planned
                .into_iter()
                .map(|stat| self.produce(stat, &loaded, &metadata, &hash)),
        )
        .await;

        let mut variants = Vec::with_capacity(outputs.len());
        for output in outputs {
            if let Some(variant) = output? {
                variants.push(variant);
            }
        }

        Ok(assemble(variants, self.options.svg_short_circuit))
    }

    async fn stats_only(&self) -> Result<ResultSet> {
        if self.source.is_remote() {
            let known = self
                .options
                .remote_image_metadata
                .as_ref()
                .and_then(|meta| Some((meta.width?, meta.height?, meta.format.as_deref())));
            if let Some((width, height, known_format)) = known {
                debug!("Using caller supplied dimensions for {}", self.source.friendly_name());
                let metadata = SourceMetadata::from_dimensions(width, height, known_format.map(format::canonical));
                return self.stats(&metadata, None, true);
            }
        }

        let loaded = self.load().await?;
        let metadata = {
            let codec = self.context.codec.clone();
            let bytes = loaded.bytes.clone();
            tokio::task::spawn_blocking(move || codec.probe(&bytes)).await??
        };
        self.stats(&metadata, Some(&loaded.bytes[..]), loaded.remote_cache_hit.unwrap_or(true))
    }

    /// Plans and describes every variant without producing any output.
    ///
    /// With a `url_format` hook no fingerprint is computed.
    pub(crate) fn stats(&self, metadata: &SourceMetadata, contents: Option<&[u8]>, cache_valid: bool) -> Result<ResultSet> {
        let hash = match self.options.hooks.url_format {
            Some(_) => None,
            None => Some(self.fingerprint(contents, cache_valid)),
        };
        let variants = self.describe_plan(metadata, hash)?;
        Ok(assemble(variants, self.options.svg_short_circuit))
    }

    async fn load(&self) -> Result<LoadedSource> {
        match &self.source {
            Source::Path(path) => {
                let bytes = FileManager::read_file(path)
                    .await
                    .map_err(|e| PipelineError::source_read(self.source.friendly_name(), e))?;
                Ok(LoadedSource {
                    bytes: Arc::from(bytes),
                    remote_cache_hit: None,
                })
            }
            Source::Buffer(bytes) => Ok(LoadedSource {
                bytes: bytes.clone(),
                remote_cache_hit: None,
            }),
            Source::Url(url) => {
                let fetcher = self
                    .context
                    .fetcher
                    .as_ref()
                    .ok_or_else(|| PipelineError::source_read(url.as_str(), "no remote fetcher configured"))?;
                let asset = fetcher
                    .fetch(url, &self.options.cache_options.resolved(self.options.dry_run))
                    .await?;
                debug!(
                    "Fetched {} ({}, cache hit: {})",
                    url,
                    FileManager::format_size(asset.bytes.len() as u64),
                    asset.cache_hit
                );
                Ok(LoadedSource {
                    bytes: Arc::from(asset.bytes),
                    remote_cache_hit: Some(asset.cache_hit),
                })
            }
        }
    }

    /// Fingerprint of this request, computed on first use.
    pub(crate) fn fingerprint(&self, contents: Option<&[u8]>, cache_valid: bool) -> &str {
        self.hash.get_or_init(|| {
            let hashed = match (&self.source, contents) {
                (Source::Buffer(bytes), _) => HashSource::Buffer(&bytes[..]),
                (Source::Url(url), _) => HashSource::Identifier {
                    id: url,
                    remote: true,
                    cache_valid,
                },
                (Source::Path(_), Some(bytes)) => HashSource::Contents(bytes),
                (Source::Path(_), _) => HashSource::Identifier {
                    id: &self.identity,
                    remote: false,
                    cache_valid,
                },
            };
            compute_fingerprint(hashed, &self.options)
        })
    }

    fn describe_plan(&self, metadata: &SourceMetadata, hash: Option<&str>) -> Result<Vec<Variant>> {
        planner::plan(metadata, &self.options)?
            .into_iter()
            .map(|planned| {
                let mut variant = self.describe(&planned.format, planned.width, planned.height, hash)?;
                variant.size = planned.size;
                Ok(variant)
            })
            .collect()
    }

    fn describe(&self, output_format: &str, width: u32, height: u32, hash: Option<&str>) -> Result<Variant> {
        let resolved = PathResolver::resolve(hash, &self.source, width, output_format, &self.options)?;
        let srcset = format!("{} {}w", resolved.url, width);
        Ok(Variant {
            format: output_format.to_string(),
            width,
            height,
            url: resolved.url,
            source_type: format::mime_type(output_format).map(String::from),
            srcset,
            filename: resolved.filename,
            output_path: resolved.output_path,
            size: None,
            buffer: None,
        })
    }

    fn is_output_cached(&self, stat: &Variant, remote_cache_hit: Option<bool>) -> bool {
        if !self.options.use_cache {
            return false;
        }

        match stat.output_path.as_deref() {
            Some(path) => {
                let count = !self.disk_counted.swap(true, Ordering::Relaxed);
                self.context.disk.is_cached(path, count, remote_cache_hit)
            }
            None => false,
        }
    }

    async fn produce(
        &self,
        stat: Variant,
        loaded: &LoadedSource,
        metadata: &SourceMetadata,
        hash: &str,
    ) -> Result<Option<Variant>> {
        if self.is_output_cached(&stat, loaded.remote_cache_hit) {
            return self.reuse(stat).await.map(Some);
        }

        let mut stat = stat;
        let mut pipeline = TransformPipeline::default();
        let mut resized_by_hook = false;

        if let Some(hook) = &self.options.hooks.transform {
            hook(&mut pipeline)?;
            if let Some((width, height)) = pipeline.explicit_dimensions(stat.width, stat.height) {
                debug!("transform hook sets {}x{} for {}", width, height, stat.format);
                let output_format = stat.format.clone();
                stat = self.describe(&output_format, width, height, Some(hash))?;
                resized_by_hook = true;
            }
        }

        if pipeline.rotate.is_none() && (self.options.fix_orientation || metadata.needs_rotation()) {
            pipeline.rotate = Some(Rotation::Auto);
        }

        if !resized_by_hook {
            let upscale_svg = metadata.is_svg() && self.options.svg_allow_upscale;
            let source_width = if metadata.needs_rotation() {
                metadata.height
            } else {
                metadata.width
            };
            if stat.width < source_width || upscale_svg {
                pipeline.resize_to_width(stat.width, !upscale_svg);
            }
        }

        let output = match self.options.hooks.format_hooks.get(&stat.format).cloned() {
            Some(hook) => {
                let input = FormatHookInput {
                    source: loaded.bytes.clone(),
                    source_format: metadata.format.clone(),
                    format: stat.format.clone(),
                    width: stat.width,
                    height: stat.height,
                    pipeline,
                };
                match tokio::task::spawn_blocking(move || hook.render(&input)).await?? {
                    Some(bytes) => bytes,
                    None => {
                        debug!("{} format hook skipped {}", stat.format, stat.url);
                        return Ok(None);
                    }
                }
            }
            None => {
                let encoder_options = self.options.encoder_options_for(&stat.format);
                if !encoder_options.is_empty() || metadata.format.as_deref() != Some(stat.format.as_str()) {
                    pipeline.encode = Some(Encode {
                        format: stat.format.clone(),
                        options: encoder_options,
                    });
                }

                let codec = self.context.codec.clone();
                let bytes = loaded.bytes.clone();
                tokio::task::spawn_blocking(move || codec.transform(&bytes, &pipeline))
                    .await??
                    .bytes
            }
        };

        stat.size = Some(self.reported_size(&stat.format, &output)?);
        self.store(&mut stat, output).await?;
        Ok(Some(stat))
    }

    /// Cache hit: size from disk, contents only when they are needed.
    async fn reuse(&self, mut stat: Variant) -> Result<Variant> {
        let Some(path) = stat.output_path.clone() else {
            return Ok(stat);
        };

        let brotli_svg = stat.format == format::SVG && self.reports_brotli();
        if self.options.dry_run || brotli_svg {
            let contents = FileManager::read_file(&path).await?;
            stat.size = Some(self.reported_size(&stat.format, &contents)?);
            if self.options.dry_run {
                stat.buffer = Some(contents);
            }
        } else {
            stat.size = Some(FileManager::file_size(&path).await?);
        }

        debug!("Reusing {}", path.display());
        Ok(stat)
    }

    async fn store(&self, stat: &mut Variant, bytes: Vec<u8>) -> Result<()> {
        match (&stat.output_path, self.options.dry_run) {
            (Some(path), false) => {
                let written = FileManager::write_file(&self.context.dirs, path, &bytes).await?;
                debug!("Wrote {} ({})", path.display(), FileManager::format_size(written));
            }
            _ => stat.buffer = Some(bytes),
        }
        Ok(())
    }

    fn reports_brotli(&self) -> bool {
        self.options.svg_compression_size == Some(CompressionReport::Brotli)
    }

    fn reported_size(&self, output_format: &str, contents: &[u8]) -> Result<u64> {
        if output_format == format::SVG && self.reports_brotli() {
            return Ok(brotli_size(contents)?);
        }
        Ok(contents.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{MockCodec, RecordedOp};
    use crate::codec::{Crop, FormatHook};
    use crate::config::Width;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SVG_SOURCE: &[u8] = br#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50"><rect width="100" height="50" fill="red"/></svg>"#;

    fn task(source: Source, options: Options, codec: &Arc<MockCodec>) -> ImageTask {
        let context = Arc::new(TaskContext::new(codec.clone(), None));
        ImageTask::new(source, Arc::new(options), context)
    }

    fn write_source(temp_dir: &TempDir) -> PathBuf {
        let path = temp_dir.path().join("photo.jpg");
        std::fs::write(&path, b"fake jpeg bytes").unwrap();
        path
    }

    fn options_in(temp_dir: &TempDir) -> Options {
        Options {
            widths: vec![Width::Px(300), Width::Px(600)],
            formats: vec!["webp".to_string(), "jpeg".to_string()],
            output_dir: temp_dir.path().join("out"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_generates_and_writes_variants() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir);
        let codec = Arc::new(MockCodec::raster(1280, 853, "jpeg"));

        let results = task(Source::Path(source), options_in(&temp_dir), &codec)
            .run()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(results.formats(), vec!["webp", "jpeg"]);
        for variant in results.variants() {
            let path = variant.output_path.as_ref().unwrap();
            assert_eq!(std::fs::metadata(path).unwrap().len(), u64::from(variant.width));
            assert_eq!(variant.size, Some(u64::from(variant.width)));
            assert!(variant.buffer.is_none());
            assert_eq!(variant.srcset, format!("{} {}w", variant.url, variant.width));
        }
        let jpeg = results.get("jpeg").unwrap();
        assert_eq!(jpeg[0].height, 199);
        assert_eq!(jpeg[0].source_type.as_deref(), Some("image/jpeg"));

        // same format and no encoder options: no re-encode step
        let transforms = codec.transforms();
        assert!(transforms.contains(&RecordedOp::Transform {
            resize: Some(300),
            rotate: false,
            format: Some("webp".to_string())
        }));
        assert!(transforms.contains(&RecordedOp::Transform {
            resize: Some(600),
            rotate: false,
            format: None
        }));
    }

    #[tokio::test]
    async fn test_encoder_options_force_encode() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir);
        let codec = Arc::new(MockCodec::raster(1280, 853, "jpeg"));
        let mut options = options_in(&temp_dir);
        options.formats = vec!["jpeg".to_string()];
        options.widths = vec![Width::Px(300)];
        options
            .encoder_options
            .insert("jpeg".to_string(), [("quality".to_string(), serde_json::json!(60))].into());

        task(Source::Path(source), options, &codec).run().await.unwrap();

        assert_eq!(
            codec.transforms(),
            vec![RecordedOp::Transform {
                resize: Some(300),
                rotate: false,
                format: Some("jpeg".to_string())
            }]
        );
    }

    #[tokio::test]
    async fn test_exif_rotation_and_oriented_width() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir);
        let mut metadata = SourceMetadata::from_dimensions(853, 1280, Some("jpeg".to_string()));
        metadata.orientation = Some(6);
        let codec = Arc::new(MockCodec::new(metadata));
        let mut options = options_in(&temp_dir);
        options.formats = vec!["jpeg".to_string()];
        options.widths = vec![Width::Auto];

        let results = task(Source::Path(source), options, &codec).run().await.unwrap().unwrap();

        let jpeg = results.get("jpeg").unwrap();
        assert_eq!((jpeg[0].width, jpeg[0].height), (1280, 853));
        // full width of the rotated image: rotate, no resize
        assert_eq!(
            codec.transforms(),
            vec![RecordedOp::Transform {
                resize: None,
                rotate: true,
                format: None
            }]
        );
    }

    #[tokio::test]
    async fn test_transform_hook_dimensions_rename_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir);
        let codec = Arc::new(MockCodec::raster(1280, 853, "jpeg"));
        let mut options = options_in(&temp_dir);
        options.formats = vec!["webp".to_string()];
        options.widths = vec![Width::Px(600)];
        options.hooks.transform = Some(Arc::new(|pipeline: &mut TransformPipeline| -> Result<()> {
            pipeline.crop = Some(Crop {
                x: 0,
                y: 0,
                width: 64,
                height: 32,
            });
            Ok(())
        }));

        let results = task(Source::Path(source), options, &codec).run().await.unwrap().unwrap();

        let webp = &results.get("webp").unwrap()[0];
        assert_eq!((webp.width, webp.height), (64, 32));
        assert!(webp.filename.as_ref().unwrap().ends_with("-64.webp"));
        assert!(webp.output_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_format_hook_can_drop_variant() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir);
        let codec = Arc::new(MockCodec::raster(1280, 853, "jpeg"));
        let mut options = options_in(&temp_dir);
        let skip_webp: Arc<dyn FormatHook> = Arc::new(|_: &FormatHookInput| -> Result<Option<Vec<u8>>> { Ok(None) });
        options.hooks.format_hooks.insert("webp".to_string(), skip_webp);

        let results = task(Source::Path(source), options, &codec).run().await.unwrap().unwrap();

        assert_eq!(results.formats(), vec!["jpeg"]);
        assert_eq!(codec.transforms().len(), 2);
    }

    #[tokio::test]
    async fn test_svg_passthrough_with_brotli_size() {
        let temp_dir = TempDir::new().unwrap();
        let mut metadata = SourceMetadata::from_dimensions(100, 50, Some("svg".to_string()));
        metadata.has_alpha = true;
        let codec = Arc::new(MockCodec::new(metadata));
        let mut options = options_in(&temp_dir);
        options.formats = vec!["svg".to_string()];
        options.svg_compression_size = Some(CompressionReport::Brotli);

        let results = task(Source::from_bytes(SVG_SOURCE), options, &codec)
            .run()
            .await
            .unwrap()
            .unwrap();

        let svg = &results.get("svg").unwrap()[0];
        assert_eq!(svg.width, 100);
        assert_eq!(svg.size, Some(brotli_size(SVG_SOURCE).unwrap()));
        assert_eq!(std::fs::read(svg.output_path.as_ref().unwrap()).unwrap(), SVG_SOURCE);
        assert!(codec.transforms().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_keeps_buffers() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir);
        let codec = Arc::new(MockCodec::raster(1280, 853, "jpeg"));
        let mut options = options_in(&temp_dir);
        options.dry_run = true;

        let results = task(Source::Path(source), options, &codec).run().await.unwrap().unwrap();

        for variant in results.variants() {
            assert_eq!(variant.buffer.as_ref().unwrap().len(), variant.width as usize);
            assert!(!variant.output_path.as_ref().unwrap().exists());
        }
        assert!(!temp_dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_failure_policy() {
        let temp_dir = TempDir::new().unwrap();
        let missing = Source::Path(temp_dir.path().join("missing.jpg"));
        let codec = Arc::new(MockCodec::raster(1280, 853, "jpeg"));

        let err = task(missing.clone(), options_in(&temp_dir), &codec).run().await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceRead { .. }));

        let mut degraded = options_in(&temp_dir);
        degraded.fail_on_error = false;
        assert!(task(missing, degraded, &codec).run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_codec_failure_degrades() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir);
        let codec = Arc::new(MockCodec::raster(1280, 853, "jpeg").failing());
        let mut options = options_in(&temp_dir);
        options.fail_on_error = false;

        assert!(task(Source::Path(source), options, &codec).run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_without_fetcher_is_a_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let codec = Arc::new(MockCodec::raster(1280, 853, "jpeg"));
        let source = Source::parse("https://example.com/photo.jpg");

        let err = task(source, options_in(&temp_dir), &codec).run().await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceRead { .. }));
    }

    #[test]
    fn test_fingerprint_depends_on_contents() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir);
        let codec = Arc::new(MockCodec::raster(10, 10, "jpeg"));

        let a = task(Source::Path(source.clone()), Options::default(), &codec);
        let b = task(Source::Path(source), Options::default(), &codec);
        let first = a.fingerprint(Some(b"one"), true).to_string();
        // memoised per request
        assert_eq!(a.fingerprint(Some(b"two"), true), first);
        assert_ne!(b.fingerprint(Some(b"two"), true), first);
        assert_eq!(first.len(), 10);
    }

    #[test]
    fn test_fingerprint_hashes_contents_of_late_file() {
        let temp_dir = TempDir::new().unwrap();
        let codec = Arc::new(MockCodec::raster(10, 10, "jpeg"));
        let context = Arc::new(TaskContext::new(codec, None));
        let path = temp_dir.path().join("late.jpg");
        assert!(!context.exists.exists(&path));
        std::fs::write(&path, b"written after the lookup").unwrap();

        let a = ImageTask::new(Source::Path(path.clone()), Arc::new(Options::default()), context.clone());
        let b = ImageTask::new(Source::Path(path), Arc::new(Options::default()), context);
        assert_ne!(a.fingerprint(Some(b"one"), true), b.fingerprint(Some(b"two"), true));
    }
}
