//! # Configuration Management Module
//!
//! Questo modulo gestisce le opzioni di una richiesta di derivazione immagini.
//!
//! ## Responsabilità:
//! - Definisce la struct `Options` con tutti i parametri della pipeline
//! - Fornisce validazione dei parametri prima di accodare lavoro
//! - Supporta caricamento/salvataggio da/verso file JSON
//! - Supporta override parziali in JSON (deep merge) sopra i default di processo
//! - Porta gli hook forniti dal chiamante (non serializzati)
//!
//! ## Parametri principali:
//! - `widths`: larghezze richieste (`null`/`"auto"` = larghezza originale, default: `[auto]`)
//! - `formats`: formati di output (`"auto"` = formato sorgente, default: `["webp", "jpeg"]`)
//! - `format_filtering`: filtri per sorgenti trasparenti/animate (default: entrambi)
//! - `concurrency`: dimensione della coda (default: CPU clamp 8..=16)
//! - `url_path` / `output_dir`: prefisso URL e directory di output (default: `/img/`, `img/`)
//! - `svg_short_circuit`: `false` / `true` / `"size"` (default: `false`)
//! - `hash_length`: lunghezza del fingerprint (default: 10)
//! - `minimum_threshold`: soglia per includere la larghezza originale (default: 1.25)
//! - `dry_run` / `stats_only` / `use_cache` / `fail_on_error`
//!
//! ## Esempio:
//! ```rust,ignore
//! let options = Options {
//!     widths: vec![Width::Px(300), Width::Px(600)],
//!     formats: vec!["avif".into(), "jpeg".into()],
//!     ..Default::default()
//! };
//! options.validate()?;
//!
//! let tuned = options.with_overrides(json!({"encoder_options": {"avif": {"quality": 50}}}))?;
//! ```

use crate::codec::{FormatHook, SvgPassthrough, TransformPipeline};
use crate::error::{PipelineError, Result};
use crate::fetch::FetchOptions;
use crate::optimizer::path_resolver::{FilenameRequest, UrlRequest};
use crate::utils::merge_json;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A requested output width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// The source's own width
    Auto,
    Px(u32),
}

impl Width {
    /// Parses `"400"`, `"400px"`, `"auto"` and `""`, keeping only the leading integer.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Width::Auto);
        }

        let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
        let px: u32 = digits
            .parse()
            .map_err(|_| PipelineError::Configuration(format!("Invalid width: {:?}", text)))?;
        Ok(Width::from(px))
    }

    pub fn resolve(self, original: u32) -> u32 {
        match self {
            Width::Auto => original,
            Width::Px(px) => px,
        }
    }
}

impl From<u32> for Width {
    /// Zero means "no explicit width".
    fn from(px: u32) -> Self {
        if px == 0 {
            Width::Auto
        } else {
            Width::Px(px)
        }
    }
}

impl Serialize for Width {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Width::Auto => serializer.serialize_none(),
            Width::Px(px) => serializer.serialize_u32(*px),
        }
    }
}

impl<'de> Deserialize<'de> for Width {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error;

        match Value::deserialize(deserializer)? {
            Value::Null | Value::Bool(false) => Ok(Width::Auto),
            Value::Number(n) => {
                let px = n
                    .as_f64()
                    .filter(|px| *px >= 0.0 && *px <= u32::MAX as f64)
                    .ok_or_else(|| D::Error::custom(format!("invalid width {}", n)))?;
                Ok(Width::from(px.trunc() as u32))
            }
            Value::String(text) => Width::parse(&text).map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("invalid width {}", other))),
        }
    }
}

/// Output narrowing applied for special sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFilter {
    Transparent,
    Animated,
}

/// SVG short-circuit policy (`false`, `true` or `"size"` in JSON)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ShortCircuitRepr", into = "ShortCircuitRepr")]
pub enum SvgShortCircuit {
    #[default]
    Off,
    /// Only the SVG output is produced
    Always,
    /// Raster outputs larger than the SVG are replaced by it
    Size,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ShortCircuitRepr {
    Flag(bool),
    Mode(String),
}

impl TryFrom<ShortCircuitRepr> for SvgShortCircuit {
    type Error = String;

    fn try_from(repr: ShortCircuitRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ShortCircuitRepr::Flag(false) => Ok(SvgShortCircuit::Off),
            ShortCircuitRepr::Flag(true) => Ok(SvgShortCircuit::Always),
            ShortCircuitRepr::Mode(mode) if mode == "size" => Ok(SvgShortCircuit::Size),
            ShortCircuitRepr::Mode(mode) => Err(format!("unknown svg short-circuit mode: {}", mode)),
        }
    }
}

impl From<SvgShortCircuit> for ShortCircuitRepr {
    fn from(mode: SvgShortCircuit) -> Self {
        match mode {
            SvgShortCircuit::Off => ShortCircuitRepr::Flag(false),
            SvgShortCircuit::Always => ShortCircuitRepr::Flag(true),
            SvgShortCircuit::Size => ShortCircuitRepr::Mode("size".to_string()),
        }
    }
}

/// How the size of SVG outputs is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionReport {
    #[serde(rename = "br")]
    Brotli,
}

/// Known dimensions of a remote image, used in stats-only mode to skip the fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteImageMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Only needed with `"auto"` formats
    pub format: Option<String>,
}

pub type FilenameHook = Arc<dyn Fn(&FilenameRequest<'_>) -> Option<String> + Send + Sync>;
pub type UrlHook = Arc<dyn Fn(&UrlRequest<'_>) -> String + Send + Sync>;
pub type TransformHook = Arc<dyn Fn(&mut TransformPipeline) -> Result<()> + Send + Sync>;

/// Caller supplied callbacks
#[derive(Clone)]
pub struct Hooks {
    /// Custom output filename; `None` or an empty string falls back to `{hash}-{width}.{format}`
    pub filename_format: Option<FilenameHook>,
    /// Custom URL; when set no file name or output path is produced
    pub url_format: Option<UrlHook>,
    /// Runs on the transform pipeline before the planned resize
    pub transform: Option<TransformHook>,
    /// Per-format renderers that bypass the codec encoder
    pub format_hooks: BTreeMap<String, Arc<dyn FormatHook>>,
}

impl Default for Hooks {
    fn default() -> Self {
        let mut format_hooks: BTreeMap<String, Arc<dyn FormatHook>> = BTreeMap::new();
        format_hooks.insert(crate::format::SVG.to_string(), Arc::new(SvgPassthrough));
        Self {
            filename_format: None,
            url_format: None,
            transform: None,
            format_hooks,
        }
    }
}

impl Hooks {
    /// Placeholder description used in the in-memory cache key.
    pub(crate) fn describe(&self) -> Value {
        let marker = |present: bool| if present { Value::from("<fn>") } else { Value::Null };
        serde_json::json!({
            "filename_format": marker(self.filename_format.is_some()),
            "url_format": marker(self.url_format.is_some()),
            "transform": marker(self.transform.is_some()),
            "format_hooks": self.format_hooks.keys().collect::<Vec<_>>(),
        })
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("filename_format", &self.filename_format.is_some())
            .field("url_format", &self.url_format.is_some())
            .field("transform", &self.transform.is_some())
            .field("format_hooks", &self.format_hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Options for one image request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub widths: Vec<Width>,
    /// `"auto"` (or empty) keeps the source format
    pub formats: Vec<String>,
    pub format_filtering: Vec<FormatFilter>,
    /// Size of the processing queue
    pub concurrency: usize,
    /// URL prefix, either a path or an absolute `http(s)` URL
    pub url_path: String,
    pub output_dir: PathBuf,
    pub svg_short_circuit: SvgShortCircuit,
    pub svg_allow_upscale: bool,
    pub svg_compression_size: Option<CompressionReport>,
    /// Decoder parameters, e.g. `{"animated": true}`
    pub codec_options: BTreeMap<String, Value>,
    /// Encoder parameter blocks keyed by canonical format name
    pub encoder_options: BTreeMap<String, BTreeMap<String, Value>>,
    pub cache_options: FetchOptions,
    pub use_cache: bool,
    /// Keep outputs in memory, never write
    pub dry_run: bool,
    /// Plan only, no transform
    pub stats_only: bool,
    pub remote_image_metadata: Option<RemoteImageMetadata>,
    pub hash_length: usize,
    /// Always bake the EXIF orientation in
    pub fix_orientation: bool,
    pub minimum_threshold: f64,
    /// `false` logs failures and resolves to no result
    pub fail_on_error: bool,
    /// Used when the codec cannot name the input format
    pub override_input_format: Option<String>,
    #[serde(skip)]
    pub hooks: Hooks,
}

/// Default queue size: available parallelism clamped to 8..=16.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(8, 16)
}

impl Default for Options {
    fn default() -> Self {
        Self {
            widths: vec![Width::Auto],
            formats: vec!["webp".to_string(), "jpeg".to_string()],
            format_filtering: vec![FormatFilter::Transparent, FormatFilter::Animated],
            concurrency: default_concurrency(),
            url_path: "/img/".to_string(),
            output_dir: PathBuf::from("img/"),
            svg_short_circuit: SvgShortCircuit::Off,
            svg_allow_upscale: true,
            svg_compression_size: None,
            codec_options: BTreeMap::new(),
            encoder_options: BTreeMap::new(),
            cache_options: FetchOptions::default(),
            use_cache: true,
            dry_run: false,
            stats_only: false,
            remote_image_metadata: None,
            hash_length: 10,
            fix_orientation: false,
            minimum_threshold: 1.25,
            fail_on_error: true,
            override_input_format: None,
            hooks: Hooks::default(),
        }
    }
}

impl Options {
    /// Validate option values before any work is queued
    pub fn validate(&self) -> Result<()> {
        if self.widths.is_empty() {
            return Err(PipelineError::Configuration("At least one width is required".to_string()));
        }

        if self.formats.is_empty() {
            return Err(PipelineError::Configuration("At least one format is required".to_string()));
        }

        if self.concurrency == 0 {
            return Err(PipelineError::Configuration(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        // 43 characters encode the full SHA-256 digest
        if self.hash_length == 0 || self.hash_length > 43 {
            return Err(PipelineError::Configuration(
                "Hash length must be between 1 and 43".to_string(),
            ));
        }

        if !self.minimum_threshold.is_finite() || self.minimum_threshold <= 0.0 {
            return Err(PipelineError::Configuration(
                "Minimum threshold must be a positive number".to_string(),
            ));
        }

        self.cache_options.max_age()?;

        Ok(())
    }

    /// Codec decoder flag, `false` when absent.
    pub fn codec_flag(&self, name: &str) -> bool {
        self.codec_options
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Encoder parameters for a canonical format, empty when none are configured.
    pub fn encoder_options_for(&self, format: &str) -> BTreeMap<String, Value> {
        self.encoder_options.get(format).cloned().unwrap_or_default()
    }

    /// Deep-merges a partial JSON object over these options. Hooks are kept.
    pub fn with_overrides(&self, overrides: Value) -> Result<Self> {
        let mut merged = serde_json::to_value(self)
            .map_err(|e| PipelineError::Configuration(format!("Cannot serialize options: {}", e)))?;
        merge_json(&mut merged, overrides);

        let mut options: Options = serde_json::from_value(merged)
            .map_err(|e| PipelineError::Configuration(format!("Invalid option override: {}", e)))?;
        options.hooks = self.hooks.clone();
        Ok(options)
    }

    /// Load options from a JSON file, defaults when the file does not exist
    pub async fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let options: Options = serde_json::from_str(&content)?;
        options.validate()?;
        Ok(options)
    }

    /// Save options to a JSON file
    pub async fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
