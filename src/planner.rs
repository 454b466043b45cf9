//! # Variant Planner
//!
//! Calcolo puro e deterministico delle varianti di output a partire dai
//! metadati della sorgente e dalle opzioni.
//!
//! ## Responsabilità:
//! - Risoluzione della lista formati (`auto`, alias, SVG in testa, dedup)
//! - Filtri per sorgenti animate e con trasparenza
//! - Correzione dimensioni per orientamento EXIF e `page_height`
//! - Risoluzione delle larghezze valide (`resolve_widths`) senza upscale
//!
//! ## Algoritmo larghezze:
//! Senza upscale le larghezze maggiori dell'originale vengono sostituite
//! dall'originale solo se la larghezza precedente non era già "abbastanza
//! grande" (`original > floor(prev × threshold)`), altrimenti scartate.
//!
//! ## Esempio:
//! ```rust,ignore
//! assert_eq!(resolve_widths(1280, &[Width::Px(1200), Width::Px(1300)], false, 1.25), vec![1200]);
//! ```

use crate::codec::{aspect_height, SourceMetadata};
use crate::config::{FormatFilter, Options, SvgShortCircuit, Width};
use crate::error::{PipelineError, Result};
use crate::format::{self, ANIMATED_FORMATS, MINIMUM_TRANSPARENCY_FORMATS, TRANSPARENCY_FORMATS};
use tracing::debug;

/// One output the request will produce, before paths are assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedVariant {
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Known up front only for SVG passthrough
    pub size: Option<u64>,
}

/// Valid output widths, ascending and unique.
pub fn resolve_widths(original: u32, widths: &[Width], allow_upscale: bool, threshold: f64) -> Vec<u32> {
    let mut valid: Vec<u32> = widths
        .iter()
        .map(|width| match width {
            Width::Px(0) => original,
            other => other.resolve(original),
        })
        .collect();

    if !allow_upscale {
        valid.sort_unstable();
        let mut last_width_was_big_enough = true;
        valid = valid
            .into_iter()
            .filter_map(|width| {
                if width > original {
                    return last_width_was_big_enough.then_some(original);
                }
                last_width_was_big_enough = f64::from(original) > (f64::from(width) * threshold).floor();
                Some(width)
            })
            .collect();
    }

    valid.retain(|width| *width > 0);
    if valid.is_empty() {
        // zero-width source
        valid.push(original.max(1));
    }
    valid.sort_unstable();
    valid.dedup();
    valid
}

/// Resolves the requested format list for a source.
///
/// `auto` becomes `auto_format` (when known), aliases are applied, `svg` is
/// hoisted to the front unless short-circuiting by size, then the animated
/// and transparency filters narrow the list when they can, and duplicates are
/// removed keeping the first occurrence.
pub fn resolve_formats(
    formats: &[String],
    auto_format: Option<&str>,
    short_circuit: SvgShortCircuit,
    animated: bool,
    has_alpha: bool,
) -> Vec<String> {
    let mut resolved: Vec<String> = formats
        .iter()
        .map(|requested| match auto_format {
            Some(auto) if format::is_auto(requested) => format::canonical(auto),
            _ if format::is_auto(requested) => format::AUTO.to_string(),
            _ => format::canonical(requested),
        })
        .collect();

    if short_circuit != SvgShortCircuit::Size {
        // stable: only svg moves
        resolved.sort_by_key(|f| f != format::SVG);
    }

    if animated {
        let animated_formats: Vec<String> = resolved
            .iter()
            .filter(|f| ANIMATED_FORMATS.contains(&f.as_str()))
            .cloned()
            .collect();
        if animated_formats.is_empty() {
            debug!("No animated output format requested, keeping {:?}", resolved);
        } else {
            debug!("Filtering non-animated formats: {:?} -> {:?}", resolved, animated_formats);
            resolved = animated_formats;
        }
    }

    if has_alpha {
        let has_minimum = resolved
            .iter()
            .any(|f| MINIMUM_TRANSPARENCY_FORMATS.contains(&f.as_str()));
        if has_minimum {
            let transparent: Vec<String> = resolved
                .iter()
                .filter(|f| TRANSPARENCY_FORMATS.contains(&f.as_str()))
                .cloned()
                .collect();
            debug!("Filtering formats without transparency: {:?} -> {:?}", resolved, transparent);
            resolved = transparent;
        } else {
            debug!(
                "Source has alpha but none of {:?} was requested, keeping {:?}",
                MINIMUM_TRANSPARENCY_FORMATS, resolved
            );
        }
    }

    let mut seen = Vec::with_capacity(resolved.len());
    for f in resolved {
        if !seen.contains(&f) {
            seen.push(f);
        }
    }
    seen
}

/// Entry format of a source: what the codec found, else the caller override.
pub fn entry_format(metadata: &SourceMetadata, options: &Options) -> Option<String> {
    metadata
        .format
        .clone()
        .or_else(|| options.override_input_format.as_deref().map(format::canonical))
}

/// Animated sources only count when decoding with `animated` and the entry
/// format can animate; an unknown frame count is a best guess of "yes".
pub fn is_animated(metadata: &SourceMetadata, entry: Option<&str>, options: &Options) -> bool {
    if !options.codec_flag("animated") {
        return false;
    }

    if !entry.is_some_and(format::is_animated_format) {
        return false;
    }

    match metadata.pages {
        Some(pages) => pages > 1,
        None => true,
    }
}

/// Plans every output variant for a source.
pub fn plan(metadata: &SourceMetadata, options: &Options) -> Result<Vec<PlannedVariant>> {
    let entry = entry_format(metadata, options);
    let animated = is_animated(metadata, entry.as_deref(), options)
        && options.format_filtering.contains(&FormatFilter::Animated);
    let has_alpha = metadata.has_alpha && options.format_filtering.contains(&FormatFilter::Transparent);

    let formats = resolve_formats(
        &options.formats,
        entry.as_deref(),
        options.svg_short_circuit,
        animated,
        has_alpha,
    );

    let (mut width, mut height) = (metadata.width, metadata.height);
    if metadata.needs_rotation() {
        std::mem::swap(&mut width, &mut height);
    }
    if let Some(page_height) = metadata.page_height {
        height = page_height;
    }

    let source_is_svg = entry.as_deref() == Some(format::SVG);
    let mut planned = Vec::new();

    for output in formats {
        if format::is_auto(&output) {
            return Err(PipelineError::Configuration(
                "Cannot resolve `auto` output format: the source format is unknown, list explicit formats".to_string(),
            ));
        }

        if output == format::SVG {
            if !source_is_svg {
                debug!("Skipping svg output for a raster source");
                continue;
            }

            planned.push(PlannedVariant {
                format: output,
                width,
                height,
                size: metadata.size,
            });

            if options.svg_short_circuit == SvgShortCircuit::Always {
                break;
            }
            continue;
        }

        let allow_upscale = source_is_svg && options.svg_allow_upscale;
        for w in resolve_widths(width, &options.widths, allow_upscale, options.minimum_threshold) {
            planned.push(PlannedVariant {
                format: output.clone(),
                width: w,
                height: aspect_height(width, height, w),
                size: None,
            });
        }
    }

    Ok(planned)
}
