//! # Image Crate Codec
//!
//! Implementazione del `Codec` basata sul crate `image`.
//!
//! ## Mappa delle operazioni:
//! | Operazione | Crate / funzione |
//! |---|---|
//! | Probe header | `ImageReader::with_guessed_format` + `into_dimensions` |
//! | Probe completo | `ImageDecoder::{color_type, orientation}`, conteggio frame GIF/WebP |
//! | Rotate | `DynamicImage::apply_orientation` / `rotate90..270` |
//! | Resize | `DynamicImage::resize_exact` con filtro `Lanczos3` |
//! | Encode JPEG/AVIF | `JpegEncoder::new_with_quality`, `AvifEncoder::new_with_speed_quality` |
//! | Encode WebP | `WebPEncoder::new_lossless` (l'encoder puro Rust è solo lossless) |
//! | SVG | `usvg::Tree::from_data` per le dimensioni, `resvg::render` su `tiny_skia::Pixmap` |

use crate::codec::{Codec, CodecOptions, EncodedImage, Rotation, SourceMetadata, TransformPipeline};
use crate::error::{PipelineError, Result};
use crate::format;
use image::codecs::avif::AvifEncoder;
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::{WebPDecoder, WebPEncoder};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbaImage};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::debug;

const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_AVIF_QUALITY: u8 = 50;
const DEFAULT_AVIF_SPEED: u8 = 6;

/// Pure Rust codec on top of the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCrateCodec {
    pub fn new() -> Self {
        Self
    }
}

/// True when the bytes look like SVG/XML text.
pub fn looks_like_svg(bytes: &[u8]) -> bool {
    let trimmed = bytes.trim_ascii_start();
    trimmed.starts_with(b"<svg") || trimmed.starts_with(b"<?xml")
}

fn parse_svg(bytes: &[u8]) -> Result<usvg::Tree> {
    usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|e| PipelineError::Codec(format!("Invalid SVG: {}", e)))
}

/// Intrinsic size, from `width`/`height` or the `viewBox`.
fn svg_dimensions(tree: &usvg::Tree) -> (u32, u32) {
    let size = tree.size();
    (size.width().round() as u32, size.height().round() as u32)
}

/// Size the SVG is drawn at. When nothing rotates or crops the canvas, the
/// requested resize happens here so vectors are not resampled afterwards.
fn svg_render_size(native: (u32, u32), pipeline: &TransformPipeline) -> (u32, u32) {
    let (native_w, native_h) = (native.0.max(1), native.1.max(1));
    let quarter_turn = matches!(pipeline.rotate, Some(Rotation::Degrees(d)) if d % 180 != 0);
    let Some(resize) = pipeline.resize.filter(|_| pipeline.crop.is_none() && !quarter_turn) else {
        return (native_w, native_h);
    };

    let target = match (resize.width, resize.height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, crate::codec::aspect_height(native_w, native_h, w)),
        (None, Some(h)) => (crate::codec::aspect_width(native_w, native_h, h), h),
        (None, None) => return (native_w, native_h),
    };
    let enlarges = target.0 > native_w || target.1 > native_h;
    if target.0 == 0 || target.1 == 0 || (resize.without_enlargement && enlarges) {
        return (native_w, native_h);
    }
    target
}

fn rasterise_svg(bytes: &[u8], pipeline: &TransformPipeline) -> Result<DynamicImage> {
    let tree = parse_svg(bytes)?;
    let size = tree.size();
    let (width, height) = svg_render_size(svg_dimensions(&tree), pipeline);

    let mut pixmap = tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| PipelineError::Codec(format!("Invalid SVG canvas size {}x{}", width, height)))?;
    let transform = tiny_skia::Transform::from_scale(width as f32 / size.width(), height as f32 / size.height());
    resvg::render(&tree, transform, &mut pixmap.as_mut());
    debug!("Rendered SVG at {}x{}", width, height);

    // tiny-skia stores premultiplied alpha
    let pixels = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let color = pixel.demultiply();
            [color.red(), color.green(), color.blue(), color.alpha()]
        })
        .collect();
    let image = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| PipelineError::Codec("Rendered SVG buffer has the wrong size".to_string()))?;
    Ok(DynamicImage::from(image))
}

fn svg_metadata(bytes: &[u8]) -> Result<SourceMetadata> {
    let (width, height) = svg_dimensions(&parse_svg(bytes)?);
    Ok(SourceMetadata {
        width,
        height,
        format: Some(format::SVG.to_string()),
        has_alpha: true,
        size: Some(bytes.len() as u64),
        ..Default::default()
    })
}

fn format_name(image_format: ImageFormat) -> Option<String> {
    image_format
        .extensions_str()
        .first()
        .map(|ext| format::canonical(ext))
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>> {
    Ok(ImageReader::new(Cursor::new(bytes)).with_guessed_format()?)
}

fn exif_value(orientation: Orientation) -> u8 {
    match orientation {
        Orientation::NoTransforms => 1,
        Orientation::FlipHorizontal => 2,
        Orientation::Rotate180 => 3,
        Orientation::FlipVertical => 4,
        Orientation::Rotate90FlipH => 5,
        Orientation::Rotate90 => 6,
        Orientation::Rotate270FlipH => 7,
        Orientation::Rotate270 => 8,
    }
}

fn count_frames(bytes: &[u8], image_format: ImageFormat) -> Result<Option<u32>> {
    let frames = match image_format {
        ImageFormat::Gif => GifDecoder::new(Cursor::new(bytes))?.into_frames().count(),
        ImageFormat::WebP => {
            let decoder = WebPDecoder::new(Cursor::new(bytes))?;
            if !decoder.has_animation() {
                return Ok(Some(1));
            }
            decoder.into_frames().count()
        }
        _ => return Ok(None),
    };
    Ok(Some(frames as u32))
}

fn quality(options: &BTreeMap<String, Value>, default: u8) -> u8 {
    options
        .get("quality")
        .and_then(Value::as_u64)
        .map(|q| q.clamp(1, 100) as u8)
        .unwrap_or(default)
}

fn encode(img: &DynamicImage, target: &str, options: &BTreeMap<String, Value>) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match target {
        "jpeg" => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality(options, DEFAULT_JPEG_QUALITY));
            DynamicImage::from(img.to_rgb8()).write_with_encoder(encoder)?;
        }
        "png" => {
            img.write_with_encoder(PngEncoder::new(&mut buffer))?;
        }
        "webp" => {
            let encoder = WebPEncoder::new_lossless(&mut buffer);
            if img.color().has_alpha() {
                DynamicImage::from(img.to_rgba8()).write_with_encoder(encoder)?;
            } else {
                DynamicImage::from(img.to_rgb8()).write_with_encoder(encoder)?;
            }
        }
        "avif" => {
            let speed = options
                .get("speed")
                .and_then(Value::as_u64)
                .map(|s| s.clamp(1, 10) as u8)
                .unwrap_or(DEFAULT_AVIF_SPEED);
            let encoder = AvifEncoder::new_with_speed_quality(&mut buffer, speed, quality(options, DEFAULT_AVIF_QUALITY));
            img.write_with_encoder(encoder)?;
        }
        other => {
            let image_format = ImageFormat::from_extension(other)
                .filter(|f| f.writing_enabled())
                .ok_or_else(|| PipelineError::Codec(format!("Unsupported output format: {}", other)))?;
            let mut cursor = Cursor::new(&mut buffer);
            img.write_to(&mut cursor, image_format)?;
        }
    }
    Ok(buffer)
}

impl Codec for ImageCrateCodec {
    fn probe(&self, bytes: &[u8]) -> Result<SourceMetadata> {
        if looks_like_svg(bytes) {
            return svg_metadata(bytes);
        }

        let reader = reader(bytes)?;
        let detected = reader.format();
        let (width, height) = reader.into_dimensions()?;

        Ok(SourceMetadata {
            width,
            height,
            format: detected.and_then(format_name),
            size: Some(bytes.len() as u64),
            ..Default::default()
        })
    }

    fn metadata(&self, bytes: &[u8], options: &CodecOptions) -> Result<SourceMetadata> {
        if looks_like_svg(bytes) {
            return svg_metadata(bytes);
        }

        let reader = reader(bytes)?;
        let detected = reader.format();
        let mut decoder = reader.into_decoder()?;
        let (width, height) = decoder.dimensions();
        let has_alpha = decoder.color_type().has_alpha();
        let orientation = decoder.orientation()?;

        let animated = options.get("animated").and_then(Value::as_bool).unwrap_or(false);
        let pages = match detected {
            Some(image_format) if animated => count_frames(bytes, image_format)?,
            _ => None,
        };

        Ok(SourceMetadata {
            width,
            height,
            format: detected.and_then(format_name),
            orientation: Some(exif_value(orientation)),
            has_alpha,
            pages,
            // frames are decoded one at a time, so height is already per frame
            page_height: None,
            size: Some(bytes.len() as u64),
        })
    }

    fn transform(&self, bytes: &[u8], pipeline: &TransformPipeline) -> Result<EncodedImage> {
        let (mut img, source_format, orientation) = if looks_like_svg(bytes) {
            (rasterise_svg(bytes, pipeline)?, Some(format::SVG.to_string()), Orientation::NoTransforms)
        } else {
            let reader = reader(bytes)?;
            let source_format = reader.format().and_then(format_name);
            let mut decoder = reader.into_decoder()?;
            let orientation = decoder.orientation()?;
            (DynamicImage::from_decoder(decoder)?, source_format, orientation)
        };

        match pipeline.rotate {
            Some(Rotation::Auto) => img.apply_orientation(orientation),
            Some(Rotation::Degrees(degrees)) => {
                img = match degrees % 360 {
                    0 => img,
                    90 => img.rotate90(),
                    180 => img.rotate180(),
                    270 => img.rotate270(),
                    other => {
                        return Err(PipelineError::Codec(format!(
                            "Rotation must be a multiple of 90 degrees, got {}",
                            other
                        )))
                    }
                }
            }
            None => {}
        }

        if let Some(crop) = pipeline.crop {
            img = img.crop_imm(crop.x, crop.y, crop.width, crop.height);
        }

        if let Some(resize) = pipeline.resize {
            let (current_w, current_h) = (img.width(), img.height());
            let target = match (resize.width, resize.height) {
                (Some(w), Some(h)) => Some((w, h)),
                (Some(w), None) => Some((w, crate::codec::aspect_height(current_w, current_h, w))),
                (None, Some(h)) => Some((crate::codec::aspect_width(current_w, current_h, h), h)),
                (None, None) => None,
            };

            if let Some((w, h)) = target {
                let enlarges = w > current_w || h > current_h;
                if (w, h) == (current_w, current_h) {
                    debug!("Already at {}x{}", w, h);
                } else if w > 0 && h > 0 && !(resize.without_enlargement && enlarges) {
                    img = img.resize_exact(w, h, FilterType::Lanczos3);
                } else {
                    debug!("Skipping resize to {}x{} of a {}x{} image", w, h, current_w, current_h);
                }
            }
        }

        let (target, options) = match &pipeline.encode {
            Some(encode) => (encode.format.clone(), encode.options.clone()),
            None => (
                source_format
                    .filter(|name| name != format::SVG)
                    .ok_or_else(|| PipelineError::Codec("Unknown source format".to_string()))?,
                BTreeMap::new(),
            ),
        };

        let bytes = encode(&img, &target, &options)?;
        Ok(EncodedImage {
            bytes,
            format: target,
            width: img.width(),
            height: img.height(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Crop, Encode};
    use image::{ImageEncoder, RgbImage, RgbaImage};

    fn png_bytes(width: u32, height: u32, alpha: bool) -> Vec<u8> {
        let mut buffer = Vec::new();
        if alpha {
            let img = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 128]));
            PngEncoder::new(&mut buffer)
                .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
                .unwrap();
        } else {
            let img = RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
            PngEncoder::new(&mut buffer)
                .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
                .unwrap();
        }
        buffer
    }

    #[test]
    fn test_probe_png() {
        let metadata = ImageCrateCodec.probe(&png_bytes(64, 48, false)).unwrap();
        assert_eq!((metadata.width, metadata.height), (64, 48));
        assert_eq!(metadata.format.as_deref(), Some("png"));
    }

    #[test]
    fn test_full_metadata_reports_alpha() {
        let metadata = ImageCrateCodec
            .metadata(&png_bytes(8, 8, true), &CodecOptions::new())
            .unwrap();
        assert!(metadata.has_alpha);
        assert_eq!(metadata.orientation, Some(1));
        assert_eq!(metadata.pages, None);
    }

    const RED_SQUARE: &[u8] = br##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><rect width="40" height="20" fill="#ff0000"/></svg>"##;

    #[test]
    fn test_svg_dimensions() {
        let svg = br#"<?xml version="1.0"?>
<svg xmlns="http://www.w3.org/2000/svg" width="200px" height="100" stroke-width="3"></svg>"#;
        let metadata = ImageCrateCodec.probe(svg).unwrap();
        assert_eq!((metadata.width, metadata.height), (200, 100));
        assert!(metadata.is_svg());
        assert_eq!(metadata.size, Some(svg.len() as u64));

        let view_box = br#"<svg viewBox="0 0 300 150" xmlns="http://www.w3.org/2000/svg"/>"#;
        assert_eq!(svg_dimensions(&parse_svg(view_box).unwrap()), (300, 150));

        let half = br#"<svg width="600" viewBox="0 0 300 150" xmlns="http://www.w3.org/2000/svg"/>"#;
        assert_eq!(svg_dimensions(&parse_svg(half).unwrap()), (600, 300));

        assert!(ImageCrateCodec.probe(b"<svg").is_err());
    }

    #[test]
    fn test_svg_rasterised_at_requested_width() {
        let mut pipeline = TransformPipeline::default();
        pipeline.resize_to_width(80, false);
        pipeline.encode = Some(Encode {
            format: "png".to_string(),
            options: BTreeMap::new(),
        });

        let encoded = ImageCrateCodec.transform(RED_SQUARE, &pipeline).unwrap();
        assert_eq!((encoded.width, encoded.height), (80, 40));
        assert_eq!(encoded.format, "png");

        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (80, 40));
        assert_eq!(decoded.get_pixel(40, 20), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_svg_respects_without_enlargement() {
        let mut pipeline = TransformPipeline::default();
        pipeline.resize_to_width(80, true);
        pipeline.encode = Some(Encode {
            format: "jpeg".to_string(),
            options: BTreeMap::new(),
        });
        let encoded = ImageCrateCodec.transform(RED_SQUARE, &pipeline).unwrap();
        assert_eq!((encoded.width, encoded.height), (40, 20));

        pipeline.resize_to_width(10, true);
        let encoded = ImageCrateCodec.transform(RED_SQUARE, &pipeline).unwrap();
        assert_eq!((encoded.width, encoded.height), (10, 5));
        assert_eq!(ImageCrateCodec.probe(&encoded.bytes).unwrap().format.as_deref(), Some("jpeg"));
    }

    #[test]
    fn test_transform_resize_and_encode() {
        let source = png_bytes(100, 50, false);
        let mut pipeline = TransformPipeline::default();
        pipeline.resize_to_width(40, true);
        pipeline.encode = Some(Encode {
            format: "jpeg".to_string(),
            options: BTreeMap::new(),
        });

        let encoded = ImageCrateCodec.transform(&source, &pipeline).unwrap();
        assert_eq!((encoded.width, encoded.height), (40, 20));
        assert_eq!(encoded.format, "jpeg");
        assert_eq!(ImageCrateCodec.probe(&encoded.bytes).unwrap().format.as_deref(), Some("jpeg"));
    }

    #[test]
    fn test_transform_without_enlargement() {
        let source = png_bytes(30, 30, false);
        let mut pipeline = TransformPipeline::default();
        pipeline.resize_to_width(60, true);
        let encoded = ImageCrateCodec.transform(&source, &pipeline).unwrap();
        assert_eq!((encoded.width, encoded.height), (30, 30));
        assert_eq!(encoded.format, "png");
    }

    #[test]
    fn test_transform_crop_and_webp() {
        let source = png_bytes(20, 20, true);
        let pipeline = TransformPipeline {
            crop: Some(Crop { x: 5, y: 5, width: 10, height: 8 }),
            encode: Some(Encode {
                format: "webp".to_string(),
                options: BTreeMap::new(),
            }),
            ..Default::default()
        };
        let encoded = ImageCrateCodec.transform(&source, &pipeline).unwrap();
        assert_eq!((encoded.width, encoded.height), (10, 8));
        assert_eq!(ImageCrateCodec.probe(&encoded.bytes).unwrap().format.as_deref(), Some("webp"));
    }

    #[test]
    fn test_svg_needs_an_encode_target() {
        let err = ImageCrateCodec
            .transform(RED_SQUARE, &TransformPipeline::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Codec(_)));
    }
}
