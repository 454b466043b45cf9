//! # Codec Module
//!
//! Contratto verso il servizio di decodifica/trasformazione/codifica pixel.
//!
//! ## Responsabilità:
//! - `Codec`: probe dei metadati (header o completo) e pipeline di trasformazione
//! - `TransformPipeline`: rotate, crop, resize, encode, descritti come dati
//!   (l'hook `transform` del chiamante può modificarli prima dell'esecuzione)
//! - `FormatHook`: renderer per formato che scavalca l'encoder del codec
//!   (SVG passthrough incluso)
//!
//! ## Implementazioni:
//! - `ImageCrateCodec`: basata sul crate `image` (JPEG, PNG, WebP lossless, GIF, AVIF)
//! - Nei test, `MockCodec` registra le operazioni senza toccare pixel

pub mod format_hooks;
pub mod image_codec;

pub use format_hooks::{FormatHook, FormatHookInput, SvgPassthrough};
pub use image_codec::ImageCrateCodec;

use crate::error::Result;
use serde_json::Value;
use std::collections::BTreeMap;

/// Decoder parameters (`{"animated": true}`)
pub type CodecOptions = BTreeMap<String, Value>;

/// What the codec knows about a source image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    /// Canonical format name, `None` when the codec cannot tell
    pub format: Option<String>,
    /// EXIF orientation (1..=8)
    pub orientation: Option<u8>,
    pub has_alpha: bool,
    /// Frame count, only known after a full probe of an animated source
    pub pages: Option<u32>,
    /// Height of a single frame for animated sources
    pub page_height: Option<u32>,
    /// Byte size of the source, when known
    pub size: Option<u64>,
}

impl SourceMetadata {
    /// Dimensions-only metadata, as used by `stats_by_dimensions`.
    pub fn from_dimensions(width: u32, height: u32, format: Option<String>) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    /// Orientations 5 to 8 are rotated by ±90°, swapping width and height.
    pub fn needs_rotation(&self) -> bool {
        matches!(self.orientation, Some(5..=8))
    }

    pub fn is_svg(&self) -> bool {
        self.format.as_deref() == Some(crate::format::SVG)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Follow the EXIF orientation, then drop it
    Auto,
    /// Clockwise, multiple of 90
    Degrees(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Target size; a missing side follows the aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resize {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Never grow past the current size
    pub without_enlargement: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Encode {
    pub format: String,
    pub options: BTreeMap<String, Value>,
}

/// Operations applied to a decoded source, in this order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformPipeline {
    pub rotate: Option<Rotation>,
    pub crop: Option<Crop>,
    pub resize: Option<Resize>,
    /// `None` re-encodes in the source format
    pub encode: Option<Encode>,
}

impl TransformPipeline {
    pub fn resize_to_width(&mut self, width: u32, without_enlargement: bool) {
        self.resize = Some(Resize {
            width: Some(width),
            height: None,
            without_enlargement,
        });
    }

    /// Output dimensions when the pipeline itself sets a size (a resize or a
    /// crop), derived from the planned `width`×`height` aspect ratio.
    pub fn explicit_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if let Some(resize) = self.resize {
            match (resize.width, resize.height) {
                (Some(w), Some(h)) => return Some((w, h)),
                (Some(w), None) => return Some((w, aspect_height(width, height, w))),
                (None, Some(h)) => return Some((aspect_width(width, height, h), h)),
                (None, None) => {}
            }
        }

        self.crop.map(|crop| (crop.width, crop.height))
    }
}

/// `floor(new_width × height / width)`
pub fn aspect_height(width: u32, height: u32, new_width: u32) -> u32 {
    if width == 0 {
        return 0;
    }
    (u64::from(new_width) * u64::from(height) / u64::from(width)) as u32
}

/// `floor(new_height × width / height)`
pub fn aspect_width(width: u32, height: u32, new_height: u32) -> u32 {
    if height == 0 {
        return 0;
    }
    (u64::from(new_height) * u64::from(width) / u64::from(height)) as u32
}

/// Encoded output of a transform
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: String,
    pub width: u32,
    pub height: u32,
}

/// Pixel codec used by the pipeline.
///
/// All calls are blocking; the pipeline runs them on `spawn_blocking`.
pub trait Codec: Send + Sync {
    /// Header-only probe: dimensions and format.
    fn probe(&self, bytes: &[u8]) -> Result<SourceMetadata>;

    /// Full probe: alpha, orientation and (for animated sources) frame count.
    fn metadata(&self, bytes: &[u8], options: &CodecOptions) -> Result<SourceMetadata>;

    fn transform(&self, bytes: &[u8], pipeline: &TransformPipeline) -> Result<EncodedImage>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Probe,
        Metadata,
        Transform {
            resize: Option<u32>,
            rotate: bool,
            format: Option<String>,
        },
    }

    /// Codec that reports fixed metadata and records every call.
    ///
    /// Encoded outputs are `width` bytes long, which keeps size comparisons
    /// predictable.
    pub struct MockCodec {
        pub metadata: SourceMetadata,
        pub operations: Mutex<Vec<RecordedOp>>,
        pub fail_transform: bool,
    }

    impl MockCodec {
        pub fn new(metadata: SourceMetadata) -> Self {
            Self {
                metadata,
                operations: Mutex::new(Vec::new()),
                fail_transform: false,
            }
        }

        pub fn raster(width: u32, height: u32, format: &str) -> Self {
            Self::new(SourceMetadata::from_dimensions(width, height, Some(format.to_string())))
        }

        pub fn failing(mut self) -> Self {
            self.fail_transform = true;
            self
        }

        pub fn transforms(&self) -> Vec<RecordedOp> {
            self.operations
                .lock()
                .unwrap()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Transform { .. }))
                .cloned()
                .collect()
        }

        pub fn count(&self, wanted: &RecordedOp) -> usize {
            self.operations.lock().unwrap().iter().filter(|op| *op == wanted).count()
        }
    }

    impl Codec for MockCodec {
        fn probe(&self, bytes: &[u8]) -> Result<SourceMetadata> {
            self.operations.lock().unwrap().push(RecordedOp::Probe);
            Ok(SourceMetadata {
                size: Some(bytes.len() as u64),
                ..self.metadata.clone()
            })
        }

        fn metadata(&self, bytes: &[u8], _options: &CodecOptions) -> Result<SourceMetadata> {
            self.operations.lock().unwrap().push(RecordedOp::Metadata);
            Ok(SourceMetadata {
                size: Some(bytes.len() as u64),
                ..self.metadata.clone()
            })
        }

        fn transform(&self, _bytes: &[u8], pipeline: &TransformPipeline) -> Result<EncodedImage> {
            self.operations.lock().unwrap().push(RecordedOp::Transform {
                resize: pipeline.resize.and_then(|r| r.width),
                rotate: pipeline.rotate.is_some(),
                format: pipeline.encode.as_ref().map(|e| e.format.clone()),
            });

            if self.fail_transform {
                return Err(PipelineError::Codec("mock transform failure".to_string()));
            }

            let (width, height) = pipeline
                .explicit_dimensions(self.metadata.width, self.metadata.height)
                .unwrap_or((self.metadata.width, self.metadata.height));
            let format = pipeline
                .encode
                .as_ref()
                .map(|e| e.format.clone())
                .or_else(|| self.metadata.format.clone())
                .unwrap_or_default();

            Ok(EncodedImage {
                bytes: vec![0u8; width as usize],
                format,
                width,
                height,
            })
        }
    }

    #[test]
    fn test_explicit_dimensions() {
        let mut pipeline = TransformPipeline::default();
        assert_eq!(pipeline.explicit_dimensions(1280, 853), None);

        pipeline.resize_to_width(500, true);
        assert_eq!(pipeline.explicit_dimensions(1280, 853), Some((500, 333)));

        pipeline.resize = Some(Resize {
            width: None,
            height: Some(100),
            without_enlargement: false,
        });
        assert_eq!(pipeline.explicit_dimensions(1280, 853), Some((150, 100)));

        pipeline.resize = None;
        pipeline.crop = Some(Crop { x: 0, y: 0, width: 64, height: 32 });
        assert_eq!(pipeline.explicit_dimensions(1280, 853), Some((64, 32)));
    }

    #[test]
    fn test_needs_rotation() {
        let mut metadata = SourceMetadata::from_dimensions(10, 20, None);
        assert!(!metadata.needs_rotation());
        metadata.orientation = Some(6);
        assert!(metadata.needs_rotation());
        metadata.orientation = Some(3);
        assert!(!metadata.needs_rotation());
    }
}
