//! Per-format renderers that bypass the codec encoder.
//!
//! The hook table lives in `Hooks::format_hooks`, keyed by canonical format
//! name. A format without an entry goes through `Codec::transform`.

use crate::codec::TransformPipeline;
use crate::error::Result;
use std::sync::Arc;

/// Everything a format hook may look at
#[derive(Debug, Clone)]
pub struct FormatHookInput {
    pub source: Arc<[u8]>,
    pub source_format: Option<String>,
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Pipeline as it would have been handed to the codec
    pub pipeline: TransformPipeline,
}

/// Renders one output variant without the codec.
pub trait FormatHook: Send + Sync {
    /// `Ok(None)` drops the variant from the result.
    fn render(&self, input: &FormatHookInput) -> Result<Option<Vec<u8>>>;
}

impl<F> FormatHook for F
where
    F: Fn(&FormatHookInput) -> Result<Option<Vec<u8>>> + Send + Sync,
{
    fn render(&self, input: &FormatHookInput) -> Result<Option<Vec<u8>>> {
        self(input)
    }
}

/// SVG output of an SVG source is the source itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgPassthrough;

impl FormatHook for SvgPassthrough {
    fn render(&self, input: &FormatHookInput) -> Result<Option<Vec<u8>>> {
        Ok(Some(input.source.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(source: &[u8]) -> FormatHookInput {
        FormatHookInput {
            source: Arc::from(source.to_vec().into_boxed_slice()),
            source_format: Some("svg".to_string()),
            format: "svg".to_string(),
            width: 100,
            height: 50,
            pipeline: TransformPipeline::default(),
        }
    }

    #[test]
    fn test_svg_passthrough_returns_source() {
        let svg = b"<svg width=\"100\" height=\"50\"></svg>";
        let rendered = SvgPassthrough.render(&input(svg)).unwrap();
        assert_eq!(rendered.as_deref(), Some(&svg[..]));
    }

    #[test]
    fn test_closure_hooks() {
        let hook = |input: &FormatHookInput| -> Result<Option<Vec<u8>>> {
            Ok(Some(format!("{}x{}", input.width, input.height).into_bytes()))
        };
        assert_eq!(hook.render(&input(b"")).unwrap(), Some(b"100x50".to_vec()));
    }
}
