//! # Fingerprint Module
//!
//! Calcola l'identità stabile (hash) di una richiesta: sorgente + opzioni
//! che influenzano i pixel di output.
//!
//! ## Responsabilità:
//! - Hash dei byte della sorgente locale, normalizzando gli a-capo negli SVG
//! - Hash dell'identificatore (URL) per sorgenti remote o non leggibili, con
//!   marker di validità della cache remota
//! - Include solo i blocchi di opzioni del codec/encoder (mai `widths`)
//! - Output base64 URL-safe troncato a `hash_length`
//!
//! ## Esempio:
//! ```rust,ignore
//! let hash = compute_fingerprint(HashSource::Contents(&bytes), &options);
//! let filename = format!("{}-{}.webp", hash, 300);
//! ```

use crate::config::Options;
use crate::utils::canonical_json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::borrow::Cow;

/// What gets hashed for the source half of the fingerprint
#[derive(Debug, Clone, Copy)]
pub enum HashSource<'a> {
    /// Bytes of a readable local file
    Contents(&'a [u8]),
    /// Bytes of an in-memory buffer, hashed as-is
    Buffer(&'a [u8]),
    /// URL (or unreadable path) plus the remote cache validity marker
    Identifier {
        id: &'a str,
        remote: bool,
        cache_valid: bool,
    },
}

/// Computes the truncated fingerprint for a source and its options.
pub fn compute_fingerprint(source: HashSource<'_>, options: &Options) -> String {
    let mut hasher = Sha256::new();

    match source {
        HashSource::Contents(bytes) => hasher.update(normalize_svg(bytes)),
        HashSource::Buffer(bytes) => hasher.update(bytes),
        HashSource::Identifier {
            id,
            remote,
            cache_valid,
        } => {
            hasher.update(id.as_bytes());
            if remote {
                hasher.update(format!("ValidCache:{}", cache_valid).as_bytes());
            }
        }
    }

    hasher.update(hashed_options(options).as_bytes());

    let encoded = URL_SAFE_NO_PAD.encode(hasher.finalize());
    encoded.chars().take(options.hash_length).collect()
}

/// Only the blocks that change the encoded pixels take part in the hash.
fn hashed_options(options: &Options) -> String {
    let mut blocks = serde_json::Map::new();
    if !options.codec_options.is_empty() {
        blocks.insert("codec_options".to_string(), json!(options.codec_options));
    }
    if !options.encoder_options.is_empty() {
        blocks.insert("encoder_options".to_string(), json!(options.encoder_options));
    }
    canonical_json(&Value::Object(blocks))
}

/// Strips `\r` and `\n` from SVG/XML text so line endings do not change the hash.
pub(crate) fn normalize_svg(bytes: &[u8]) -> Cow<'_, [u8]> {
    // binary files almost never start with whitespace or '<'
    match bytes.first() {
        Some(first) if first.is_ascii_whitespace() || *first == b'<' => {}
        _ => return Cow::Borrowed(bytes),
    }

    let trimmed = bytes.trim_ascii_start();
    if trimmed.starts_with(b"<svg ") || trimmed.starts_with(b"<?xml") {
        Cow::Owned(
            bytes
                .iter()
                .copied()
                .filter(|b| *b != b'\r' && *b != b'\n')
                .collect(),
        )
    } else {
        Cow::Borrowed(bytes)
    }
}
