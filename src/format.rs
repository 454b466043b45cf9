//! # Output Format Tables
//!
//! Tabelle statiche dei formati di output: alias, MIME type, formati
//! animabili e formati che supportano la trasparenza.
//!
//! I formati sono identificati dal loro nome canonico (`"jpeg"`, `"webp"`,
//! `"png"`, `"svg"`, `"avif"`, `"gif"`); formati sconosciuti passano così come
//! sono e vengono gestiti dal codec (o da un format hook).

/// Placeholder meaning "use the source's native format".
pub const AUTO: &str = "auto";

pub const SVG: &str = "svg";

const MIME_TYPES: &[(&str, &str)] = &[
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("avif", "image/avif"),
    ("gif", "image/gif"),
];

const FORMAT_ALIASES: &[(&str, &str)] = &[
    ("jpg", "jpeg"),
    // mime-type style input
    ("svg+xml", "svg"),
];

/// Formats able to carry more than one frame.
pub const ANIMATED_FORMATS: &[&str] = &["webp", "gif"];

/// Formats able to carry an alpha channel.
pub const TRANSPARENCY_FORMATS: &[&str] = &["avif", "png", "webp", "gif", "svg"];

/// At least one of these must be requested before transparency filtering kicks in.
pub const MINIMUM_TRANSPARENCY_FORMATS: &[&str] = &["png", "gif", "svg"];

/// Canonical name for a requested format (`jpg` -> `jpeg`).
pub fn canonical(format: &str) -> String {
    let lower = format.trim().to_ascii_lowercase();
    FORMAT_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(lower)
}

/// True for `"auto"` and empty entries.
pub fn is_auto(format: &str) -> bool {
    let trimmed = format.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(AUTO)
}

pub fn mime_type(format: &str) -> Option<&'static str> {
    MIME_TYPES
        .iter()
        .find(|(name, _)| *name == format)
        .map(|(_, mime)| *mime)
}

pub fn is_animated_format(format: &str) -> bool {
    ANIMATED_FORMATS.contains(&format)
}
