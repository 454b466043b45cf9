//! # Result Assembler
//!
//! Raggruppa le varianti completate per formato e applica il filtro
//! "short-circuit per dimensione" degli SVG.
//!
//! ## Regole:
//! - Gruppi nell'ordine in cui compare il formato, ordinati per larghezza crescente
//! - Con `SvgShortCircuit::Size`: nei gruppi raster, se almeno una variante non
//!   supera la dimensione dell'SVG, la prima variante più grande viene
//!   sostituita dall'SVG e le successive più grandi eliminate

use crate::config::SvgShortCircuit;
use crate::format;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::PathBuf;

/// One generated (or planned) output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub url: String,
    /// MIME type, when the format has a known one
    pub source_type: Option<String>,
    /// `"{url} {width}w"`
    pub srcset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Bytes on disk (or in memory); brotli-compressed size for SVG in `"br"` mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Encoded output in dry-run mode
    #[serde(skip)]
    pub buffer: Option<Vec<u8>>,
}

/// Variants grouped by format, in first-seen format order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    groups: Vec<(String, Vec<Variant>)>,
}

impl ResultSet {
    pub fn get(&self, format: &str) -> Option<&[Variant]> {
        self.groups
            .iter()
            .find(|(name, _)| name == format)
            .map(|(_, variants)| variants.as_slice())
    }

    pub fn formats(&self) -> Vec<&str> {
        self.groups.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Variant])> {
        self.groups
            .iter()
            .map(|(name, variants)| (name.as_str(), variants.as_slice()))
    }

    /// Number of format groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All variants, group by group.
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.groups.iter().flat_map(|(_, variants)| variants.iter())
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (name, variants) in &self.groups {
            map.serialize_entry(name, variants)?;
        }
        map.end()
    }
}

/// Groups variants by format and applies the SVG size filter.
pub fn assemble(variants: Vec<Variant>, short_circuit: SvgShortCircuit) -> ResultSet {
    let mut groups: Vec<(String, Vec<Variant>)> = Vec::new();
    for variant in variants {
        match groups.iter_mut().find(|(name, _)| *name == variant.format) {
            Some((_, group)) => group.push(variant),
            None => groups.push((variant.format.clone(), vec![variant])),
        }
    }

    for (_, group) in groups.iter_mut() {
        group.sort_by_key(|v| v.width);
    }

    if short_circuit == SvgShortCircuit::Size {
        let svg_entry = groups
            .iter()
            .find(|(name, _)| name == format::SVG)
            .and_then(|(_, group)| group.first())
            .filter(|entry| entry.size.is_some_and(|size| size > 0))
            .cloned();

        if let Some(svg_entry) = svg_entry {
            for (name, group) in groups.iter_mut() {
                if name != format::SVG {
                    replace_larger_than_svg(group, &svg_entry);
                }
            }
        }
    }

    ResultSet { groups }
}

fn replace_larger_than_svg(group: &mut Vec<Variant>, svg_entry: &Variant) {
    let svg_size = svg_entry.size.unwrap_or(0);
    let is_larger = |v: &Variant| v.size.is_some_and(|size| size > svg_size);

    if group.iter().all(is_larger) {
        return;
    }

    let mut svg_added = false;
    let mut kept = Vec::with_capacity(group.len());
    for variant in group.drain(..) {
        if !is_larger(&variant) {
            kept.push(variant);
        } else if !svg_added {
            svg_added = true;
            kept.push(svg_entry.clone());
        }
    }
    *group = kept;
}
