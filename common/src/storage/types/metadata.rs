use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::utils::coerce::{canonical_json, coerce_float, coerce_int, coerce_key, coerce_text};

/// One product metadata line as it appears in the input stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMetadata {
    #[serde(default)]
    pub parent_asin: Value,
    #[serde(default)]
    pub parent_id: Value,
    #[serde(default)]
    pub main_category: Value,
    #[serde(default)]
    pub title: Value,
    #[serde(default)]
    pub average_rating: Value,
    #[serde(default)]
    pub rating_number: Value,
    #[serde(default)]
    pub features: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub price: Value,
    #[serde(default)]
    pub images: Option<Value>,
    #[serde(default)]
    pub videos: Option<Value>,
    #[serde(default)]
    pub store: Value,
    #[serde(default)]
    pub categories: Option<Value>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub bought_together: Option<Value>,
}

/// A metadata record ready for the `metadata` table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub parent_asin: String,
    pub main_category: Option<String>,
    pub title: Option<String>,
    pub average_rating: Option<f64>,
    pub rating_number: Option<i64>,
    pub features: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub images: Option<String>,
    pub videos: Option<String>,
    pub store: Option<String>,
    pub categories: Option<String>,
    pub details: Option<String>,
    pub bought_together: Option<String>,
}

impl MetadataRow {
    /// Converts a raw record, or returns `None` when it carries no usable
    /// `parent_asin` (or `parent_id` fallback).
    pub fn from_raw(raw: RawMetadata) -> Option<Self> {
        let parent_asin = coerce_key(&raw.parent_asin).or_else(|| coerce_key(&raw.parent_id))?;

        Some(Self {
            parent_asin,
            main_category: coerce_text(&raw.main_category),
            title: coerce_text(&raw.title),
            average_rating: coerce_float(&raw.average_rating),
            rating_number: coerce_int(&raw.rating_number),
            features: canonical_json(raw.features.as_ref()),
            description: canonical_json(raw.description.as_ref()),
            price: coerce_float(&raw.price),
            images: canonical_json(raw.images.as_ref()),
            videos: canonical_json(raw.videos.as_ref()),
            store: coerce_text(&raw.store),
            categories: canonical_json(raw.categories.as_ref()),
            details: canonical_json(raw.details.as_ref()),
            bought_together: canonical_json(raw.bought_together.as_ref()),
        })
    }
}

/// Keeps only the last row for every `parent_asin`, preserving the relative
/// order of the survivors. A single upsert statement may not touch the same
/// key twice, and the last occurrence is what sequential writes would leave.
pub fn collapse_duplicate_keys(rows: &[MetadataRow]) -> Vec<&MetadataRow> {
    let mut last_seen: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        last_seen.insert(row.parent_asin.as_str(), idx);
    }

    rows.iter()
        .enumerate()
        .filter(|(idx, row)| last_seen.get(row.parent_asin.as_str()) == Some(idx))
        .map(|(_, row)| row)
        .collect()
}
