use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::utils::coerce::{
    canonical_json, coerce_bool, coerce_int, coerce_key, coerce_text, epoch_millis_to_timestamp,
};

/// One user review line as it appears in the input stream. Fields are kept
/// as raw JSON so a value of an unexpected type clears that field instead of
/// rejecting the record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReview {
    #[serde(default)]
    pub asin: Value,
    #[serde(default)]
    pub user_id: Value,
    #[serde(default)]
    pub rating: Value,
    #[serde(default)]
    pub title: Value,
    #[serde(default)]
    pub text: Value,
    #[serde(default)]
    pub images: Option<Value>,
    #[serde(default)]
    pub parent_asin: Value,
    #[serde(default)]
    pub parent_id: Value,
    #[serde(default)]
    pub timestamp: Value,
    #[serde(default)]
    pub helpful_vote: Value,
    #[serde(default)]
    pub verified_purchase: Value,
}

/// A review ready for the `user_reviews` table, minus its embedding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewRow {
    pub asin: Option<String>,
    pub user_id: Option<String>,
    pub rating: Option<i64>,
    pub title: Option<String>,
    pub review_text: Option<String>,
    pub images: Option<String>,
    pub parent_asin: Option<String>,
    pub ts: Option<NaiveDateTime>,
    pub helpful_vote: Option<i64>,
    pub verified_purchase: Option<bool>,
}

impl ReviewRow {
    pub fn from_raw(raw: RawReview) -> Self {
        Self {
            asin: coerce_text(&raw.asin),
            user_id: coerce_text(&raw.user_id),
            rating: coerce_int(&raw.rating),
            title: coerce_text(&raw.title),
            review_text: coerce_text(&raw.text),
            images: canonical_json(raw.images.as_ref()),
            parent_asin: coerce_key(&raw.parent_asin).or_else(|| coerce_key(&raw.parent_id)),
            ts: epoch_millis_to_timestamp(&raw.timestamp),
            helpful_vote: coerce_int(&raw.helpful_vote),
            verified_purchase: coerce_bool(&raw.verified_purchase),
        }
    }

    /// Text fed to the embedder; reviews without a body embed the empty string.
    pub fn embedding_text(&self) -> &str {
        self.review_text.as_deref().unwrap_or("")
    }
}
