use std::{collections::HashSet, path::Path};

use common::{
    error::AppError,
    storage::types::{MetadataRow, RawMetadata, ReviewRow},
};
use tracing::{info, warn};

use crate::reader::RecordReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    MissingKey,
    UnknownParent,
}

/// Decides whether a review's `parent_asin` may be written.
///
/// Reviews without a key are always rejected. When a known-key set is
/// loaded the key must also be a member of it.
#[derive(Debug, Clone, Default)]
pub struct ParentFilter {
    known: Option<HashSet<String>>,
}

impl ParentFilter {
    pub fn disabled() -> Self {
        Self { known: None }
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Collects every usable `parent_asin` from a metadata file. Malformed
    /// lines and keyless records are skipped the same way the metadata
    /// loader skips them.
    pub fn load_from_metadata(path: &Path) -> Result<Self, AppError> {
        let mut reader = RecordReader::<_, RawMetadata>::open(path)?;
        let mut known = HashSet::new();
        for record in reader.by_ref() {
            if let Some(row) = MetadataRow::from_raw(record?) {
                known.insert(row.parent_asin);
            }
        }
        info!(
            path = %path.display(),
            known_keys = known.len(),
            malformed = reader.malformed(),
            "loaded parent keys for filtering"
        );
        Ok(Self { known: Some(known) })
    }

    pub fn is_active(&self) -> bool {
        self.known.is_some()
    }

    pub fn known_keys(&self) -> usize {
        self.known.as_ref().map_or(0, HashSet::len)
    }

    pub fn decide(&self, review: &ReviewRow) -> FilterDecision {
        let Some(parent) = review.parent_asin.as_deref() else {
            warn!(asin = ?review.asin, user_id = ?review.user_id, "review without parent_asin skipped");
            return FilterDecision::MissingKey;
        };

        match &self.known {
            Some(known) if !known.contains(parent) => {
                warn!(parent_asin = parent, asin = ?review.asin, "review with unknown parent_asin skipped");
                FilterDecision::UnknownParent
            }
            _ => FilterDecision::Accept,
        }
    }
}
