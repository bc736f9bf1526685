pub mod metadata;
pub mod review;

pub use metadata::{MetadataRow, RawMetadata};
pub use review::{RawReview, ReviewRow};
