//! Normalization of raw source text into canonical record fields

pub mod dates;
pub mod fields;
pub mod location;
pub mod record;
pub mod status;

pub use dates::{DateNormalizer, NormalizedDate};
pub use location::LocationExtractor;
pub use record::RecordExtractor;
pub use status::{StatusDecision, StatusResolver};
