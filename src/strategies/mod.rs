pub mod anchor_scan;
pub mod base;
pub mod factory;
pub mod table_rows;

pub use base::{DetailPage, ExtractionStrategy, ListingPage};
pub use factory::create_strategy;
