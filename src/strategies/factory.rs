use super::anchor_scan::AnchorScanStrategy;
use super::base::ExtractionStrategy;
use super::table_rows::TableRowStrategy;
use crate::constants::{ANCHOR_SCAN_STRATEGY, TABLE_ROWS_STRATEGY};
use crate::error::PipelineError;
use std::sync::Arc;

/// Names accepted by [`create_strategy`]
pub const AVAILABLE_STRATEGIES: &[&str] = &[TABLE_ROWS_STRATEGY, ANCHOR_SCAN_STRATEGY];

/// Factory function to create an extraction strategy by name
pub fn create_strategy(name: &str) -> Result<Arc<dyn ExtractionStrategy>, PipelineError> {
    match name {
        TABLE_ROWS_STRATEGY => Ok(Arc::new(TableRowStrategy::new())),
        ANCHOR_SCAN_STRATEGY => Ok(Arc::new(AnchorScanStrategy::new())),
        other => Err(PipelineError::UnknownStrategy(other.to_string())),
    }
}
