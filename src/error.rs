//! Error types for geotable operations.

use crate::store::StoreError;
use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GeoTableError>;

/// Top-level error for index operations.
///
/// `InvalidInput` and `FanOutExceeded` are pre-flight failures raised
/// before any store round-trip. `Store` wraps the first failure of a
/// fan-out request after sibling scans have been cancelled.
#[derive(Debug, Error)]
pub enum GeoTableError {
    /// Coordinates or query parameters were rejected up front.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The planned range-scan count exceeds the configured fan-out budget.
    #[error("Query would fan out into {planned} range scans (budget {budget}): {query}")]
    FanOutExceeded {
        planned: usize,
        budget: usize,
        query: String,
    },

    /// A store round-trip failed and the query was aborted as a whole.
    #[error("Range query failed: {0}")]
    Store(#[from] StoreError),
}
