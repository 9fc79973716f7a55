//! Error types for backtest runs.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for backtest operations.
pub type Result<T> = std::result::Result<T, BacktestError>;

/// Errors that can occur while validating inputs or running a backtest.
#[derive(Debug, Error)]
pub enum BacktestError {
    /// Invalid run configuration; the run never starts
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Missing required column in an input frame
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Duplicate (entity, period) key in the input panel
    #[error("Duplicate panel record: entity {entity} at {period}")]
    DuplicateRecord {
        /// Entity identifier of the duplicated row
        entity: String,
        /// Period of the duplicated row
        period: NaiveDate,
    },

    /// A period's cross-section cannot be sorted into the requested buckets
    #[error("Insufficient data at {period}: {available} entities for {required} buckets")]
    InsufficientData {
        /// Period that failed to sort
        period: NaiveDate,
        /// Requested number of buckets
        required: usize,
        /// Entities with a usable factor value
        available: usize,
    },

    /// A value-weighted bucket has zero aggregate weight
    #[error("Bucket {bucket} at {period} has zero aggregate weight")]
    ZeroBucketWeight {
        /// Period of the affected bucket
        period: NaiveDate,
        /// 1-based bucket index
        bucket: usize,
    },

    /// A bucket lost all members after exclusion; indicates an upstream bug
    #[error("Bucket {bucket} at {period} is empty")]
    EmptyBucket {
        /// Period of the affected bucket
        period: NaiveDate,
        /// 1-based bucket index
        bucket: usize,
    },

    /// A rebalance date is absent from the daily price calendar
    #[error("Rebalance date {0} not present in the daily price calendar")]
    MisalignedDates(NaiveDate),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl BacktestError {
    /// Whether the analyzer may record this failure as a diagnostic and
    /// continue the run instead of aborting.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::ZeroBucketWeight { .. }
        )
    }
}
