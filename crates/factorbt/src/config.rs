//! Run configuration for the backtest engine.
//!
//! All knobs live in an explicit [`BacktestConfig`] value passed to
//! [`Engine::new`](crate::Engine::new); there is no process-wide state.

use crate::{BacktestError, Result};
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Portfolio weighting scheme within a bucket.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Unweighted mean of member forward returns
    #[display("equal")]
    Equal,
    /// Weighted mean, with weights renormalized to sum to 1 within the
    /// bucket at assignment time
    #[display("value")]
    Value,
}

/// Correlation method for the information coefficient.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IcMethod {
    /// Spearman rank correlation (default)
    #[display("rank")]
    Rank,
    /// Pearson linear correlation
    #[display("linear")]
    Linear,
}

/// Configuration for a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Number of quantile buckets K (must be >= 2)
    pub num_buckets: usize,
    /// Weighting scheme for bucket portfolios
    pub weighting: Weighting,
    /// First period to include; `None` means the start of the panel
    pub start_period: Option<NaiveDate>,
    /// Last period to include; `None` means the end of the panel
    pub end_period: Option<NaiveDate>,
    /// Correlation method for the IC
    pub ic_method: IcMethod,
    /// Rebalance periods per year, used for annualization (12 for monthly)
    pub periods_per_year: usize,
    /// Newey-West lag override; `None` selects floor(n^(1/3)) per series
    pub newey_west_lag: Option<usize>,
    /// Reconstruct daily bucket returns from the daily price panel
    pub daily_reconciliation: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            num_buckets: 5,
            weighting: Weighting::Value,
            start_period: None,
            end_period: None,
            ic_method: IcMethod::Rank,
            periods_per_year: 12,
            newey_west_lag: None,
            daily_reconciliation: false,
        }
    }
}

impl BacktestConfig {
    /// Validates the configuration, failing fast on unusable parameters.
    pub fn validate(&self) -> Result<()> {
        if self.num_buckets < 2 {
            return Err(BacktestError::Configuration(format!(
                "num_buckets must be at least 2, got {}",
                self.num_buckets
            )));
        }
        if self.periods_per_year == 0 {
            return Err(BacktestError::Configuration(
                "periods_per_year must be positive".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_period, self.end_period)
            && start > end
        {
            return Err(BacktestError::Configuration(format!(
                "start_period {start} is after end_period {end}"
            )));
        }
        Ok(())
    }
}
