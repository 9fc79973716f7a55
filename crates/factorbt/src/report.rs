//! Run results: the immutable summary report.
//!
//! Everything the engine computes lands here, tagged with the bucket or
//! long-short combination it describes. Statistics that are undefined for
//! the sample are `None`; the report never substitutes a fabricated zero.

use crate::analyzer::PeriodDiagnostic;
use crate::reconcile::DailyReturnSeries;
use crate::stats;
use crate::Result;
use derive_more::Display;
use polars::prelude::*;
use serde::Serialize;

/// Identifies which portfolio a set of statistics describes.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PortfolioTag {
    /// Quantile bucket (1-based; 1 = lowest factor values)
    #[display("Q{_0}")]
    Bucket(usize),
    /// Top bucket minus bottom bucket
    #[display("long_short")]
    LongShort,
}

/// Time-series performance statistics for one return series.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    /// Mean period return
    pub mean_return: Option<f64>,
    /// Annualized geometric return
    pub annualized_return: Option<f64>,
    /// Annualized volatility
    pub annualized_volatility: Option<f64>,
    /// Annualized Sharpe ratio
    pub sharpe: Option<f64>,
    /// Newey-West t-statistic of the mean
    pub t_stat: Option<f64>,
    /// Maximum drawdown, in [-1, 0]
    pub max_drawdown: Option<f64>,
    /// Fraction of positive periods
    pub win_rate: Option<f64>,
}

impl PerformanceStats {
    /// Computes the full set of statistics for a return series.
    pub fn from_returns(
        returns: &[f64],
        periods_per_year: usize,
        newey_west_lag: Option<usize>,
    ) -> Self {
        Self {
            mean_return: stats::mean(returns),
            annualized_return: stats::annualized_return(returns, periods_per_year),
            annualized_volatility: stats::annualized_volatility(returns, periods_per_year),
            sharpe: stats::sharpe_ratio(returns, periods_per_year),
            t_stat: stats::newey_west_t_stat(returns, newey_west_lag),
            max_drawdown: stats::max_drawdown(returns),
            win_rate: stats::win_rate(returns),
        }
    }
}

/// Benchmark-relative statistics for one portfolio.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkStats {
    /// Annualized regression intercept
    pub alpha_annualized: f64,
    /// Regression slope on the benchmark
    pub beta: f64,
    /// Newey-West t-statistic of the intercept
    pub alpha_t_stat: Option<f64>,
    /// Statistics of the period-by-period active return
    pub active: PerformanceStats,
    /// Aligned observations used in the regression
    pub observations: usize,
    /// Periods dropped from either side during alignment
    pub dropped_periods: usize,
}

/// All statistics reported for one portfolio.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReport {
    /// Which portfolio this row describes
    pub tag: PortfolioTag,
    /// Raw return statistics
    pub stats: PerformanceStats,
    /// Mean one-way turnover over periods where it is defined
    pub mean_turnover: Option<f64>,
    /// Benchmark-relative statistics, when a benchmark was supplied
    pub benchmark: Option<BenchmarkStats>,
}

/// Information-coefficient summary over the valid sample.
#[derive(Debug, Clone, Serialize)]
pub struct IcSummary {
    /// Mean IC
    pub mean: Option<f64>,
    /// IC standard deviation
    pub std: Option<f64>,
    /// Information ratio: mean / std
    pub ir: Option<f64>,
    /// Newey-West t-statistic of the IC series
    pub t_stat: Option<f64>,
    /// Periods with a defined IC
    pub observations: usize,
}

impl IcSummary {
    /// Summarizes a per-period IC series, ignoring undefined periods.
    pub fn from_series(series: &[Option<f64>], newey_west_lag: Option<usize>) -> Self {
        let defined: Vec<f64> = series.iter().flatten().copied().collect();
        let mean = stats::mean(&defined);
        let std = stats::std_dev(&defined);
        let ir = match (mean, std) {
            (Some(m), Some(s)) if s > 0.0 => Some(m / s),
            _ => None,
        };
        Self {
            mean,
            std,
            ir,
            t_stat: stats::newey_west_t_stat(&defined, newey_west_lag),
            observations: defined.len(),
        }
    }
}

/// Fama-MacBeth premium summary over the valid sample.
#[derive(Debug, Clone, Serialize)]
pub struct FamaMacbethSummary {
    /// Mean cross-sectional premium per unit of factor z-score
    pub premium: Option<f64>,
    /// Newey-West t-statistic of the premium series
    pub t_stat: Option<f64>,
    /// Periods with a defined premium
    pub observations: usize,
}

impl FamaMacbethSummary {
    /// Summarizes a per-period premium series, ignoring undefined periods.
    pub fn from_series(series: &[Option<f64>], newey_west_lag: Option<usize>) -> Self {
        let defined: Vec<f64> = series.iter().flatten().copied().collect();
        Self {
            premium: stats::mean(&defined),
            t_stat: stats::newey_west_t_stat(&defined, newey_west_lag),
            observations: defined.len(),
        }
    }
}

/// Immutable result of one engine run.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    /// Per-bucket reports (index 0 = bucket 1) followed by long-short
    pub portfolios: Vec<PortfolioReport>,
    /// IC summary
    pub ic: IcSummary,
    /// Fama-MacBeth summary
    pub fama_macbeth: FamaMacbethSummary,
    /// Mean rank correlation of factor values across consecutive periods
    pub factor_autocorrelation: Option<f64>,
    /// Periods included in aggregate statistics
    pub valid_periods: usize,
    /// Periods excluded and surfaced in `diagnostics`
    pub excluded_periods: usize,
    /// Excluded periods and reasons
    pub diagnostics: Vec<PeriodDiagnostic>,
    /// Daily reconstructed returns, when requested and reconcilable
    pub daily: Option<DailyReturnSeries>,
}

impl SummaryReport {
    /// The long-short portfolio's report.
    ///
    /// # Panics
    ///
    /// Panics if the report was constructed without a long-short row,
    /// which the engine never does.
    pub fn long_short(&self) -> &PortfolioReport {
        self.portfolios
            .iter()
            .find(|p| p.tag == PortfolioTag::LongShort)
            .expect("engine always emits a long-short row")
    }

    /// A bucket's report (1-based), if present.
    pub fn bucket(&self, bucket: usize) -> Option<&PortfolioReport> {
        self.portfolios
            .iter()
            .find(|p| p.tag == PortfolioTag::Bucket(bucket))
    }

    /// Renders the per-portfolio statistics as a frame, one row per
    /// portfolio, missing statistics as nulls.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let tags: Vec<String> = self.portfolios.iter().map(|p| p.tag.to_string()).collect();
        let pick =
            |f: fn(&PortfolioReport) -> Option<f64>| -> Vec<Option<f64>> {
                self.portfolios.iter().map(f).collect()
            };

        let mut cols = vec![
            Column::new("portfolio".into(), tags),
            Column::new("mean_return".into(), pick(|p| p.stats.mean_return)),
            Column::new(
                "annualized_return".into(),
                pick(|p| p.stats.annualized_return),
            ),
            Column::new("sharpe".into(), pick(|p| p.stats.sharpe)),
            Column::new("nw_t_stat".into(), pick(|p| p.stats.t_stat)),
            Column::new("max_drawdown".into(), pick(|p| p.stats.max_drawdown)),
            Column::new("win_rate".into(), pick(|p| p.stats.win_rate)),
            Column::new("mean_turnover".into(), pick(|p| p.mean_turnover)),
        ];
        if self.portfolios.iter().any(|p| p.benchmark.is_some()) {
            cols.push(Column::new(
                "alpha_annualized".into(),
                pick(|p| p.benchmark.as_ref().map(|b| b.alpha_annualized)),
            ));
            cols.push(Column::new(
                "beta".into(),
                pick(|p| p.benchmark.as_ref().map(|b| b.beta)),
            ));
            cols.push(Column::new(
                "alpha_t_stat".into(),
                pick(|p| p.benchmark.as_ref().and_then(|b| b.alpha_t_stat)),
            ));
            cols.push(Column::new(
                "active_return".into(),
                pick(|p| p.benchmark.as_ref().and_then(|b| b.active.mean_return)),
            ));
        }
        Ok(DataFrame::new(cols)?)
    }
}
