//! Per-period analysis loop.
//!
//! Iterates cross-sections in strictly ascending period order, sorting each
//! one into buckets and building portfolios, ICs, Fama-MacBeth premia, and
//! turnover as it goes. Periods that cannot be processed are recorded as
//! diagnostics and excluded from the accumulated series; the run never
//! aborts on a single bad period. Ordering matters: turnover and drawdown
//! are path-dependent, so reordering periods would corrupt results.

use crate::config::BacktestConfig;
use crate::panel::CrossSection;
use crate::portfolio::{self, BucketPeriod, RebalancePlan};
use crate::sort::sort_cross_section;
use crate::stats;
use crate::Result;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

/// A period excluded from aggregation, with the reason it failed.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodDiagnostic {
    /// The excluded period
    pub period: NaiveDate,
    /// Human-readable failure reason
    pub reason: String,
}

/// Accumulated per-period results over the valid sample.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Valid periods, ascending; every series below is aligned with this
    pub periods: Vec<NaiveDate>,
    /// Period returns indexed by bucket - 1
    pub bucket_returns: Vec<Vec<f64>>,
    /// Long-short (top minus bottom) period returns
    pub long_short_returns: Vec<f64>,
    /// One-way turnover per bucket; `None` at the first valid period
    pub turnover: Vec<Vec<Option<f64>>>,
    /// Information coefficient per period; `None` when undefined
    pub ic_series: Vec<Option<f64>>,
    /// Fama-MacBeth premium per period; `None` when undefined
    pub premium_series: Vec<Option<f64>>,
    /// Holding weights per valid period, for the daily reconciler
    pub rebalances: Vec<RebalancePlan>,
    /// Mean rank correlation of factor values across consecutive periods
    pub factor_autocorrelation: Option<f64>,
    /// Excluded periods and reasons
    pub diagnostics: Vec<PeriodDiagnostic>,
}

impl AnalysisResult {
    /// Renders the per-period series as a frame indexed by `period`, with
    /// `Q1`..`QK`, `long_short`, `ic`, and `fm_premium` columns. Undefined
    /// statistics appear as nulls.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut cols: Vec<Column> = Vec::with_capacity(self.bucket_returns.len() + 4);
        cols.push(Column::new(
            "period".into(),
            self.periods
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>(),
        ));
        for (i, returns) in self.bucket_returns.iter().enumerate() {
            cols.push(Column::new(format!("Q{}", i + 1).into(), returns.clone()));
        }
        cols.push(Column::new(
            "long_short".into(),
            self.long_short_returns.clone(),
        ));
        cols.push(Column::new("ic".into(), self.ic_series.clone()));
        cols.push(Column::new("fm_premium".into(), self.premium_series.clone()));
        Ok(DataFrame::new(cols)?)
    }
}

fn factor_return_pairs(section: &CrossSection) -> (Vec<f64>, Vec<f64>) {
    section
        .entries
        .iter()
        .filter_map(|e| {
            e.factor
                .filter(|f| f.is_finite())
                .map(|f| (f, e.forward_return))
        })
        .unzip()
}

fn period_ic(section: &CrossSection, config: &BacktestConfig) -> Option<f64> {
    let (factor, forward) = factor_return_pairs(section);
    stats::information_coefficient(&factor, &forward, config.ic_method)
}

fn period_premium(section: &CrossSection) -> Option<f64> {
    let (factor, forward) = factor_return_pairs(section);
    crate::regress::cross_sectional_premium(&factor, &forward)
}

/// Rank correlation of factor values between two consecutive
/// cross-sections, over the entities present in both.
fn cross_period_rank_correlation(prev: &CrossSection, curr: &CrossSection) -> Option<f64> {
    let prev_factors: HashMap<&str, f64> = prev
        .entries
        .iter()
        .filter_map(|e| e.factor.map(|f| (e.entity.as_str(), f)))
        .collect();

    let (old, new): (Vec<f64>, Vec<f64>) = curr
        .entries
        .iter()
        .filter_map(|e| {
            let f = e.factor?;
            prev_factors.get(e.entity.as_str()).map(|&pf| (pf, f))
        })
        .unzip();
    stats::spearman(&old, &new)
}

/// Runs the per-period loop over cross-sections already sliced to the
/// configured date range and sorted ascending.
pub fn analyze(sections: &[CrossSection], config: &BacktestConfig) -> Result<AnalysisResult> {
    let k = config.num_buckets;
    let mut result = AnalysisResult {
        periods: Vec::with_capacity(sections.len()),
        bucket_returns: vec![Vec::with_capacity(sections.len()); k],
        long_short_returns: Vec::with_capacity(sections.len()),
        turnover: vec![Vec::with_capacity(sections.len()); k],
        ic_series: Vec::with_capacity(sections.len()),
        premium_series: Vec::with_capacity(sections.len()),
        rebalances: Vec::with_capacity(sections.len()),
        factor_autocorrelation: None,
        diagnostics: Vec::new(),
    };

    // Turnover compares against the portfolio actually held, which is the
    // previous *valid* period's holdings
    let mut previous_weights: Option<Vec<HashMap<String, f64>>> = None;
    let mut autocorrelations: Vec<f64> = Vec::new();
    let mut previous_section: Option<&CrossSection> = None;

    for section in sections {
        debug_assert!(result.periods.last().is_none_or(|&p| p < section.period));

        let buckets: Vec<BucketPeriod> = match sort_cross_section(section, k)
            .and_then(|assignment| portfolio::build_portfolios(section, &assignment, config.weighting))
        {
            Ok(buckets) => buckets,
            Err(err) if err.is_recoverable() => {
                result.diagnostics.push(PeriodDiagnostic {
                    period: section.period,
                    reason: err.to_string(),
                });
                continue;
            }
            Err(err) => return Err(err),
        };

        for bucket in &buckets {
            result.bucket_returns[bucket.bucket - 1].push(bucket.ret);
            let t = previous_weights
                .as_ref()
                .map(|prev| portfolio::turnover(&prev[bucket.bucket - 1], &bucket.weights));
            result.turnover[bucket.bucket - 1].push(t);
        }
        result
            .long_short_returns
            .push(portfolio::long_short_return(&buckets));
        result.ic_series.push(period_ic(section, config));
        result.premium_series.push(period_premium(section));

        if let Some(prev) = previous_section
            && let Some(ac) = cross_period_rank_correlation(prev, section)
        {
            autocorrelations.push(ac);
        }
        previous_section = Some(section);

        let weights: Vec<HashMap<String, f64>> =
            buckets.into_iter().map(|b| b.weights).collect();
        result.rebalances.push(RebalancePlan {
            date: section.period,
            buckets: weights.clone(),
        });
        previous_weights = Some(weights);
        result.periods.push(section.period);
    }

    result.factor_autocorrelation = stats::mean(&autocorrelations);
    Ok(result)
}
