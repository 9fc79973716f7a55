//! Backtest engine facade.
//!
//! Validates configuration and inputs, drives the analyzer over the
//! configured date range, runs benchmark regressions per portfolio,
//! reconciles to daily frequency when requested, and assembles the final
//! [`SummaryReport`]. The engine borrows its inputs and owns nothing
//! mutable across runs, so independent runs over the same panel need no
//! synchronization.

use crate::analyzer::{self, AnalysisResult, PeriodDiagnostic};
use crate::config::BacktestConfig;
use crate::panel;
use crate::reconcile::{self, DailyPrices};
use crate::regress;
use crate::report::{
    BenchmarkStats, FamaMacbethSummary, IcSummary, PerformanceStats, PortfolioReport,
    PortfolioTag, SummaryReport,
};
use crate::stats;
use crate::{BacktestError, Result};
use chrono::NaiveDate;
use polars::prelude::*;

/// Facade over the full analysis pipeline.
#[derive(Debug, Clone)]
pub struct Engine {
    config: BacktestConfig,
}

impl Engine {
    /// Creates an engine, failing fast on an invalid configuration.
    pub fn new(config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The engine's configuration.
    pub const fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Runs the backtest over an input panel.
    ///
    /// `daily` is required when the configuration requests daily
    /// reconciliation; `benchmark` enables alpha/beta and active-return
    /// statistics. Periods that cannot be processed are excluded and
    /// surfaced in the report's diagnostics.
    pub fn run(
        &self,
        panel: &DataFrame,
        daily: Option<&DataFrame>,
        benchmark: Option<&DataFrame>,
    ) -> Result<SummaryReport> {
        if self.config.daily_reconciliation && daily.is_none() {
            return Err(BacktestError::Configuration(
                "daily reconciliation requested but no daily panel supplied".to_string(),
            ));
        }

        let sections = panel::extract_cross_sections(
            panel,
            self.config.start_period,
            self.config.end_period,
        )?;
        if sections.is_empty() {
            return Err(BacktestError::Configuration(
                "date range contains no periods from the panel".to_string(),
            ));
        }

        let analysis = analyzer::analyze(&sections, &self.config)?;
        let benchmark_series = benchmark.map(panel::extract_benchmark).transpose()?;

        let mut portfolios = Vec::with_capacity(self.config.num_buckets + 1);
        for bucket in 1..=self.config.num_buckets {
            portfolios.push(self.portfolio_report(
                PortfolioTag::Bucket(bucket),
                &analysis.bucket_returns[bucket - 1],
                mean_turnover(&analysis.turnover[bucket - 1]),
                &analysis.periods,
                benchmark_series.as_deref(),
            ));
        }
        portfolios.push(self.portfolio_report(
            PortfolioTag::LongShort,
            &analysis.long_short_returns,
            None,
            &analysis.periods,
            benchmark_series.as_deref(),
        ));

        // The misaligned-calendar diagnostic (if any) is appended after
        // this count: it degrades the daily step, not a period
        let excluded_periods = analysis.diagnostics.len();
        let mut diagnostics = analysis.diagnostics.clone();
        let daily_series = self.reconcile_daily(&analysis, daily, &mut diagnostics)?;

        Ok(SummaryReport {
            portfolios,
            ic: IcSummary::from_series(&analysis.ic_series, self.config.newey_west_lag),
            fama_macbeth: FamaMacbethSummary::from_series(
                &analysis.premium_series,
                self.config.newey_west_lag,
            ),
            factor_autocorrelation: analysis.factor_autocorrelation,
            valid_periods: analysis.periods.len(),
            excluded_periods,
            diagnostics,
            daily: daily_series,
        })
    }

    fn portfolio_report(
        &self,
        tag: PortfolioTag,
        returns: &[f64],
        mean_turnover: Option<f64>,
        periods: &[NaiveDate],
        benchmark: Option<&[(NaiveDate, f64)]>,
    ) -> PortfolioReport {
        let benchmark_stats = benchmark.and_then(|bench| {
            let keyed: Vec<(NaiveDate, f64)> = periods
                .iter()
                .copied()
                .zip(returns.iter().copied())
                .collect();
            let aligned = regress::align(&keyed, bench);
            let fit = regress::ols_newey_west(
                &aligned.strategy,
                &aligned.benchmark,
                self.config.newey_west_lag,
                self.config.periods_per_year,
            )?;
            let active: Vec<f64> = aligned
                .strategy
                .iter()
                .zip(&aligned.benchmark)
                .map(|(&s, &b)| s - b)
                .collect();
            Some(BenchmarkStats {
                alpha_annualized: fit.alpha_annualized,
                beta: fit.beta,
                alpha_t_stat: fit.alpha_t_stat,
                active: PerformanceStats::from_returns(
                    &active,
                    self.config.periods_per_year,
                    self.config.newey_west_lag,
                ),
                observations: fit.observations,
                dropped_periods: aligned.dropped,
            })
        });

        PortfolioReport {
            tag,
            stats: PerformanceStats::from_returns(
                returns,
                self.config.periods_per_year,
                self.config.newey_west_lag,
            ),
            mean_turnover,
            benchmark: benchmark_stats,
        }
    }

    /// Runs daily reconciliation when requested. A misaligned calendar
    /// degrades to monthly-only results with a diagnostic; any other
    /// failure propagates.
    fn reconcile_daily(
        &self,
        analysis: &AnalysisResult,
        daily: Option<&DataFrame>,
        diagnostics: &mut Vec<PeriodDiagnostic>,
    ) -> Result<Option<reconcile::DailyReturnSeries>> {
        if !self.config.daily_reconciliation {
            return Ok(None);
        }
        // Presence of the daily frame is enforced at run entry
        let Some(frame) = daily else {
            return Ok(None);
        };
        let prices = DailyPrices::from_frame(frame)?;
        match reconcile::reconcile(&analysis.rebalances, &prices) {
            Ok(series) => Ok(Some(series)),
            Err(err @ BacktestError::MisalignedDates(date)) => {
                diagnostics.push(PeriodDiagnostic {
                    period: date,
                    reason: err.to_string(),
                });
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn mean_turnover(turnover: &[Option<f64>]) -> Option<f64> {
    let defined: Vec<f64> = turnover.iter().flatten().copied().collect();
    stats::mean(&defined)
}
