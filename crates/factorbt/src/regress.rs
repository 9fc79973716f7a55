//! Benchmark regression and cross-sectional premia.
//!
//! Aligns a strategy return series with a benchmark by exact period key,
//! fits the single-factor OLS `strategy = alpha + beta * benchmark + e`,
//! and reports alpha with a Newey-West (HAC) t-statistic using the same
//! Bartlett-kernel lag rule as the rest of the crate. Unmatched periods are
//! dropped from both sides and counted, never imputed.

use crate::stats;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

/// Result of exact-key alignment between a strategy and a benchmark series.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Strategy returns on matched periods, ascending
    pub strategy: Vec<f64>,
    /// Benchmark returns on the same matched periods
    pub benchmark: Vec<f64>,
    /// Rows dropped from either side for lack of a counterpart
    pub dropped: usize,
}

/// Inner-joins two period-keyed series by exact date match.
pub fn align(
    strategy: &[(NaiveDate, f64)],
    benchmark: &[(NaiveDate, f64)],
) -> Alignment {
    let bench_by_period: HashMap<NaiveDate, f64> = benchmark.iter().copied().collect();

    let mut out = Alignment {
        strategy: Vec::with_capacity(strategy.len()),
        benchmark: Vec::with_capacity(strategy.len()),
        dropped: 0,
    };
    for &(period, ret) in strategy {
        if let Some(&bench) = bench_by_period.get(&period) {
            out.strategy.push(ret);
            out.benchmark.push(bench);
        } else {
            out.dropped += 1;
        }
    }
    out.dropped += benchmark.len() - out.benchmark.len();
    out
}

/// Single-factor OLS fit with Newey-West standard errors.
#[derive(Debug, Clone, Serialize)]
pub struct Regression {
    /// Per-period intercept
    pub alpha: f64,
    /// Intercept scaled to a yearly rate
    pub alpha_annualized: f64,
    /// Slope on the benchmark
    pub beta: f64,
    /// Newey-West t-statistic of the intercept; `None` when the HAC
    /// variance is not positive
    pub alpha_t_stat: Option<f64>,
    /// Number of aligned observations used in the fit
    pub observations: usize,
}

/// Fits `y = alpha + beta * x + e` and computes the HAC t-statistic of
/// alpha with Bartlett weights up to `lag` (auto-selected when `None`).
///
/// Returns `None` below 3 observations or when `x` has zero variance.
pub fn ols_newey_west(
    y: &[f64],
    x: &[f64],
    lag: Option<usize>,
    periods_per_year: usize,
) -> Option<Regression> {
    let n = y.len().min(x.len());
    if n < 3 {
        return None;
    }
    let y = &y[..n];
    let x = &x[..n];

    let x_mean = stats::mean(x)?;
    let y_mean = stats::mean(y)?;
    let sxx: f64 = x.iter().map(|&v| (v - x_mean).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(&xv, &yv)| (xv - x_mean) * (yv - y_mean))
        .sum();

    let beta = sxy / sxx;
    let alpha = y_mean - beta * x_mean;

    // HAC sandwich (X'X)^-1 S (X'X)^-1 for the 2-column design [1, x],
    // with S the Bartlett-weighted sum of score outer products
    let residuals: Vec<f64> = y
        .iter()
        .zip(x)
        .map(|(&yv, &xv)| yv - alpha - beta * xv)
        .collect();
    let scores: Vec<[f64; 2]> = residuals
        .iter()
        .zip(x)
        .map(|(&e, &xv)| [e, xv * e])
        .collect();

    let lag = lag
        .unwrap_or_else(|| stats::newey_west_auto_lag(n))
        .min(n - 1);
    let mut s = [[0.0f64; 2]; 2];
    for g in &scores {
        for i in 0..2 {
            for j in 0..2 {
                s[i][j] += g[i] * g[j];
            }
        }
    }
    for l in 1..=lag {
        let weight = 1.0 - l as f64 / (lag as f64 + 1.0);
        for t in l..n {
            let (a, b) = (&scores[t], &scores[t - l]);
            for i in 0..2 {
                for j in 0..2 {
                    s[i][j] += weight * (a[i] * b[j] + b[i] * a[j]);
                }
            }
        }
    }

    let sum_x: f64 = x.iter().sum();
    let sum_xx: f64 = x.iter().map(|&v| v * v).sum();
    let det = n as f64 * sum_xx - sum_x * sum_x;
    let inv = [
        [sum_xx / det, -sum_x / det],
        [-sum_x / det, n as f64 / det],
    ];

    // var(alpha) = (inv * S * inv)[0][0]
    let mut var_alpha = 0.0;
    for i in 0..2 {
        for j in 0..2 {
            var_alpha += inv[0][i] * s[i][j] * inv[j][0];
        }
    }
    let alpha_t_stat = (var_alpha > 0.0).then(|| alpha / var_alpha.sqrt());

    Some(Regression {
        alpha,
        alpha_annualized: alpha * periods_per_year as f64,
        beta,
        alpha_t_stat,
        observations: n,
    })
}

/// Per-period Fama-MacBeth premium: the OLS slope of forward returns on the
/// cross-sectionally z-scored factor.
///
/// `None` below 3 valid pairs or when the factor has zero cross-sectional
/// variance.
pub fn cross_sectional_premium(factor: &[f64], forward: &[f64]) -> Option<f64> {
    let n = factor.len().min(forward.len());
    if n < 3 {
        return None;
    }
    let z = stats::zscores(&factor[..n])?;
    let z_mean = stats::mean(&z)?;
    let r_mean = stats::mean(&forward[..n])?;
    let szz: f64 = z.iter().map(|&v| (v - z_mean).powi(2)).sum();
    if szz == 0.0 {
        return None;
    }
    let szr: f64 = z
        .iter()
        .zip(&forward[..n])
        .map(|(&zv, &rv)| (zv - z_mean) * (rv - r_mean))
        .sum();
    Some(szr / szz)
}
