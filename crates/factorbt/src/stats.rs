//! Time-series and cross-sectional statistics.
//!
//! Pure functions over return and factor slices. Every statistic that can be
//! undefined for a window returns `Option<f64>`: missing is reported as
//! missing, never as zero.

use crate::config::IcMethod;

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator). `None` below 2 observations.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Annualized Sharpe ratio: mean / stdev scaled by sqrt(periods per year).
///
/// `None` when the standard deviation is zero or undefined.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: usize) -> Option<f64> {
    let sd = std_dev(returns)?;
    if sd == 0.0 {
        return None;
    }
    let m = mean(returns)?;
    Some(m / sd * (periods_per_year as f64).sqrt())
}

/// Annualized geometric return from periodic simple returns.
pub fn annualized_return(returns: &[f64], periods_per_year: usize) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let growth = returns.iter().fold(1.0, |acc, &r| acc * (1.0 + r));
    if growth <= 0.0 {
        // Total loss or worse; the geometric rate is undefined
        return None;
    }
    let exponent = periods_per_year as f64 / returns.len() as f64;
    Some(growth.powf(exponent) - 1.0)
}

/// Annualized volatility: sample stdev scaled by sqrt(periods per year).
pub fn annualized_volatility(returns: &[f64], periods_per_year: usize) -> Option<f64> {
    std_dev(returns).map(|sd| sd * (periods_per_year as f64).sqrt())
}

/// Fraction of periods with a strictly positive return.
pub fn win_rate(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let wins = returns.iter().filter(|&&r| r > 0.0).count();
    Some(wins as f64 / returns.len() as f64)
}

/// Maximum drawdown of the compounded series.
///
/// Returns the minimum of `cumulative(t) / running_max(t) - 1`, a value
/// in [-1, 0]. `None` for an empty series.
pub fn max_drawdown(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let mut equity = 1.0f64;
    let mut peak = 1.0f64;
    let mut worst = 0.0f64;
    for &r in returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        worst = worst.min(equity / peak - 1.0);
    }
    Some(worst)
}

/// Automatic Newey-West lag: floor(n^(1/3)), truncated to n - 1.
///
/// The same rule is applied to every series so t-statistics stay comparable
/// across runs and sample frequencies.
pub fn newey_west_auto_lag(n: usize) -> usize {
    if n < 2 {
        return 0;
    }
    ((n as f64).cbrt().floor() as usize).min(n - 1)
}

/// Newey-West t-statistic for the mean of a serially correlated series.
///
/// Uses Bartlett kernel weights `1 - l / (lag + 1)` over autocovariances up
/// to `lag` (auto-selected when `None`). `None` below 2 observations or when
/// the long-run variance is not positive.
pub fn newey_west_t_stat(values: &[f64], lag: Option<usize>) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let lag = lag.unwrap_or_else(|| newey_west_auto_lag(n)).min(n - 1);

    let autocovariance = |l: usize| -> f64 {
        values[l..]
            .iter()
            .zip(values.iter())
            .map(|(&a, &b)| (a - m) * (b - m))
            .sum::<f64>()
            / n as f64
    };

    let mut long_run_variance = autocovariance(0);
    for l in 1..=lag {
        let weight = 1.0 - l as f64 / (lag as f64 + 1.0);
        long_run_variance += 2.0 * weight * autocovariance(l);
    }
    if long_run_variance <= 0.0 {
        return None;
    }
    Some(m / (long_run_variance / n as f64).sqrt())
}

/// Pearson linear correlation. `None` below 2 pairs or with zero variance
/// on either side.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mx = mean(&x[..n])?;
    let my = mean(&y[..n])?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(sxy / denom)
}

/// Spearman rank correlation: Pearson correlation of tie-averaged ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    pearson(&ranks(&x[..n]), &ranks(&y[..n]))
}

/// Tie-averaged ascending ranks, 1-based.
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut out = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        // Extend over the run of tied values and assign the average rank
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            out[idx] = avg_rank;
        }
        i = j + 1;
    }
    out
}

/// Information coefficient between factor values and forward returns for one
/// cross-section. `None` below 3 valid pairs.
pub fn information_coefficient(factor: &[f64], forward: &[f64], method: IcMethod) -> Option<f64> {
    if factor.len() < 3 || forward.len() < 3 {
        return None;
    }
    match method {
        IcMethod::Rank => spearman(factor, forward),
        IcMethod::Linear => pearson(factor, forward),
    }
}

/// Cross-sectional z-scores. `None` when the standard deviation is zero or
/// fewer than 2 values are supplied.
pub fn zscores(values: &[f64]) -> Option<Vec<f64>> {
    let m = mean(values)?;
    let sd = std_dev(values)?;
    if sd == 0.0 {
        return None;
    }
    Some(values.iter().map(|&x| (x - m) / sd).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn mean_and_std() {
        assert_eq!(mean(&[]), None);
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0]).unwrap(), 2.0);
        assert_eq!(std_dev(&[1.0]), None);
        assert_relative_eq!(std_dev(&[1.0, 2.0, 3.0]).unwrap(), 1.0);
    }

    #[test]
    fn sharpe_undefined_for_constant_series() {
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 12), None);
    }

    #[test]
    fn sharpe_matches_hand_computation() {
        let returns = [0.02, -0.01, 0.03, 0.00];
        let m = mean(&returns).unwrap();
        let sd = std_dev(&returns).unwrap();
        let expected = m / sd * 12f64.sqrt();
        assert_relative_eq!(sharpe_ratio(&returns, 12).unwrap(), expected);
    }

    #[test]
    fn drawdown_of_rise_then_fall() {
        // 1.0 -> 1.1 -> 0.9 is an 18.18% drawdown from the peak
        let dd = max_drawdown(&[0.10, -0.18182]).unwrap();
        assert_relative_eq!(dd, 0.9 / 1.1 - 1.0, epsilon = 1e-4);
    }

    #[test]
    fn drawdown_never_positive() {
        let dd = max_drawdown(&[0.05, 0.02, 0.01]).unwrap();
        assert_eq!(dd, 0.0);
    }

    #[rstest]
    #[case(8, 2)]
    #[case(27, 3)]
    #[case(216, 6)]
    #[case(1000, 10)]
    fn auto_lag_is_truncated_cube_root(#[case] n: usize, #[case] expected: usize) {
        assert_eq!(newey_west_auto_lag(n), expected);
    }

    #[test]
    fn newey_west_at_lag_zero_matches_classical_t() {
        let values = [0.02, -0.01, 0.03, 0.01, -0.02, 0.04, 0.00, 0.02];
        let m = mean(&values).unwrap();
        // Classical t with the population variance estimator (1/n), which is
        // what the lag-0 long-run variance reduces to
        let var = values.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
        let classical = m / (var / values.len() as f64).sqrt();
        let nw = newey_west_t_stat(&values, Some(0)).unwrap();
        assert_relative_eq!(nw, classical, epsilon = 1e-12);
    }

    #[test]
    fn newey_west_shrinks_t_under_positive_autocorrelation() {
        // A slowly mean-reverting positive series has positive autocorrelation,
        // so the corrected t-stat must be smaller than the classical one
        let values: Vec<f64> = (0..48).map(|i| 0.01 + 0.005 * (i as f64 / 8.0).sin()).collect();
        let t0 = newey_west_t_stat(&values, Some(0)).unwrap();
        let t6 = newey_west_t_stat(&values, Some(6)).unwrap();
        assert!(t6.abs() < t0.abs());
    }

    #[test]
    fn pearson_on_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert_relative_eq!(pearson(&x, &y).unwrap(), 1.0);
        let y_neg = [8.0, 6.0, 4.0, 2.0];
        assert_relative_eq!(pearson(&x, &y_neg).unwrap(), -1.0);
    }

    #[test]
    fn spearman_invariant_under_monotone_transform() {
        let x = [0.3f64, 1.2, 0.7, 2.5, 1.9, 0.1];
        let y = [0.01, 0.04, 0.02, 0.09, 0.05, -0.01];
        let transformed: Vec<f64> = x.iter().map(|&v| (v * 3.0).exp()).collect();
        assert_relative_eq!(
            spearman(&x, &y).unwrap(),
            spearman(&transformed, &y).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn ranks_average_ties() {
        assert_eq!(ranks(&[3.0, 1.0, 2.0]), vec![3.0, 1.0, 2.0]);
        // Two tied values share rank (2 + 3) / 2 = 2.5
        assert_eq!(ranks(&[1.0, 2.0, 2.0, 4.0]), vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn ic_requires_three_entities() {
        assert_eq!(
            information_coefficient(&[1.0, 2.0], &[0.1, 0.2], IcMethod::Rank),
            None
        );
        assert!(
            information_coefficient(&[1.0, 2.0, 3.0], &[0.1, 0.2, 0.3], IcMethod::Rank).is_some()
        );
    }

    #[test]
    fn ic_on_factor_equals_ic_on_rank_of_factor() {
        let factor = [0.5, 2.0, 1.1, 3.3, 0.9];
        let forward = [0.01, 0.05, 0.03, 0.02, -0.01];
        let on_raw = information_coefficient(&factor, &forward, IcMethod::Rank).unwrap();
        let on_ranks = information_coefficient(&ranks(&factor), &forward, IcMethod::Rank).unwrap();
        assert_relative_eq!(on_raw, on_ranks, epsilon = 1e-12);
    }

    #[test]
    fn zscores_are_centered_and_scaled() {
        let z = zscores(&[1.0, 2.0, 3.0]).unwrap();
        assert_relative_eq!(z[0], -1.0);
        assert_relative_eq!(z[1], 0.0);
        assert_relative_eq!(z[2], 1.0);
        assert_eq!(zscores(&[2.0, 2.0, 2.0]), None);
    }

    #[test]
    fn annualization_round_trip() {
        // Twelve months of 1% compounds to (1.01)^12 - 1 annualized
        let returns = [0.01; 12];
        assert_relative_eq!(
            annualized_return(&returns, 12).unwrap(),
            1.01f64.powi(12) - 1.0,
            epsilon = 1e-12
        );
        assert_eq!(win_rate(&returns), Some(1.0));
    }
}
