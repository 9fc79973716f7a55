//! Input panel schema, validation, and cross-section extraction.
//!
//! The engine consumes an in-memory polars `DataFrame` with one row per
//! (entity, period). Validation happens once per run; afterwards the panel
//! is reshaped into per-period [`CrossSection`]s that the analyzer iterates
//! in ascending time order.

use crate::{BacktestError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::collections::HashSet;

/// Column names recognized in input frames.
pub mod columns {
    /// Entity identifier, unique within a period
    pub const ENTITY: &str = "entity_id";
    /// Rebalance period, `YYYY-MM-DD`
    pub const PERIOD: &str = "period";
    /// Factor value; nullable
    pub const FACTOR: &str = "factor_value";
    /// Return realized after the period (already shifted upstream)
    pub const FORWARD_RETURN: &str = "forward_return";
    /// Non-negative weight, e.g. market capitalization
    pub const WEIGHT: &str = "weight";
    /// Trading date in the daily price panel, `YYYY-MM-DD`
    pub const DATE: &str = "date";
    /// Price in the daily price panel
    pub const PRICE: &str = "price";
    /// Benchmark period return
    pub const RETURN: &str = "return";
}

/// One panel row inside a cross-section.
#[derive(Debug, Clone)]
pub struct PanelEntry {
    /// Entity identifier
    pub entity: String,
    /// Factor value; `None` when missing or non-finite
    pub factor: Option<f64>,
    /// Forward return realized after the period
    pub forward_return: f64,
    /// Raw weight as supplied in the panel
    pub weight: f64,
}

/// All panel rows sharing one period.
#[derive(Debug, Clone)]
pub struct CrossSection {
    /// The rebalance period
    pub period: NaiveDate,
    /// Member rows; entity ids are unique
    pub entries: Vec<PanelEntry>,
}

/// Parses a `YYYY-MM-DD` date cell.
pub(crate) fn parse_date(raw: &str, column: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        BacktestError::Configuration(format!("column {column}: invalid date '{raw}'"))
    })
}

fn require_columns(df: &DataFrame, names: &[&str]) -> Result<()> {
    let present: HashSet<&str> = df.get_column_names_str().into_iter().collect();
    for name in names {
        if !present.contains(name) {
            return Err(BacktestError::MissingColumn((*name).to_string()));
        }
    }
    Ok(())
}

/// Validates the monthly panel and extracts cross-sections within the
/// configured date range, ordered by ascending period.
///
/// Enforced here: required columns, parseable period dates, unique
/// (entity, period) keys, finite forward returns, and non-negative weights.
/// Rows outside `[start, end]` are dropped.
pub fn extract_cross_sections(
    panel: &DataFrame,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<CrossSection>> {
    require_columns(
        panel,
        &[
            columns::ENTITY,
            columns::PERIOD,
            columns::FACTOR,
            columns::FORWARD_RETURN,
            columns::WEIGHT,
        ],
    )?;

    let entities = panel.column(columns::ENTITY)?.str()?;
    let periods = panel.column(columns::PERIOD)?.str()?;
    let factors = panel.column(columns::FACTOR)?.f64()?;
    let forward_returns = panel.column(columns::FORWARD_RETURN)?.f64()?;
    let weights = panel.column(columns::WEIGHT)?.f64()?;

    let mut by_period: BTreeMap<NaiveDate, Vec<PanelEntry>> = BTreeMap::new();
    let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();

    for row in 0..panel.height() {
        let entity = entities.get(row).ok_or_else(|| {
            BacktestError::Configuration(format!("null entity_id at row {row}"))
        })?;
        let raw_period = periods.get(row).ok_or_else(|| {
            BacktestError::Configuration(format!("null period at row {row}"))
        })?;
        let period = parse_date(raw_period, columns::PERIOD)?;

        if start.is_some_and(|s| period < s) || end.is_some_and(|e| period > e) {
            continue;
        }

        let forward_return = forward_returns.get(row).ok_or_else(|| {
            BacktestError::Configuration(format!(
                "null forward_return for {entity} at {period}"
            ))
        })?;
        if !forward_return.is_finite() {
            return Err(BacktestError::Configuration(format!(
                "non-finite forward_return for {entity} at {period}"
            )));
        }

        let weight = weights.get(row).unwrap_or(0.0);
        if !weight.is_finite() || weight < 0.0 {
            return Err(BacktestError::Configuration(format!(
                "weight must be finite and non-negative, got {weight} for {entity} at {period}"
            )));
        }

        if !seen.insert((period, entity.to_string())) {
            return Err(BacktestError::DuplicateRecord {
                entity: entity.to_string(),
                period,
            });
        }

        by_period.entry(period).or_default().push(PanelEntry {
            entity: entity.to_string(),
            factor: factors.get(row).filter(|f| f.is_finite()),
            forward_return,
            weight,
        });
    }

    Ok(by_period
        .into_iter()
        .map(|(period, entries)| CrossSection { period, entries })
        .collect())
}

/// Extracts a benchmark series as (period, return) pairs in ascending order.
pub fn extract_benchmark(benchmark: &DataFrame) -> Result<Vec<(NaiveDate, f64)>> {
    require_columns(benchmark, &[columns::PERIOD, columns::RETURN])?;

    let periods = benchmark.column(columns::PERIOD)?.str()?;
    let returns = benchmark.column(columns::RETURN)?.f64()?;

    let mut out: Vec<(NaiveDate, f64)> = Vec::with_capacity(benchmark.height());
    for row in 0..benchmark.height() {
        let raw_period = periods.get(row).ok_or_else(|| {
            BacktestError::Configuration(format!("null benchmark period at row {row}"))
        })?;
        let period = parse_date(raw_period, columns::PERIOD)?;
        let ret = returns.get(row).ok_or_else(|| {
            BacktestError::Configuration(format!("null benchmark return at {period}"))
        })?;
        out.push((period, ret));
    }
    out.sort_by_key(|&(period, _)| period);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn panel() -> DataFrame {
        df![
            columns::ENTITY => ["a", "b", "a", "b"],
            columns::PERIOD => ["2024-01-31", "2024-01-31", "2024-02-29", "2024-02-29"],
            columns::FACTOR => [Some(1.0), Some(2.0), None, Some(4.0)],
            columns::FORWARD_RETURN => [0.01, 0.02, 0.03, 0.04],
            columns::WEIGHT => [100.0, 200.0, 100.0, 200.0],
        ]
        .unwrap()
    }

    #[test]
    fn extracts_sections_in_ascending_order() {
        let sections = extract_cross_sections(&panel(), None, None).unwrap();
        assert_eq!(sections.len(), 2);
        assert!(sections[0].period < sections[1].period);
        assert_eq!(sections[0].entries.len(), 2);
        // Missing factor value survives extraction as None
        assert!(sections[1].entries.iter().any(|e| e.factor.is_none()));
    }

    #[test]
    fn date_range_slices_periods() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1);
        let sections = extract_cross_sections(&panel(), start, None).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(
            sections[0].period,
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn rejects_duplicate_keys() {
        let df = df![
            columns::ENTITY => ["a", "a"],
            columns::PERIOD => ["2024-01-31", "2024-01-31"],
            columns::FACTOR => [1.0, 2.0],
            columns::FORWARD_RETURN => [0.01, 0.02],
            columns::WEIGHT => [1.0, 1.0],
        ]
        .unwrap();
        assert!(matches!(
            extract_cross_sections(&df, None, None),
            Err(BacktestError::DuplicateRecord { .. })
        ));
    }

    #[test]
    fn rejects_missing_column() {
        let df = df![
            columns::ENTITY => ["a"],
            columns::PERIOD => ["2024-01-31"],
        ]
        .unwrap();
        assert!(matches!(
            extract_cross_sections(&df, None, None),
            Err(BacktestError::MissingColumn(_))
        ));
    }

    #[test]
    fn rejects_negative_weight() {
        let df = df![
            columns::ENTITY => ["a"],
            columns::PERIOD => ["2024-01-31"],
            columns::FACTOR => [1.0],
            columns::FORWARD_RETURN => [0.01],
            columns::WEIGHT => [-1.0],
        ]
        .unwrap();
        assert!(extract_cross_sections(&df, None, None).is_err());
    }

    #[test]
    fn benchmark_extraction_sorts_by_period() {
        let df = df![
            columns::PERIOD => ["2024-02-29", "2024-01-31"],
            columns::RETURN => [0.02, 0.01],
        ]
        .unwrap();
        let series = extract_benchmark(&df).unwrap();
        assert_eq!(series[0].1, 0.01);
        assert_eq!(series[1].1, 0.02);
    }
}
