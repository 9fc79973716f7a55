//! Monthly-to-daily frequency reconciliation.
//!
//! Reconstructs daily bucket returns from monthly rebalance decisions and a
//! daily price panel. Between two rebalance dates each bucket is held
//! buy-and-hold: weights are set at the rebalance date and drift only with
//! prices. At the next rebalance date the day's return is still realized
//! under the old holdings; membership resets at that day's close, so no
//! assignment is ever applied to days before its rebalance date.
//!
//! An entity with a missing price that trades again later is held flat at
//! its previous price. An entity that never trades again is removed on its
//! first non-trading day, and the survivors' relative values carry the
//! bucket from that day forward.

use crate::panel::columns;
use crate::portfolio::RebalancePlan;
use crate::{BacktestError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Daily price panel, indexed per entity.
#[derive(Debug, Clone)]
pub struct DailyPrices {
    calendar: Vec<NaiveDate>,
    series: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl DailyPrices {
    /// Builds the index from a frame with `entity_id`, `date`, `price`
    /// columns. Null price rows mark non-trading days and are skipped;
    /// non-positive or non-finite prices are rejected.
    pub fn from_frame(frame: &DataFrame) -> Result<Self> {
        for name in [columns::ENTITY, columns::DATE, columns::PRICE] {
            if frame.column(name).is_err() {
                return Err(BacktestError::MissingColumn(name.to_string()));
            }
        }
        let entities = frame.column(columns::ENTITY)?.str()?;
        let dates = frame.column(columns::DATE)?.str()?;
        let prices = frame.column(columns::PRICE)?.f64()?;

        let mut series: HashMap<String, BTreeMap<NaiveDate, f64>> = HashMap::new();
        let mut calendar: Vec<NaiveDate> = Vec::new();
        for row in 0..frame.height() {
            let (Some(entity), Some(raw_date)) = (entities.get(row), dates.get(row)) else {
                return Err(BacktestError::Configuration(format!(
                    "null entity_id or date in daily panel at row {row}"
                )));
            };
            let date = crate::panel::parse_date(raw_date, columns::DATE)?;
            let Some(price) = prices.get(row) else {
                continue;
            };
            if !price.is_finite() || price <= 0.0 {
                return Err(BacktestError::Configuration(format!(
                    "price must be finite and positive, got {price} for {entity} at {date}"
                )));
            }
            series
                .entry(entity.to_string())
                .or_default()
                .insert(date, price);
            calendar.push(date);
        }
        calendar.sort_unstable();
        calendar.dedup();
        Ok(Self { calendar, series })
    }

    /// Sorted unique trading dates.
    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    fn has_date(&self, date: NaiveDate) -> bool {
        self.calendar.binary_search(&date).is_ok()
    }

    fn price_on(&self, entity: &str, date: NaiveDate) -> Option<f64> {
        self.series.get(entity)?.get(&date).copied()
    }

    fn price_on_or_before(&self, entity: &str, date: NaiveDate) -> Option<f64> {
        self.series
            .get(entity)?
            .range(..=date)
            .next_back()
            .map(|(_, &p)| p)
    }

    /// Whether the entity has no price on `date` or any later date.
    fn is_delisted(&self, entity: &str, date: NaiveDate) -> bool {
        self.series
            .get(entity)
            .is_none_or(|s| s.range(date..).next().is_none())
    }
}

/// Daily returns per bucket between the first and last rebalance date.
#[derive(Debug, Clone, Serialize)]
pub struct DailyReturnSeries {
    /// Trading dates, ascending
    pub dates: Vec<NaiveDate>,
    /// Daily returns indexed by bucket - 1, aligned with `dates`
    pub buckets: Vec<Vec<f64>>,
    /// Top bucket minus bottom bucket, aligned with `dates`
    pub long_short: Vec<f64>,
}

impl DailyReturnSeries {
    /// Renders the series as a frame with `date`, `Q1`..`QK`, and
    /// `long_short` columns.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut cols: Vec<Column> = Vec::with_capacity(self.buckets.len() + 2);
        cols.push(Column::new(
            columns::DATE.into(),
            self.dates
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>(),
        ));
        for (i, bucket) in self.buckets.iter().enumerate() {
            cols.push(Column::new(format!("Q{}", i + 1).into(), bucket.clone()));
        }
        cols.push(Column::new("long_short".into(), self.long_short.clone()));
        Ok(DataFrame::new(cols)?)
    }
}

#[derive(Debug)]
struct Holding {
    units: f64,
    last_price: f64,
}

/// Opens buy-and-hold positions for one rebalance date.
///
/// Units are sized so each entity's initial value equals its renormalized
/// weight. An entity with no price history by the rebalance date cannot be
/// bought; the survivors carry the bucket.
fn open_positions(plan: &RebalancePlan, prices: &DailyPrices) -> Vec<HashMap<String, Holding>> {
    plan.buckets
        .iter()
        .map(|weights| {
            weights
                .iter()
                .filter_map(|(entity, &w)| {
                    let price = prices.price_on_or_before(entity, plan.date)?;
                    Some((
                        entity.clone(),
                        Holding {
                            units: w / price,
                            last_price: price,
                        },
                    ))
                })
                .collect()
        })
        .collect()
}

/// Reconstructs daily bucket returns across all rebalance intervals.
///
/// `plans` must be in ascending date order (the analyzer produces them that
/// way). Fails with [`BacktestError::MisalignedDates`] when a rebalance date
/// is not a trading day in the daily calendar. Fewer than two rebalance
/// dates yield an empty series.
pub fn reconcile(plans: &[RebalancePlan], prices: &DailyPrices) -> Result<DailyReturnSeries> {
    for plan in plans {
        if !prices.has_date(plan.date) {
            return Err(BacktestError::MisalignedDates(plan.date));
        }
    }
    debug_assert!(plans.windows(2).all(|w| w[0].date < w[1].date));

    let num_buckets = plans.first().map_or(0, |p| p.buckets.len());
    let mut series = DailyReturnSeries {
        dates: Vec::new(),
        buckets: vec![Vec::new(); num_buckets],
        long_short: Vec::new(),
    };
    if plans.len() < 2 {
        return Ok(series);
    }

    let first = plans[0].date;
    let last = plans[plans.len() - 1].date;
    let mut holdings = open_positions(&plans[0], prices);
    let mut next_plan = 1;

    for &day in prices.calendar() {
        if day <= first {
            continue;
        }
        if day > last {
            break;
        }

        for (bucket_idx, positions) in holdings.iter_mut().enumerate() {
            // Entities that never trade again leave the portfolio today;
            // their value drops out of both sides of the day's return
            positions.retain(|entity, _| !prices.is_delisted(entity, day));

            let value_before: f64 = positions.values().map(|h| h.units * h.last_price).sum();
            if value_before <= 0.0 {
                return Err(BacktestError::EmptyBucket {
                    period: day,
                    bucket: bucket_idx + 1,
                });
            }

            let mut value_after = 0.0;
            for (entity, holding) in positions.iter_mut() {
                if let Some(price) = prices.price_on(entity, day) {
                    holding.last_price = price;
                }
                // No quote today: held flat at the previous price
                value_after += holding.units * holding.last_price;
            }

            series.buckets[bucket_idx].push(value_after / value_before - 1.0);
        }

        series.dates.push(day);
        let top = *series.buckets[num_buckets - 1].last().unwrap_or(&0.0);
        let bottom = *series.buckets[0].last().unwrap_or(&0.0);
        series.long_short.push(top - bottom);

        // The rebalance day's return realizes under the old holdings;
        // the new assignment takes effect at the close
        if next_plan < plans.len() && day == plans[next_plan].date {
            holdings = open_positions(&plans[next_plan], prices);
            next_plan += 1;
        }
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use polars::df;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn daily_frame(rows: &[(&str, u32, Option<f64>)]) -> DataFrame {
        let entities: Vec<&str> = rows.iter().map(|r| r.0).collect();
        let dates: Vec<String> = rows.iter().map(|r| date(r.1).to_string()).collect();
        let prices: Vec<Option<f64>> = rows.iter().map(|r| r.2).collect();
        df![
            columns::ENTITY => entities,
            columns::DATE => dates,
            columns::PRICE => prices,
        ]
        .unwrap()
    }

    fn plan(day: u32, buckets: Vec<Vec<(&str, f64)>>) -> RebalancePlan {
        RebalancePlan {
            date: date(day),
            buckets: buckets
                .into_iter()
                .map(|b| b.into_iter().map(|(e, w)| (e.to_string(), w)).collect())
                .collect(),
        }
    }

    #[test]
    fn single_entity_round_trip() {
        // One entity held at weight 1 over the whole interval: compounded
        // daily returns must equal the entity's own price return
        let prices = DailyPrices::from_frame(&daily_frame(&[
            ("a", 2, Some(100.0)),
            ("a", 3, Some(104.0)),
            ("a", 4, Some(101.0)),
            ("a", 5, Some(110.0)),
            ("b", 2, Some(50.0)),
            ("b", 3, Some(51.0)),
            ("b", 4, Some(49.0)),
            ("b", 5, Some(52.0)),
        ]))
        .unwrap();

        let plans = [
            plan(2, vec![vec![("b", 1.0)], vec![("a", 1.0)]]),
            plan(5, vec![vec![("b", 1.0)], vec![("a", 1.0)]]),
        ];
        let series = reconcile(&plans, &prices).unwrap();

        assert_eq!(series.dates, vec![date(3), date(4), date(5)]);
        let compounded: f64 = series.buckets[1]
            .iter()
            .fold(1.0, |acc, &r| acc * (1.0 + r));
        assert_relative_eq!(compounded, 110.0 / 100.0, epsilon = 1e-12);
    }

    #[test]
    fn rebalance_resets_weights_without_lookahead() {
        let prices = DailyPrices::from_frame(&daily_frame(&[
            ("a", 2, Some(100.0)),
            ("a", 3, Some(110.0)),
            ("a", 4, Some(110.0)),
            ("b", 2, Some(100.0)),
            ("b", 3, Some(100.0)),
            ("b", 4, Some(120.0)),
        ]))
        .unwrap();

        // Bucket holds only "a" until day 3, then only "b"
        let plans = [
            plan(2, vec![vec![("a", 1.0)], vec![("a", 1.0)]]),
            plan(3, vec![vec![("b", 1.0)], vec![("b", 1.0)]]),
            plan(4, vec![vec![("b", 1.0)], vec![("b", 1.0)]]),
        ];
        let series = reconcile(&plans, &prices).unwrap();

        // Day 3 realizes a's move (the old holding), day 4 realizes b's
        assert_relative_eq!(series.buckets[0][0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(series.buckets[0][1], 0.20, epsilon = 1e-12);
    }

    #[test]
    fn halted_entity_is_held_flat() {
        let prices = DailyPrices::from_frame(&daily_frame(&[
            ("a", 2, Some(100.0)),
            ("a", 3, None), // halt: no quote, trades again later
            ("a", 4, Some(120.0)),
            ("b", 2, Some(100.0)),
            ("b", 3, Some(100.0)),
            ("b", 4, Some(100.0)),
        ]))
        .unwrap();

        let plans = [
            plan(2, vec![vec![("a", 0.5), ("b", 0.5)], vec![("a", 0.5), ("b", 0.5)]]),
            plan(4, vec![vec![("a", 0.5), ("b", 0.5)], vec![("a", 0.5), ("b", 0.5)]]),
        ];
        let series = reconcile(&plans, &prices).unwrap();

        // Day 3: a is flat, b is flat -> zero return
        assert_relative_eq!(series.buckets[0][0], 0.0, epsilon = 1e-12);
        // Day 4: a jumps 20% with half the value -> 10% bucket return
        assert_relative_eq!(series.buckets[0][1], 0.10, epsilon = 1e-12);
    }

    #[test]
    fn delisted_entity_is_removed_and_survivors_renormalize() {
        let prices = DailyPrices::from_frame(&daily_frame(&[
            ("a", 2, Some(100.0)),
            ("a", 3, Some(100.0)), // last trade on day 3
            ("b", 2, Some(100.0)),
            ("b", 3, Some(100.0)),
            ("b", 4, Some(110.0)),
            ("b", 5, Some(121.0)),
        ]))
        .unwrap();

        let plans = [
            plan(2, vec![vec![("a", 0.5), ("b", 0.5)], vec![("a", 0.5), ("b", 0.5)]]),
            plan(5, vec![vec![("b", 1.0)], vec![("b", 1.0)]]),
        ];
        let series = reconcile(&plans, &prices).unwrap();

        // Day 3: both flat, zero return
        assert_relative_eq!(series.buckets[0][0], 0.0, epsilon = 1e-12);
        // Day 4: a is removed (no price today or later); the bucket is
        // carried by b alone, so it realizes b's full 10% move
        assert_relative_eq!(series.buckets[0][1], 0.10, epsilon = 1e-12);
        // Day 5: still b alone
        assert_relative_eq!(series.buckets[0][2], 0.10, epsilon = 1e-12);
    }

    #[test]
    fn rebalance_date_off_calendar_is_misaligned() {
        let prices = DailyPrices::from_frame(&daily_frame(&[
            ("a", 2, Some(100.0)),
            ("a", 4, Some(101.0)),
        ]))
        .unwrap();
        let plans = [
            plan(2, vec![vec![("a", 1.0)]]),
            plan(3, vec![vec![("a", 1.0)]]), // day 3 is not a trading day
        ];
        let err = reconcile(&plans, &prices).unwrap_err();
        assert!(matches!(err, BacktestError::MisalignedDates(d) if d == date(3)));
    }

    #[test]
    fn fewer_than_two_rebalances_yield_empty_series() {
        let prices = DailyPrices::from_frame(&daily_frame(&[("a", 2, Some(100.0))])).unwrap();
        let series = reconcile(&[plan(2, vec![vec![("a", 1.0)]])], &prices).unwrap();
        assert!(series.dates.is_empty());
        assert!(series.buckets[0].is_empty());
    }

    #[test]
    fn to_frame_has_one_column_per_bucket() {
        let series = DailyReturnSeries {
            dates: vec![date(3), date(4)],
            buckets: vec![vec![0.01, 0.02], vec![0.03, 0.04]],
            long_short: vec![0.02, 0.02],
        };
        let frame = series.to_frame().unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(
            frame.get_column_names_str(),
            vec!["date", "Q1", "Q2", "long_short"]
        );
    }
}
