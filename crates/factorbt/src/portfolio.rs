//! Bucket portfolio construction.
//!
//! Turns one period's bucket assignment into per-bucket returns and holding
//! weights under the configured weighting scheme. Weights are renormalized
//! within each bucket at assignment time; the same weight vectors later feed
//! turnover and the daily reconciler.

use crate::config::Weighting;
use crate::panel::{CrossSection, PanelEntry};
use crate::sort::BucketAssignment;
use crate::{BacktestError, Result};
use chrono::NaiveDate;
use std::collections::HashMap;

/// One bucket's outcome for one period.
#[derive(Debug, Clone)]
pub struct BucketPeriod {
    /// 1-based bucket index
    pub bucket: usize,
    /// Weighted forward return of the bucket
    pub ret: f64,
    /// Renormalized holding weights, summing to 1 over members
    pub weights: HashMap<String, f64>,
}

/// Holding weights per bucket at one rebalance date, consumed by the
/// daily reconciler.
#[derive(Debug, Clone)]
pub struct RebalancePlan {
    /// Rebalance date
    pub date: NaiveDate,
    /// Weight vectors indexed by bucket - 1
    pub buckets: Vec<HashMap<String, f64>>,
}

/// Builds per-bucket returns and weights for one period.
///
/// Equal weighting takes the unweighted mean of member forward returns;
/// value weighting renormalizes the panel weights to sum to 1 within the
/// bucket. A bucket with no members is a fatal invariant violation
/// ([`BacktestError::EmptyBucket`]; the sorter guarantees non-empty
/// buckets), while a value-weighted bucket whose members all carry zero
/// weight is a recoverable [`BacktestError::ZeroBucketWeight`].
pub fn build_portfolios(
    section: &CrossSection,
    assignment: &BucketAssignment,
    weighting: Weighting,
) -> Result<Vec<BucketPeriod>> {
    let by_entity: HashMap<&str, &PanelEntry> = section
        .entries
        .iter()
        .map(|e| (e.entity.as_str(), e))
        .collect();

    let mut out = Vec::with_capacity(assignment.num_buckets());
    for bucket in 1..=assignment.num_buckets() {
        let members = assignment.members(bucket);
        if members.is_empty() {
            return Err(BacktestError::EmptyBucket {
                period: section.period,
                bucket,
            });
        }

        let entries: Vec<&PanelEntry> = members
            .iter()
            .filter_map(|entity| by_entity.get(entity.as_str()).copied())
            .collect();
        debug_assert_eq!(entries.len(), members.len());

        let raw_weights: Vec<f64> = match weighting {
            Weighting::Equal => vec![1.0; entries.len()],
            Weighting::Value => entries.iter().map(|e| e.weight).collect(),
        };
        let total: f64 = raw_weights.iter().sum();
        if total <= 0.0 {
            return Err(BacktestError::ZeroBucketWeight {
                period: section.period,
                bucket,
            });
        }

        let mut ret = 0.0;
        let mut weights = HashMap::with_capacity(entries.len());
        for (entry, raw) in entries.iter().zip(&raw_weights) {
            let w = raw / total;
            ret += w * entry.forward_return;
            weights.insert(entry.entity.clone(), w);
        }

        out.push(BucketPeriod {
            bucket,
            ret,
            weights,
        });
    }
    Ok(out)
}

/// One-way turnover between two holding-weight vectors.
///
/// Half the L1 distance over the union of members: entities entering or
/// leaving contribute their full weight. The result lies in [0, 1] for
/// weight vectors that each sum to 1.
pub fn turnover(previous: &HashMap<String, f64>, current: &HashMap<String, f64>) -> f64 {
    let mut total = 0.0;
    for (entity, &w) in current {
        total += (w - previous.get(entity).copied().unwrap_or(0.0)).abs();
    }
    for (entity, &w) in previous {
        if !current.contains_key(entity) {
            total += w;
        }
    }
    total / 2.0
}

/// Long-short return: top bucket minus bottom bucket.
pub fn long_short_return(buckets: &[BucketPeriod]) -> f64 {
    let top = buckets.last().map_or(0.0, |b| b.ret);
    let bottom = buckets.first().map_or(0.0, |b| b.ret);
    top - bottom
}
