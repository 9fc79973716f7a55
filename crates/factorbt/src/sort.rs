//! Cross-sectional quantile sorting.
//!
//! Ranks one period's entities by factor value and assigns them to K
//! buckets. The policy is fixed for reproducibility: ascending factor
//! order, ties broken by entity id, and when the entity count is not
//! divisible by K the remainder goes to the lowest-ranked buckets first.

use crate::panel::CrossSection;
use crate::{BacktestError, Result};
use chrono::NaiveDate;
use std::cmp::Ordering;

/// Bucket membership for one period.
///
/// Buckets are 1-based: bucket 1 holds the lowest factor values, bucket K
/// the highest. Entities with a missing factor value are excluded from the
/// assignment entirely.
#[derive(Debug, Clone)]
pub struct BucketAssignment {
    period: NaiveDate,
    members: Vec<Vec<String>>,
}

impl BucketAssignment {
    /// The period this assignment applies to.
    pub const fn period(&self) -> NaiveDate {
        self.period
    }

    /// Number of buckets K.
    pub fn num_buckets(&self) -> usize {
        self.members.len()
    }

    /// Member entity ids of a bucket (1-based), in ascending rank order.
    ///
    /// # Panics
    ///
    /// Panics when `bucket` is outside `[1, K]`.
    pub fn members(&self, bucket: usize) -> &[String] {
        &self.members[bucket - 1]
    }

    /// The bucket an entity was assigned to, if any.
    pub fn bucket_of(&self, entity: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.iter().any(|e| e == entity))
            .map(|i| i + 1)
    }

    /// Total number of assigned entities.
    pub fn assigned(&self) -> usize {
        self.members.iter().map(Vec::len).sum()
    }
}

/// Sorts one cross-section into `num_buckets` rank-quantile buckets.
///
/// Fails with [`BacktestError::InsufficientData`] when fewer than
/// `num_buckets` entities carry a usable factor value, so no bucket can
/// be empty by construction.
pub fn sort_cross_section(
    section: &CrossSection,
    num_buckets: usize,
) -> Result<BucketAssignment> {
    let mut ranked: Vec<(&str, f64)> = section
        .entries
        .iter()
        .filter_map(|e| {
            e.factor
                .filter(|f| f.is_finite())
                .map(|f| (e.entity.as_str(), f))
        })
        .collect();

    if ranked.len() < num_buckets {
        return Err(BacktestError::InsufficientData {
            period: section.period,
            required: num_buckets,
            available: ranked.len(),
        });
    }

    ranked.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let n = ranked.len();
    let base = n / num_buckets;
    let remainder = n % num_buckets;

    let mut members = Vec::with_capacity(num_buckets);
    let mut ranked = ranked.into_iter();
    for bucket in 0..num_buckets {
        let size = base + usize::from(bucket < remainder);
        members.push(
            ranked
                .by_ref()
                .take(size)
                .map(|(entity, _)| entity.to_string())
                .collect(),
        );
    }

    Ok(BucketAssignment {
        period: section.period,
        members,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PanelEntry;
    use rstest::rstest;

    fn section(factors: &[Option<f64>]) -> CrossSection {
        CrossSection {
            period: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            entries: factors
                .iter()
                .enumerate()
                .map(|(i, &factor)| PanelEntry {
                    entity: format!("e{i:02}"),
                    factor,
                    forward_return: 0.0,
                    weight: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn buckets_partition_the_valid_cross_section() {
        let factors: Vec<Option<f64>> = (0..10).map(|i| Some(i as f64)).collect();
        let cs = section(&factors);
        let assignment = sort_cross_section(&cs, 5).unwrap();

        assert_eq!(assignment.num_buckets(), 5);
        assert_eq!(assignment.assigned(), 10);
        for bucket in 1..=5 {
            assert_eq!(assignment.members(bucket).len(), 2);
        }
        // Every factor-valid entity lands in exactly one bucket
        for entry in &cs.entries {
            let hits = (1..=5)
                .filter(|&b| assignment.members(b).contains(&entry.entity))
                .count();
            assert_eq!(hits, 1, "entity {} in {} buckets", entry.entity, hits);
        }
    }

    #[test]
    fn missing_factor_entities_are_never_assigned() {
        let factors = [Some(1.0), None, Some(3.0), Some(2.0), None, Some(4.0)];
        let assignment = sort_cross_section(&section(&factors), 2).unwrap();
        assert_eq!(assignment.assigned(), 4);
        assert_eq!(assignment.bucket_of("e01"), None);
        assert_eq!(assignment.bucket_of("e04"), None);
    }

    #[test]
    fn ascending_rank_order() {
        let factors = [Some(5.0), Some(1.0), Some(4.0), Some(2.0), Some(3.0), Some(6.0)];
        let assignment = sort_cross_section(&section(&factors), 3).unwrap();
        // Lowest factors (1.0, 2.0) in bucket 1, highest (5.0, 6.0) in bucket 3
        assert_eq!(assignment.members(1), ["e01", "e03"]);
        assert_eq!(assignment.members(3), ["e00", "e05"]);
    }

    #[rstest]
    #[case(7, 3, vec![3, 2, 2])]
    #[case(11, 4, vec![3, 3, 3, 2])]
    #[case(10, 5, vec![2, 2, 2, 2, 2])]
    fn remainder_goes_to_lowest_buckets(
        #[case] n: usize,
        #[case] k: usize,
        #[case] expected: Vec<usize>,
    ) {
        let factors: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64)).collect();
        let assignment = sort_cross_section(&section(&factors), k).unwrap();
        let sizes: Vec<usize> = (1..=k).map(|b| assignment.members(b).len()).collect();
        assert_eq!(sizes, expected);
    }

    #[test]
    fn ties_break_by_entity_id() {
        // All factors equal: ordering falls back to entity id
        let factors = [Some(1.0), Some(1.0), Some(1.0), Some(1.0)];
        let assignment = sort_cross_section(&section(&factors), 2).unwrap();
        assert_eq!(assignment.members(1), ["e00", "e01"]);
        assert_eq!(assignment.members(2), ["e02", "e03"]);
    }

    #[test]
    fn too_few_entities_is_an_error() {
        let factors = [Some(1.0), Some(2.0), None];
        let err = sort_cross_section(&section(&factors), 3).unwrap_err();
        match err {
            BacktestError::InsufficientData {
                required,
                available,
                ..
            } => {
                assert_eq!(required, 3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
