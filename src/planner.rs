//! Translation of covering intervals into partition-aligned query plans.

use crate::cell;
use crate::error::{GeoTableError, Result};
use crate::range::GeohashRange;
use crate::types::{Config, QueryPredicate};
use smallvec::SmallVec;

/// One unit of store work: an exact-match partition key plus a sort-key
/// range scan within that partition. Produced here, consumed by the
/// coordinator, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub partition_key: String,
    pub range: GeohashRange,
}

/// Plan the store scans for a query predicate.
///
/// The predicate's covering intervals are coalesced into a minimal set
/// of contiguous ranges, each range is split along partition boundaries,
/// and one plan is emitted per sub-range with the partition key derived
/// from its min bound. Exceeding the fan-out budget fails before any
/// store call is issued.
pub fn plan_query(
    predicate: &QueryPredicate,
    prefix: Option<&str>,
    config: &Config,
) -> Result<Vec<QueryPlan>> {
    let ranges = coalesce(cell::covering(predicate));

    let mut plans = Vec::with_capacity(ranges.len());
    for range in &ranges {
        for sub in range.split(config.partition_key_length) {
            plans.push(QueryPlan {
                partition_key: cell::partition_key(
                    sub.min(),
                    config.partition_key_length,
                    prefix,
                ),
                range: sub,
            });
        }
    }

    if plans.len() > config.max_fan_out {
        return Err(GeoTableError::FanOutExceeded {
            planned: plans.len(),
            budget: config.max_fan_out,
            query: predicate.to_string(),
        });
    }

    Ok(plans)
}

/// Coalesce raw intervals into a minimal set of contiguous ranges.
///
/// First-fit greedy merging, repeated until no pass merges anything, so
/// the result is a fixed point independent of input order. Covering sets
/// are tens of intervals; the quadratic scan is fine.
pub(crate) fn coalesce(
    intervals: impl IntoIterator<Item = (u64, u64)>,
) -> SmallVec<[GeohashRange; 8]> {
    let mut ranges: SmallVec<[GeohashRange; 8]> = intervals
        .into_iter()
        .map(|(min, max)| GeohashRange::new(min, max))
        .collect();

    loop {
        let before = ranges.len();
        let mut merged: SmallVec<[GeohashRange; 8]> = SmallVec::new();
        for range in ranges {
            if !merged.iter_mut().any(|existing| existing.try_merge(&range)) {
                merged.push(range);
            }
        }
        if merged.len() == before {
            return merged;
        }
        ranges = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn sorted(ranges: &SmallVec<[GeohashRange; 8]>) -> Vec<GeohashRange> {
        let mut out: Vec<GeohashRange> = ranges.iter().copied().collect();
        out.sort();
        out
    }

    #[test]
    fn coalesce_merges_adjacent_and_overlapping() {
        let ranges = coalesce([(10, 20), (21, 30), (25, 40), (100, 110)]);
        assert_eq!(
            sorted(&ranges),
            vec![GeohashRange::new(10, 40), GeohashRange::new(100, 110)]
        );
    }

    #[test]
    fn coalesce_reaches_a_fixed_point_regardless_of_order() {
        // The middle interval bridges the outer two; whichever is seen
        // first, the fixed point is a single range.
        let orders: [&[(u64, u64)]; 3] = [
            &[(0, 1), (4, 5), (2, 3)],
            &[(4, 5), (0, 1), (2, 3)],
            &[(2, 3), (0, 1), (4, 5)],
        ];
        for order in orders {
            let ranges = coalesce(order.iter().copied());
            assert_eq!(sorted(&ranges), vec![GeohashRange::new(0, 5)]);
        }
    }

    #[test]
    fn coalesce_keeps_disjoint_ranges_apart() {
        let ranges = coalesce([(0, 10), (20, 30), (40, 50)]);
        assert_eq!(ranges.len(), 3);
    }

    #[test]
    fn plans_are_deterministic_and_partition_aligned() {
        let config = Config::new("places");
        let predicate = QueryPredicate::Radius {
            center: Point::new(-122.3, 47.5),
            radius_meters: 500.0,
        };

        let first = plan_query(&predicate, None, &config).unwrap();
        let second = plan_query(&predicate, None, &config).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());

        for plan in &first {
            assert_eq!(
                plan.partition_key,
                cell::partition_key(plan.range.min(), config.partition_key_length, None)
            );
            assert_eq!(
                cell::partition_digits(plan.range.min(), config.partition_key_length),
                cell::partition_digits(plan.range.max(), config.partition_key_length),
            );
        }
    }

    #[test]
    fn plans_never_overlap() {
        let config = Config::new("places");
        let predicate = QueryPredicate::Radius {
            center: Point::new(2.3522, 48.8566),
            radius_meters: 2_000.0,
        };

        let mut plans = plan_query(&predicate, None, &config).unwrap();
        plans.sort_by_key(|plan| plan.range.min());
        for pair in plans.windows(2) {
            assert!(pair[0].range.max() < pair[1].range.min());
        }
    }

    #[test]
    fn prefix_is_folded_into_every_partition_key() {
        let config = Config::new("places");
        let predicate = QueryPredicate::Radius {
            center: Point::new(-0.1278, 51.5074),
            radius_meters: 300.0,
        };

        let plans = plan_query(&predicate, Some("tenant-a"), &config).unwrap();
        assert!(
            plans
                .iter()
                .all(|plan| plan.partition_key.starts_with("tenant-a#"))
        );
    }

    #[test]
    fn budget_overrun_fails_before_any_store_work() {
        let config = Config::new("places").with_max_fan_out(1);
        // Continent-scale radius: the covering cannot collapse into a
        // single partition-aligned scan.
        let predicate = QueryPredicate::Radius {
            center: Point::new(45.0, 45.0),
            radius_meters: 5_000_000.0,
        };

        match plan_query(&predicate, None, &config) {
            Err(GeoTableError::FanOutExceeded {
                planned, budget, ..
            }) => {
                assert!(planned > 1);
                assert_eq!(budget, 1);
            }
            other => panic!("expected FanOutExceeded, got {other:?}"),
        }
    }
}
