//! S2 cell mapping between geographic points and index values.
//!
//! Points linearize to 64-bit leaf cell ids on the S2 space-filling
//! curve; partition keys are decimal prefixes of those ids, so nearby
//! points land in the same partition and a sort-key range scan within
//! one partition covers a contiguous geographic band. The covering
//! functions translate a query region into a conservative set of cell-id
//! intervals in the same value space.

use crate::error::Result;
use crate::types::{QueryPredicate, validate_point};
use geo::{Distance, Haversine, Point};
use s2::cap::Cap;
use s2::cellid::CellID;
use s2::latlng::LatLng;
use s2::point::Point as S2Point;
use s2::region::RegionCoverer;
use s2::s1::{Angle, Deg, Rad};

/// Polar Earth radius in meters. Dividing a surface distance by the
/// minimum radius yields an upper bound on the angular distance, which
/// keeps cap coverings conservative with respect to the Haversine
/// distances used by the post-filter.
const MIN_EARTH_RADIUS_M: f64 = 6_356_752.3;

/// Covering granularity. Up to eight cells between city-block and
/// continent scale; the filter removes whatever over-coverage remains.
const COVERING_MIN_LEVEL: u8 = 4;
const COVERING_MAX_LEVEL: u8 = 16;
const COVERING_MAX_CELLS: usize = 8;

/// Linearized index value of a point: its leaf S2 cell id.
///
/// Deterministic over valid points; out-of-range or non-finite
/// coordinates are rejected.
pub fn index_value(point: &Point) -> Result<u64> {
    validate_point(point)?;
    Ok(CellID::from(latlng(point)).0)
}

/// The leading `length` decimal digits of an index value. Values with
/// `length` digits or fewer pass through unchanged.
pub fn partition_digits(index_value: u64, length: usize) -> u64 {
    let digits = decimal_digits(index_value);
    if length >= digits {
        return index_value;
    }
    index_value / 10u64.pow((digits - length) as u32)
}

/// Render the partition key for an index value, with an optional caller
/// namespace prefix.
pub fn partition_key(index_value: u64, length: usize, prefix: Option<&str>) -> String {
    let digits = partition_digits(index_value, length);
    match prefix {
        Some(prefix) => format!("{prefix}#{digits}"),
        None => digits.to_string(),
    }
}

/// Number of decimal digits in `value`; zero has one digit.
pub(crate) fn decimal_digits(value: u64) -> usize {
    value.checked_ilog10().map_or(1, |log| log as usize + 1)
}

/// Conservative covering of a query region as closed cell-id intervals.
///
/// The region is covered by a spherical cap; a bounding box uses its
/// circumscribed cap. Over-inclusion is by design and removed by the
/// exact geometric filter.
pub fn covering(predicate: &QueryPredicate) -> Vec<(u64, u64)> {
    let (center, radius_meters) = circumscribe(predicate);
    let angle: Angle = Rad(radius_meters / MIN_EARTH_RADIUS_M).into();
    let cap = Cap::from_center_angle(&S2Point::from(latlng(&center)), &angle);

    let coverer = RegionCoverer {
        min_level: COVERING_MIN_LEVEL,
        max_level: COVERING_MAX_LEVEL,
        level_mod: 1,
        max_cells: COVERING_MAX_CELLS,
    };

    coverer
        .covering(&cap)
        .0
        .iter()
        .map(|cell| (cell.range_min().0, cell.range_max().0))
        .collect()
}

/// Center and circumscribing radius of a predicate's region.
fn circumscribe(predicate: &QueryPredicate) -> (Point, f64) {
    match predicate {
        QueryPredicate::Radius {
            center,
            radius_meters,
        } => (*center, *radius_meters),
        QueryPredicate::BoundingBox { rect } => {
            let center = Point::from(rect.center());
            let corners = [
                Point::new(rect.min().x, rect.min().y),
                Point::new(rect.min().x, rect.max().y),
                Point::new(rect.max().x, rect.min().y),
                Point::new(rect.max().x, rect.max().y),
            ];
            let radius = corners
                .iter()
                .map(|corner| Haversine.distance(center, *corner))
                .fold(0.0, f64::max);
            (center, radius)
        }
    }
}

fn latlng(point: &Point) -> LatLng {
    LatLng::new(Deg(point.y()).into(), Deg(point.x()).into())
}
