//! Configuration and data-transfer types.

use crate::error::{GeoTableError, Result};
use crate::store::RangePage;
use geo::{Contains, Distance, Haversine, Point, Rect};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Attribute map stored in and returned by the range store.
///
/// Rows written by [`crate::GeoTable::put_point`] carry the partition
/// key, sort key, index value, coordinates, and a GeoJSON rendering of
/// the point under the attribute names in [`Config`], merged over the
/// caller's own attributes.
pub type Item = Map<String, Value>;

/// Index configuration, immutable once a table is constructed.
///
/// Deserializable from JSON or any other serde format; every field but
/// `table_name` has a default.
///
/// # Example
///
/// ```rust
/// use geotable::Config;
///
/// let config = Config::new("cities")
///     .with_partition_key_length(5)
///     .with_max_fan_out(16);
/// assert_eq!(config.partition_key_length, 5);
///
/// let from_json: Config = serde_json::from_str(r#"{"table_name": "cities"}"#).unwrap();
/// assert_eq!(from_json.max_fan_out, 32);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Table or dataset identifier passed through to the store client.
    pub table_name: String,

    /// Attribute holding the partition key of a stored row.
    #[serde(default = "Config::default_partition_key_attr")]
    pub partition_key_attr: String,

    /// Attribute holding the row's unique sort key within its partition.
    #[serde(default = "Config::default_sort_key_attr")]
    pub sort_key_attr: String,

    /// Attribute holding the 64-bit linearized index value.
    #[serde(default = "Config::default_index_value_attr")]
    pub index_value_attr: String,

    /// Attribute holding the GeoJSON rendering of the point.
    #[serde(default = "Config::default_geojson_attr")]
    pub geojson_attr: String,

    /// Attribute holding the point's latitude in degrees.
    #[serde(default = "Config::default_latitude_attr")]
    pub latitude_attr: String,

    /// Attribute holding the point's longitude in degrees.
    #[serde(default = "Config::default_longitude_attr")]
    pub longitude_attr: String,

    /// Leading decimal digits of the index value that form the partition
    /// key (1-16). Longer keys mean more, smaller partitions but more
    /// range scans per query region.
    #[serde(default = "Config::default_partition_key_length")]
    pub partition_key_length: usize,

    /// Maximum number of range scans a single query may fan out into.
    #[serde(default = "Config::default_max_fan_out")]
    pub max_fan_out: usize,
}

impl Config {
    fn default_partition_key_attr() -> String {
        "partition_key".to_string()
    }

    fn default_sort_key_attr() -> String {
        "sort_key".to_string()
    }

    fn default_index_value_attr() -> String {
        "geohash".to_string()
    }

    fn default_geojson_attr() -> String {
        "geo_json".to_string()
    }

    fn default_latitude_attr() -> String {
        "latitude".to_string()
    }

    fn default_longitude_attr() -> String {
        "longitude".to_string()
    }

    const fn default_partition_key_length() -> usize {
        6
    }

    const fn default_max_fan_out() -> usize {
        32
    }

    /// Create a configuration for the given table with default attribute
    /// names, partition-key length, and fan-out budget.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            partition_key_attr: Self::default_partition_key_attr(),
            sort_key_attr: Self::default_sort_key_attr(),
            index_value_attr: Self::default_index_value_attr(),
            geojson_attr: Self::default_geojson_attr(),
            latitude_attr: Self::default_latitude_attr(),
            longitude_attr: Self::default_longitude_attr(),
            partition_key_length: Self::default_partition_key_length(),
            max_fan_out: Self::default_max_fan_out(),
        }
    }

    pub fn with_partition_key_length(mut self, length: usize) -> Self {
        assert!(
            (1..=16).contains(&length),
            "Partition key length must be between 1 and 16"
        );
        self.partition_key_length = length;
        self
    }

    pub fn with_max_fan_out(mut self, budget: usize) -> Self {
        assert!(budget > 0, "Fan-out budget must be greater than zero");
        self.max_fan_out = budget;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(GeoTableError::InvalidInput(
                "Table name must not be empty".to_string(),
            ));
        }
        if !(1..=16).contains(&self.partition_key_length) {
            return Err(GeoTableError::InvalidInput(format!(
                "Partition key length out of range [1, 16]: {}",
                self.partition_key_length
            )));
        }
        if self.max_fan_out == 0 {
            return Err(GeoTableError::InvalidInput(
                "Fan-out budget must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Geometric predicate of a query, dispatched on by the planner (for the
/// covering region) and the post-filter (for exact containment).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPredicate {
    /// All points within `radius_meters` of `center`, great-circle.
    Radius { center: Point, radius_meters: f64 },
    /// All points inside the latitude/longitude rectangle.
    BoundingBox { rect: Rect },
}

impl QueryPredicate {
    /// Reject out-of-range coordinates and degenerate radii before any
    /// planning or store work happens.
    pub fn validate(&self) -> Result<()> {
        match self {
            QueryPredicate::Radius {
                center,
                radius_meters,
            } => {
                validate_point(center)?;
                if !radius_meters.is_finite() || *radius_meters <= 0.0 {
                    return Err(GeoTableError::InvalidInput(format!(
                        "Radius must be positive and finite, got: {}",
                        radius_meters
                    )));
                }
                Ok(())
            }
            QueryPredicate::BoundingBox { rect } => {
                validate_point(&Point::from(rect.min()))?;
                validate_point(&Point::from(rect.max()))?;
                Ok(())
            }
        }
    }

    /// Exact containment test against the recovered point of a row.
    pub fn contains(&self, point: &Point) -> bool {
        match self {
            QueryPredicate::Radius {
                center,
                radius_meters,
            } => Haversine.distance(*center, *point) <= *radius_meters,
            QueryPredicate::BoundingBox { rect } => rect.contains(point),
        }
    }
}

impl fmt::Display for QueryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPredicate::Radius {
                center,
                radius_meters,
            } => write!(
                f,
                "{} m around ({}, {})",
                radius_meters,
                center.y(),
                center.x()
            ),
            QueryPredicate::BoundingBox { rect } => write!(
                f,
                "bounding box ({}, {})..({}, {})",
                rect.min().y,
                rect.min().x,
                rect.max().y,
                rect.max().x
            ),
        }
    }
}

/// Options for [`crate::GeoTable::put_point`].
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Unique sort key for the row; a UUID is generated when absent.
    pub sort_key: Option<String>,
    /// Namespace prefix folded into the partition key.
    pub partition_key_prefix: Option<String>,
}

impl PutOptions {
    pub fn with_sort_key(sort_key: impl Into<String>) -> Self {
        Self {
            sort_key: Some(sort_key.into()),
            ..Self::default()
        }
    }

    pub fn with_partition_key_prefix(prefix: impl Into<String>) -> Self {
        Self {
            partition_key_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }
}

/// Options for the query methods of [`crate::GeoTable`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Namespace prefix folded into every planned partition key; must
    /// match the prefix the rows were written under.
    pub partition_key_prefix: Option<String>,
}

impl QueryOptions {
    pub fn with_partition_key_prefix(prefix: impl Into<String>) -> Self {
        Self {
            partition_key_prefix: Some(prefix.into()),
        }
    }
}

/// Result of a fan-out query: the exactly-filtered rows plus the raw
/// store pages for diagnostics and pagination bookkeeping.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    /// Rows whose recovered point satisfies the query predicate.
    pub items: Vec<Item>,
    /// Every page returned by the store, in no particular order across
    /// plans (page order within a plan is preserved).
    pub pages: Vec<RangePage>,
    /// Candidate rows excluded because their coordinate attributes were
    /// missing or malformed.
    pub dropped_rows: usize,
}

/// Validates a point has in-range, finite longitude and latitude.
///
/// Longitude: [-180.0, 180.0], Latitude: [-90.0, 90.0]
pub fn validate_point(point: &Point) -> Result<()> {
    let (x, y) = (point.x(), point.y());

    if !x.is_finite() {
        return Err(GeoTableError::InvalidInput(format!(
            "Longitude must be finite, got: {}",
            x
        )));
    }

    if !y.is_finite() {
        return Err(GeoTableError::InvalidInput(format!(
            "Latitude must be finite, got: {}",
            y
        )));
    }

    if !(-180.0..=180.0).contains(&x) {
        return Err(GeoTableError::InvalidInput(format!(
            "Longitude out of range [-180.0, 180.0]: {}",
            x
        )));
    }

    if !(-90.0..=90.0).contains(&y) {
        return Err(GeoTableError::InvalidInput(format!(
            "Latitude out of range [-90.0, 90.0]: {}",
            y
        )));
    }

    Ok(())
}

/// Standard GeoJSON rendering of a point, stored alongside the numeric
/// coordinate attributes.
pub(crate) fn point_to_geojson(point: &Point) -> String {
    let geometry = geojson::Geometry::new(geojson::Value::Point(vec![point.x(), point.y()]));
    GeoJson::Geometry(geometry).to_string()
}
