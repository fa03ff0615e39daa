//! The public facade tying the index pipeline together.

use crate::cell;
use crate::coordinator::QueryCoordinator;
use crate::error::Result;
use crate::filter;
use crate::planner;
use crate::store::RangeStore;
use crate::types::{
    Config, Item, PutOptions, QueryOptions, QueryOutcome, QueryPredicate, point_to_geojson,
};
use geo::{Point, Rect};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Geospatial secondary index over a partitioned key-range store.
///
/// Writes compute a 64-bit index value and a partition key for each
/// point and store them alongside the caller's attributes; radius and
/// bounding-box queries are answered by scanning a minimal set of
/// partition-aligned index ranges concurrently and post-filtering the
/// candidates by exact spherical distance.
///
/// A query either returns a complete, fully-filtered result set or fails
/// with a single error; it never returns a partial result.
///
/// # Example
///
/// ```rust
/// use geotable::{Config, GeoTable, MemoryStore, Point};
///
/// # async fn example() -> geotable::Result<()> {
/// let config = Config::new("cities");
/// let table = GeoTable::new(MemoryStore::new(&config), config)?;
///
/// let seattle = Point::new(-122.3, 47.5);
/// table.put_point(&seattle, Default::default(), None).await?;
///
/// let nearby = table.query_radius(&seattle, 100.0, None).await?;
/// assert_eq!(nearby.items.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct GeoTable<S> {
    config: Arc<Config>,
    store: Arc<S>,
    coordinator: QueryCoordinator<S>,
}

impl<S: RangeStore + 'static> GeoTable<S> {
    /// Build a table over the given store client. The configuration is
    /// validated once here and treated as immutable afterwards.
    pub fn new(store: S, config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(store);
        Ok(Self {
            config: Arc::new(config),
            coordinator: QueryCoordinator::new(Arc::clone(&store)),
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write a point row and return its sort key.
    ///
    /// The stored row is the caller's attributes plus the computed
    /// partition key, sort key, index value, coordinates, and GeoJSON
    /// rendering. A row with the same partition and sort key is
    /// overwritten by the store; there is no uniqueness check here.
    pub async fn put_point(
        &self,
        point: &Point,
        attributes: Item,
        opts: Option<PutOptions>,
    ) -> Result<String> {
        let opts = opts.unwrap_or_default();
        let index_value = cell::index_value(point)?;
        let partition_key = cell::partition_key(
            index_value,
            self.config.partition_key_length,
            opts.partition_key_prefix.as_deref(),
        );
        let sort_key = opts
            .sort_key
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut item = attributes;
        item.insert(
            self.config.partition_key_attr.clone(),
            Value::from(partition_key.clone()),
        );
        item.insert(
            self.config.sort_key_attr.clone(),
            Value::from(sort_key.clone()),
        );
        item.insert(
            self.config.index_value_attr.clone(),
            Value::from(index_value),
        );
        item.insert(self.config.latitude_attr.clone(), Value::from(point.y()));
        item.insert(self.config.longitude_attr.clone(), Value::from(point.x()));
        item.insert(
            self.config.geojson_attr.clone(),
            Value::from(point_to_geojson(point)),
        );

        self.store.put(&partition_key, &sort_key, item).await?;
        log::debug!(
            "Stored point ({}, {}) in partition {partition_key}",
            point.y(),
            point.x()
        );
        Ok(sort_key)
    }

    /// Find all points within `radius_meters` of `center`.
    ///
    /// The caller suspends until every fanned-out range scan completes
    /// or the first one fails.
    pub async fn query_radius(
        &self,
        center: &Point,
        radius_meters: f64,
        opts: Option<QueryOptions>,
    ) -> Result<QueryOutcome> {
        let predicate = QueryPredicate::Radius {
            center: *center,
            radius_meters,
        };
        self.query(predicate, opts).await
    }

    /// Find all points inside a latitude/longitude rectangle.
    pub async fn query_bounding_box(
        &self,
        rect: &Rect,
        opts: Option<QueryOptions>,
    ) -> Result<QueryOutcome> {
        let predicate = QueryPredicate::BoundingBox { rect: *rect };
        self.query(predicate, opts).await
    }

    async fn query(
        &self,
        predicate: QueryPredicate,
        opts: Option<QueryOptions>,
    ) -> Result<QueryOutcome> {
        predicate.validate()?;
        let opts = opts.unwrap_or_default();

        let plans = planner::plan_query(
            &predicate,
            opts.partition_key_prefix.as_deref(),
            &self.config,
        )?;
        log::debug!("Executing {} range scans for {predicate}", plans.len());

        let pages = self.coordinator.execute(plans).await?;
        let (items, dropped_rows) = filter::filter_pages(&predicate, &pages, &self.config);
        Ok(QueryOutcome {
            items,
            pages,
            dropped_rows,
        })
    }
}
