//! Geospatial secondary index for ordered, partitioned key-range stores.
//!
//! `geotable` stores points in any store that offers exact-match
//! partition-key lookups plus sort-key range scans, and answers
//! "everything within N meters of here" by planning a minimal set of
//! partition-aligned index ranges, scanning them concurrently, and
//! post-filtering candidates by exact spherical distance.
//!
//! ```rust
//! use geotable::{Config, GeoTable, MemoryStore, Point};
//!
//! # async fn example() -> geotable::Result<()> {
//! let config = Config::new("cities");
//! let table = GeoTable::new(MemoryStore::new(&config), config)?;
//!
//! let seattle = Point::new(-122.3, 47.5);
//! table.put_point(&seattle, Default::default(), None).await?;
//!
//! let nearby = table.query_radius(&seattle, 100.0, None).await?;
//! assert_eq!(nearby.items.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! Bring your own backend by implementing [`RangeStore`]; the bundled
//! [`MemoryStore`] is the reference implementation.

pub mod cell;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod filter;
pub mod planner;
pub mod range;
pub mod store;
pub mod types;

pub use db::GeoTable;
pub use error::{GeoTableError, Result};

pub use geo::{Point, Rect};

pub use coordinator::QueryCoordinator;
pub use planner::QueryPlan;
pub use range::GeohashRange;
pub use store::{MemoryStore, PageToken, RangePage, RangeStore, StoreError};
pub use types::{Config, Item, PutOptions, QueryOptions, QueryOutcome, QueryPredicate};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::{
        Config, GeoTable, GeoTableError, Item, MemoryStore, Point, PutOptions, QueryOptions,
        QueryOutcome, QueryPredicate, RangeStore, Rect, Result,
    };
}
