//! Exact geometric post-filtering of candidate rows.
//!
//! Range coverings are conservative, so raw rows may lie outside the
//! queried region. Every candidate is re-checked against the true
//! predicate using its stored coordinates; a row whose coordinates
//! cannot be recovered is dropped and counted, never fatal.

use crate::store::RangePage;
use crate::types::{Config, Item, QueryPredicate};
use geo::Point;
use thiserror::Error;

/// Why a candidate row was excluded without failing the query.
#[derive(Debug, Error)]
pub(crate) enum RowError {
    #[error("Missing coordinate attribute '{0}'")]
    MissingCoordinate(String),
    #[error("Coordinate attribute '{0}' is not a number")]
    MalformedCoordinate(String),
}

/// Keep only the rows whose recovered point satisfies the predicate.
///
/// Returns the surviving rows and the number of rows dropped because
/// their coordinates were missing or malformed.
pub fn filter_pages(
    predicate: &QueryPredicate,
    pages: &[RangePage],
    config: &Config,
) -> (Vec<Item>, usize) {
    let mut items = Vec::new();
    let mut dropped = 0;

    for page in pages {
        for item in &page.items {
            match row_point(item, config) {
                Ok(point) => {
                    if predicate.contains(&point) {
                        items.push(item.clone());
                    }
                }
                Err(err) => {
                    dropped += 1;
                    log::debug!("Dropping candidate row: {err}");
                }
            }
        }
    }

    if dropped > 0 {
        log::warn!("Dropped {dropped} candidate rows with unrecoverable coordinates");
    }
    (items, dropped)
}

/// Recover a row's point from its coordinate attributes.
pub(crate) fn row_point(item: &Item, config: &Config) -> Result<Point, RowError> {
    let latitude = coordinate(item, &config.latitude_attr)?;
    let longitude = coordinate(item, &config.longitude_attr)?;
    Ok(Point::new(longitude, latitude))
}

fn coordinate(item: &Item, attr: &str) -> Result<f64, RowError> {
    let value = item
        .get(attr)
        .ok_or_else(|| RowError::MissingCoordinate(attr.to_string()))?;
    value
        .as_f64()
        .ok_or_else(|| RowError::MalformedCoordinate(attr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(latitude: f64, longitude: f64, name: &str) -> Item {
        let mut item = Item::new();
        item.insert("latitude".to_string(), json!(latitude));
        item.insert("longitude".to_string(), json!(longitude));
        item.insert("name".to_string(), json!(name));
        item
    }

    fn page(items: Vec<Item>) -> RangePage {
        RangePage { items, next: None }
    }

    #[test]
    fn keeps_rows_inside_the_radius_and_drops_the_rest() {
        let config = Config::new("t");
        let predicate = QueryPredicate::Radius {
            center: Point::new(0.0, 0.0),
            radius_meters: 100.0,
        };

        // ~44 m and ~222 m from the center along the meridian.
        let pages = vec![page(vec![
            row(0.0004, 0.0, "near"),
            row(0.002, 0.0, "far"),
        ])];

        let (items, dropped) = filter_pages(&predicate, &pages, &config);
        assert_eq!(dropped, 0);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], json!("near"));
    }

    #[test]
    fn bounding_box_rows_are_checked_for_containment() {
        let config = Config::new("t");
        let rect = geo::Rect::new(
            geo::coord! { x: -74.0, y: 40.7 },
            geo::coord! { x: -73.9, y: 40.8 },
        );
        let predicate = QueryPredicate::BoundingBox { rect };

        let pages = vec![page(vec![
            row(40.75, -73.95, "inside"),
            row(40.75, -73.85, "outside"),
        ])];

        let (items, _) = filter_pages(&predicate, &pages, &config);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], json!("inside"));
    }

    #[test]
    fn malformed_rows_are_counted_not_fatal() {
        let config = Config::new("t");
        let predicate = QueryPredicate::Radius {
            center: Point::new(0.0, 0.0),
            radius_meters: 1_000.0,
        };

        let mut missing = Item::new();
        missing.insert("name".to_string(), json!("no coordinates"));

        let mut malformed = row(0.0, 0.0, "bad latitude");
        malformed.insert("latitude".to_string(), json!("not a number"));

        let pages = vec![page(vec![missing, malformed, row(0.0, 0.0, "good")])];

        let (items, dropped) = filter_pages(&predicate, &pages, &config);
        assert_eq!(dropped, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], json!("good"));
    }

    #[test]
    fn row_point_reads_configured_attribute_names() {
        let mut config = Config::new("t");
        config.latitude_attr = "lat".to_string();
        config.longitude_attr = "lng".to_string();

        let mut item = Item::new();
        item.insert("lat".to_string(), json!(47.5));
        item.insert("lng".to_string(), json!(-122.3));

        let point = row_point(&item, &config).unwrap();
        assert_eq!(point.y(), 47.5);
        assert_eq!(point.x(), -122.3);
    }
}
