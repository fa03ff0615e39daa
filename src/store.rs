//! The range-store seam and an in-memory reference backend.
//!
//! The index core only ever issues two shapes of request: a single-row
//! put, and an exact-match-on-partition-key plus between-range-on-sort-key
//! scan, one page at a time. Everything else about the store (connection
//! management, request construction, retries, timeouts) lives behind
//! [`RangeStore`].

use crate::range::GeohashRange;
use crate::types::{Config, Item};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use thiserror::Error;

/// Failure surfaced by a store round-trip.
///
/// Retries are the implementation's concern; the coordinator treats
/// every variant as terminal for the in-flight query.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Request throttled: {0}")]
    Throttled(String),
    #[error("Malformed store response: {0}")]
    MalformedResponse(String),
    #[error("Item rejected by store: {0}")]
    InvalidItem(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Opaque continuation token for paginated range scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub Bytes);

/// One page of a partition range scan.
#[derive(Debug, Clone, Default)]
pub struct RangePage {
    pub items: Vec<Item>,
    /// Present when more rows remain; feed it back to continue the scan.
    pub next: Option<PageToken>,
}

/// Client seam for the partitioned key-range store.
#[async_trait]
pub trait RangeStore: Send + Sync {
    /// Fetch one page of rows whose index value lies in `range` within
    /// the given partition. Pass the previous page's token to continue a
    /// scan; rows arrive in ascending index-value order.
    async fn query(
        &self,
        partition_key: &str,
        range: GeohashRange,
        exclusive_start: Option<PageToken>,
    ) -> StoreResult<RangePage>;

    /// Write a single row. A row with the same (partition key, sort key)
    /// is overwritten; there is no read-modify-write.
    async fn put(&self, partition_key: &str, sort_key: &str, item: Item) -> StoreResult<()>;
}

#[async_trait]
impl<T: RangeStore + ?Sized> RangeStore for std::sync::Arc<T> {
    async fn query(
        &self,
        partition_key: &str,
        range: GeohashRange,
        exclusive_start: Option<PageToken>,
    ) -> StoreResult<RangePage> {
        (**self).query(partition_key, range, exclusive_start).await
    }

    async fn put(&self, partition_key: &str, sort_key: &str, item: Item) -> StoreResult<()> {
        (**self).put(partition_key, sort_key, item).await
    }
}

/// In-memory reference store.
///
/// One ordered map per partition, keyed by (index value, sort key), so
/// range scans are real sort-key scans. The page size is configurable so
/// tests exercise multi-page continuation.
pub struct MemoryStore {
    partitions: RwLock<FxHashMap<String, Partition>>,
    index_value_attr: String,
    page_size: usize,
}

#[derive(Default)]
struct Partition {
    rows: BTreeMap<(u64, String), Item>,
    /// sort key -> current index value, for overwrite semantics.
    positions: FxHashMap<String, u64>,
}

/// Last evaluated key, JSON-encoded into the opaque page token.
#[derive(Serialize, Deserialize)]
struct LastKey {
    index_value: u64,
    sort_key: String,
}

impl MemoryStore {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    /// Build a store for the given index configuration (the store reads
    /// each row's index value from `config.index_value_attr`, the way a
    /// real table's key schema would).
    pub fn new(config: &Config) -> Self {
        Self::with_page_size(config, Self::DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(config: &Config, page_size: usize) -> Self {
        assert!(page_size > 0, "Page size must be greater than zero");
        Self {
            partitions: RwLock::new(FxHashMap::default()),
            index_value_attr: config.index_value_attr.clone(),
            page_size,
        }
    }

    /// Total number of stored rows, across all partitions.
    pub fn row_count(&self) -> usize {
        self.partitions
            .read()
            .values()
            .map(|partition| partition.rows.len())
            .sum()
    }
}

#[async_trait]
impl RangeStore for MemoryStore {
    async fn query(
        &self,
        partition_key: &str,
        range: GeohashRange,
        exclusive_start: Option<PageToken>,
    ) -> StoreResult<RangePage> {
        let lower = match exclusive_start {
            Some(token) => {
                let last = decode_token(&token)?;
                Bound::Excluded((last.index_value, last.sort_key))
            }
            None => Bound::Included((range.min(), String::new())),
        };

        let partitions = self.partitions.read();
        let Some(partition) = partitions.get(partition_key) else {
            return Ok(RangePage::default());
        };

        let mut page = RangePage::default();
        let mut rows = partition
            .rows
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.0 <= range.max())
            .peekable();
        while let Some((key, item)) = rows.next() {
            page.items.push(item.clone());
            if page.items.len() == self.page_size && rows.peek().is_some() {
                page.next = Some(encode_token(key.0, &key.1)?);
                break;
            }
        }

        Ok(page)
    }

    async fn put(&self, partition_key: &str, sort_key: &str, item: Item) -> StoreResult<()> {
        let index_value = item
            .get(&self.index_value_attr)
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                StoreError::InvalidItem(format!(
                    "missing or non-numeric '{}' attribute",
                    self.index_value_attr
                ))
            })?;

        let mut partitions = self.partitions.write();
        let partition = partitions.entry(partition_key.to_string()).or_default();
        if let Some(old) = partition
            .positions
            .insert(sort_key.to_string(), index_value)
        {
            partition.rows.remove(&(old, sort_key.to_string()));
        }
        partition
            .rows
            .insert((index_value, sort_key.to_string()), item);
        Ok(())
    }
}

fn encode_token(index_value: u64, sort_key: &str) -> StoreResult<PageToken> {
    let key = LastKey {
        index_value,
        sort_key: sort_key.to_string(),
    };
    let bytes =
        serde_json::to_vec(&key).map_err(|err| StoreError::MalformedResponse(err.to_string()))?;
    Ok(PageToken(Bytes::from(bytes)))
}

fn decode_token(token: &PageToken) -> StoreResult<LastKey> {
    serde_json::from_slice(&token.0)
        .map_err(|err| StoreError::MalformedResponse(format!("bad continuation token: {err}")))
}
