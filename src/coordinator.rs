//! Concurrent execution of range-query plans.

use crate::error::{GeoTableError, Result};
use crate::planner::QueryPlan;
use crate::store::{PageToken, RangePage, RangeStore, StoreError, StoreResult};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Executes query plans against the store, one task per plan.
///
/// The fan-out is all-or-nothing: the first failing scan cancels every
/// sibling, outstanding tasks are drained, and only that first error is
/// surfaced. Successful scans keep their pages task-local; the pages are
/// merged only once every task has finished.
pub struct QueryCoordinator<S> {
    store: Arc<S>,
}

/// Pages collected by a single plan's scan.
#[derive(Debug, Default)]
struct PlanScan {
    pages: Vec<RangePage>,
    cancelled: bool,
}

impl<S: RangeStore + 'static> QueryCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run every plan to completion and return the raw response pages.
    ///
    /// Page order within a plan is the store's continuation order; no
    /// order is guaranteed across plans.
    pub async fn execute(&self, plans: Vec<QueryPlan>) -> Result<Vec<RangePage>> {
        let cancel = CancellationToken::new();
        let mut tasks: JoinSet<StoreResult<PlanScan>> = JoinSet::new();
        for plan in plans {
            let store = Arc::clone(&self.store);
            let token = cancel.child_token();
            tasks.spawn(scan_plan(store, plan, token));
        }

        let mut pages = Vec::new();
        let mut first_error: Option<GeoTableError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(scan)) => {
                    if first_error.is_none() && !scan.cancelled {
                        pages.extend(scan.pages);
                    }
                }
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        log::warn!(
                            "Range scan failed, cancelling {} sibling scans: {err}",
                            tasks.len()
                        );
                        cancel.cancel();
                        first_error = Some(GeoTableError::Store(err));
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        cancel.cancel();
                        first_error = Some(GeoTableError::Store(StoreError::Unavailable(
                            format!("scan task failed: {join_err}"),
                        )));
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(pages),
        }
    }
}

/// Scan one plan, page by page, chaining continuation tokens.
///
/// The token is consulted before every page request; once cancellation
/// is observed, no further request is issued.
async fn scan_plan<S: RangeStore>(
    store: Arc<S>,
    plan: QueryPlan,
    cancel: CancellationToken,
) -> StoreResult<PlanScan> {
    let mut scan = PlanScan::default();
    let mut start: Option<PageToken> = None;
    loop {
        if cancel.is_cancelled() {
            log::debug!(
                "Scan of partition {} cancelled after {} pages",
                plan.partition_key,
                scan.pages.len()
            );
            scan.cancelled = true;
            return Ok(scan);
        }

        let page = store
            .query(&plan.partition_key, plan.range, start.take())
            .await?;
        let next = page.next.clone();
        scan.pages.push(page);
        match next {
            Some(token) => start = Some(token),
            None => return Ok(scan),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::GeohashRange;
    use crate::types::Item;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plan(partition_key: &str) -> QueryPlan {
        QueryPlan {
            partition_key: partition_key.to_string(),
            range: GeohashRange::new(0, 100),
        }
    }

    /// Two pages per partition, failing on the partition named "fail".
    struct StubStore {
        queries: AtomicUsize,
    }

    impl StubStore {
        fn new() -> Self {
            Self {
                queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RangeStore for StubStore {
        async fn query(
            &self,
            partition_key: &str,
            _range: GeohashRange,
            exclusive_start: Option<PageToken>,
        ) -> StoreResult<RangePage> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if partition_key == "fail" {
                return Err(StoreError::Throttled("injected".to_string()));
            }

            let mut item = Item::new();
            item.insert("partition".to_string(), json!(partition_key));
            let next = match exclusive_start {
                None => Some(PageToken(bytes::Bytes::from_static(b"page-2"))),
                Some(_) => None,
            };
            Ok(RangePage {
                items: vec![item],
                next,
            })
        }

        async fn put(&self, _: &str, _: &str, _: Item) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn merges_pages_from_all_plans() {
        let store = Arc::new(StubStore::new());
        let coordinator = QueryCoordinator::new(Arc::clone(&store));

        let pages = coordinator
            .execute(vec![plan("a"), plan("b"), plan("c")])
            .await
            .unwrap();

        // Two pages per plan, continuation order preserved per plan.
        assert_eq!(pages.len(), 6);
        assert_eq!(store.queries.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn empty_plan_set_yields_no_pages() {
        let coordinator = QueryCoordinator::new(Arc::new(StubStore::new()));
        let pages = coordinator.execute(Vec::new()).await.unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn first_failure_aborts_the_whole_call() {
        let store = Arc::new(StubStore::new());
        let coordinator = QueryCoordinator::new(Arc::clone(&store));

        let err = coordinator
            .execute(vec![plan("a"), plan("fail"), plan("b")])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GeoTableError::Store(StoreError::Throttled(_))
        ));
    }
}
