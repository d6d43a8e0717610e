//! Concurrent enrichment of listed items.
//!
//! A list call returns items without their dependency data. [`Enricher`]
//! fetches the full record for every item, at most
//! [`MAX_CONCURRENT_FETCHES`] at a time, and writes each result back into the
//! slot of the item it came from.
//!
//! ```text
//!  items ──► acquire permit ──► spawn worker ──► fetch_detail ──► slot[i]
//!              (blocks at 5)      (JoinSet)        │
//!                                                  ├─ error    ──► failed ids
//!                                                  └─ panic    ──► panicked ids
//!  join every worker ──► Ok(results) | Err(Cancelled | WorkerPanicked)
//! ```
//!
//! `enrich` never returns while a worker it spawned is still running.

use crate::domain::WorkItem;
use crate::error::EnrichError;
use crate::source::DataSource;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Upper bound on concurrent detail fetches per batch.
pub const MAX_CONCURRENT_FETCHES: usize = 5;

/// State written by workers. Guarded by one mutex, held only per write.
#[derive(Default)]
struct Shared {
    results: Vec<WorkItem>,
    failed: Vec<String>,
    panicked: Vec<String>,
    interrupted: usize,
}

/// Outcome of one worker, computed before taking the lock.
enum Outcome {
    Enriched(WorkItem),
    Cancelled,
    Failed,
    Panicked,
}

/// Fans detail fetches out over a bounded set of tasks.
#[derive(Clone)]
pub struct Enricher {
    source: Arc<dyn DataSource>,
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("source", &"<dyn DataSource>")
            .finish()
    }
}

impl Enricher {
    /// Create an enricher over `source`.
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    /// Replace every item with its full detail record.
    ///
    /// The returned vector has the same length and order as `items`. Items
    /// whose fetch failed keep their list data; failures are logged, not
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`EnrichError::Cancelled`] if `cancel` fired before every item was
    ///   dispatched, or cut short a dispatched fetch. Already-dispatched
    ///   workers are joined first.
    /// - [`EnrichError::WorkerPanicked`] if any worker panicked. The error
    ///   carries the partial results.
    pub async fn enrich(
        &self,
        items: Vec<WorkItem>,
        cancel: &CancellationToken,
    ) -> Result<Vec<WorkItem>, EnrichError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let total = items.len();
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let shared = Arc::new(Mutex::new(Shared {
            results: items,
            ..Shared::default()
        }));
        let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES));
        let mut workers = JoinSet::new();
        let mut cancelled = false;

        for (index, id) in ids.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&permits).acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                cancelled = true;
                break;
            };

            let source = Arc::clone(&self.source);
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            workers.spawn(async move {
                let _permit = permit;
                let outcome = fetch_one(source.as_ref(), &id, &cancel).await;

                let mut shared = shared.lock().await;
                match outcome {
                    Outcome::Enriched(item) => shared.results[index] = item,
                    Outcome::Failed => shared.failed.push(id),
                    Outcome::Panicked => shared.panicked.push(id),
                    Outcome::Cancelled => shared.interrupted += 1,
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Enrichment worker did not complete");
            }
        }

        let shared = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => std::mem::take(&mut *shared.lock().await),
        };

        if cancelled {
            debug!(total, "Enrichment cancelled before all items were dispatched");
            return Err(EnrichError::Cancelled);
        }
        if shared.interrupted > 0 && cancel.is_cancelled() {
            debug!(
                total,
                interrupted = shared.interrupted,
                "Enrichment cancelled while fetches were in flight"
            );
            return Err(EnrichError::Cancelled);
        }

        if !shared.panicked.is_empty() {
            return Err(EnrichError::WorkerPanicked {
                partial: shared.results,
                panicked: shared.panicked,
            });
        }

        if !shared.failed.is_empty() {
            warn!(
                total,
                failed = shared.failed.len(),
                ids = %shared.failed.join(", "),
                "Some items could not be enriched and keep their list data"
            );
        }

        Ok(shared.results)
    }
}

async fn fetch_one(source: &dyn DataSource, id: &str, cancel: &CancellationToken) -> Outcome {
    let call = AssertUnwindSafe(source.fetch_detail(id, cancel)).catch_unwind();
    match call.await {
        Ok(Ok(item)) => Outcome::Enriched(item),
        Ok(Err(err)) if err.is_cancelled() || cancel.is_cancelled() => {
            debug!(id, error = %err, "Detail fetch cancelled");
            Outcome::Cancelled
        }
        Ok(Err(err)) => {
            warn!(id, error = %err, "Detail fetch failed");
            Outcome::Failed
        }
        Err(payload) => {
            error!(id, panic = %panic_message(payload.as_ref()), "Detail fetch panicked");
            Outcome::Panicked
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
