//! Single-item drill-down.
//!
//! Same request id discipline as the main graph, with its own counter, so a
//! slow fetch for a previously selected item can never overwrite the item the
//! user is looking at now.

use crate::domain::{RequestId, WorkItem};
use crate::enrich::panic_message;
use crate::error::{Error, Result};
use crate::event::{DashboardEvent, EventSender};
use crate::source::DataSource;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// What the drill-down pane shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailView {
    /// Selected item id
    pub id: String,
    /// Data already known when the pane opened
    pub summary: Option<WorkItem>,
    /// Full record, once fetched
    pub full: Option<WorkItem>,
    /// Whether the full record is being fetched
    pub loading: bool,
    /// Error from the last detail fetch, scoped to this pane
    pub error: Option<String>,
}

impl DetailView {
    /// The best record available: full detail if fetched, else the summary.
    pub fn item(&self) -> Option<&WorkItem> {
        self.full.as_ref().or(self.summary.as_ref())
    }
}

/// Drives detail fetches for the drill-down pane.
pub struct DetailCoordinator {
    source: Arc<dyn DataSource>,
    events: EventSender,
    shutdown: CancellationToken,
    last_request: RequestId,
    current: Option<RequestId>,
    view: Option<DetailView>,
}

impl std::fmt::Debug for DetailCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetailCoordinator")
            .field("last_request", &self.last_request)
            .field("current", &self.current)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl DetailCoordinator {
    /// Create a closed drill-down.
    pub fn new(source: Arc<dyn DataSource>, events: EventSender, shutdown: CancellationToken) -> Self {
        Self {
            source,
            events,
            shutdown,
            last_request: RequestId::default(),
            current: None,
            view: None,
        }
    }

    /// The open pane, if any.
    pub fn view(&self) -> Option<&DetailView> {
        self.view.as_ref()
    }

    /// Whether the pane is open.
    pub fn is_open(&self) -> bool {
        self.view.is_some()
    }

    /// Id of the fetch whose result will be accepted.
    pub fn current_request(&self) -> Option<RequestId> {
        self.current
    }

    /// Open the pane for `id`, showing `summary` until the full record arrives.
    ///
    /// Supersedes any fetch started for a previous selection.
    pub fn open(&mut self, id: &str, summary: Option<WorkItem>) -> RequestId {
        self.last_request = self.last_request.next();
        let request_id = self.last_request;
        self.current = Some(request_id);
        self.view = Some(DetailView {
            id: id.to_string(),
            summary,
            full: None,
            loading: true,
            error: None,
        });

        let source = Arc::clone(&self.source);
        let events = self.events.clone();
        let cancel = self.shutdown.child_token();
        let id = id.to_string();
        tokio::spawn(async move {
            let fetch = AssertUnwindSafe(source.fetch_detail(&id, &cancel)).catch_unwind();
            let result = match fetch.await {
                Ok(result) => result.map_err(Error::from),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(%request_id, id = %id, panic = %message, "Detail fetch panicked");
                    Err(Error::Panicked(message))
                }
            };
            if events
                .send(DashboardEvent::DetailLoaded { request_id, result })
                .is_err()
            {
                debug!(%request_id, "Detail result dropped, dashboard is gone");
            }
        });
        request_id
    }

    /// Close the pane. In-flight fetches are left to finish and be discarded.
    pub fn close(&mut self) {
        self.current = None;
        self.view = None;
    }

    /// Apply a detail result if it belongs to the current selection.
    ///
    /// Returns `true` if applied.
    pub fn handle_detail_loaded(&mut self, request_id: RequestId, result: Result<WorkItem>) -> bool {
        if self.current != Some(request_id) {
            return false;
        }
        let Some(view) = self.view.as_mut() else {
            return false;
        };
        self.current = None;
        view.loading = false;

        match result {
            Ok(item) => {
                view.full = Some(item);
                view.error = None;
            }
            Err(err) => {
                warn!(id = %view.id, error = %err, "Detail fetch failed");
                view.error = Some(err.to_string());
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::event::{self, EventReceiver};
    use crate::source::MockSource;
    use std::time::Duration;

    fn coordinator(mock: &MockSource) -> (DetailCoordinator, EventReceiver) {
        let (tx, rx) = event::channel();
        (
            DetailCoordinator::new(Arc::new(mock.clone()), tx, CancellationToken::new()),
            rx,
        )
    }

    async fn next_detail(rx: &mut EventReceiver) -> (RequestId, Result<WorkItem>) {
        match rx.recv().await.expect("channel open") {
            DashboardEvent::DetailLoaded { request_id, result } => (request_id, result),
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn detailed(id: &str) -> WorkItem {
        let mut item = WorkItem::new(id, format!("{id} (full)"));
        item.labels = vec!["full".to_string()];
        item
    }

    #[tokio::test]
    async fn open_shows_summary_and_loads() {
        let mock = MockSource::new();
        mock.set_detail(detailed("X"));
        let (mut detail, mut rx) = coordinator(&mock);

        detail.open("X", Some(WorkItem::new("X", "summary")));
        let view = detail.view().unwrap();
        assert!(view.loading);
        assert_eq!(view.item().unwrap().title, "summary");

        let (id, result) = next_detail(&mut rx).await;
        assert!(detail.handle_detail_loaded(id, result));

        let view = detail.view().unwrap();
        assert!(!view.loading);
        assert_eq!(view.item().unwrap().labels, ["full"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_for_previous_selection_is_discarded() {
        let mock = MockSource::new();
        mock.set_detail(detailed("X"));
        mock.set_detail(detailed("Y"));
        mock.set_detail_delay("X", Duration::from_secs(5));
        let (mut detail, mut rx) = coordinator(&mock);

        let x = detail.open("X", None);
        let y = detail.open("Y", None);
        assert!(y > x);

        let (id, result) = next_detail(&mut rx).await;
        assert_eq!(id, y);
        assert!(detail.handle_detail_loaded(id, result));

        let (id, result) = next_detail(&mut rx).await;
        assert_eq!(id, x);
        assert!(!detail.handle_detail_loaded(id, result));

        let view = detail.view().unwrap();
        assert_eq!(view.id, "Y");
        assert_eq!(view.full.as_ref().unwrap().id, "Y");
    }

    #[tokio::test]
    async fn failure_is_scoped_to_the_pane() {
        let mock = MockSource::new();
        mock.fail_detail("X");
        let (mut detail, mut rx) = coordinator(&mock);

        detail.open("X", Some(WorkItem::new("X", "summary")));
        let (id, result) = next_detail(&mut rx).await;
        detail.handle_detail_loaded(id, result);

        let view = detail.view().unwrap();
        assert!(!view.loading);
        assert!(view.error.as_deref().unwrap().contains("scripted failure"));
        assert_eq!(view.item().unwrap().title, "summary");
    }

    #[tokio::test]
    async fn panicking_fetch_still_settles_the_pane() {
        let mock = MockSource::new();
        mock.panic_on_detail("X");
        let (mut detail, mut rx) = coordinator(&mock);

        detail.open("X", Some(WorkItem::new("X", "summary")));
        let (id, result) = next_detail(&mut rx).await;
        assert!(detail.handle_detail_loaded(id, result));

        let view = detail.view().unwrap();
        assert!(!view.loading);
        assert!(view.error.as_deref().unwrap().contains("scripted panic"));
        assert!(detail.current_request().is_none());
    }

    #[tokio::test]
    async fn close_resets_and_discards_late_result() {
        let mock = MockSource::new();
        mock.set_detail(detailed("X"));
        let (mut detail, mut rx) = coordinator(&mock);

        detail.open("X", None);
        detail.close();
        assert!(!detail.is_open());
        assert!(detail.current_request().is_none());

        let (id, result) = next_detail(&mut rx).await;
        assert!(!detail.handle_detail_loaded(id, result));
        assert!(detail.view().is_none());
    }

    #[tokio::test]
    async fn duplicate_delivery_is_ignored() {
        let mock = MockSource::new();
        let (mut detail, _rx) = coordinator(&mock);
        let id = detail.open("X", None);

        assert!(detail.handle_detail_loaded(id, Ok(detailed("X"))));
        let err: Error = SourceError::Other("late".to_string()).into();
        assert!(!detail.handle_detail_loaded(id, Err(err)));
        assert!(detail.view().unwrap().error.is_none());
    }
}
