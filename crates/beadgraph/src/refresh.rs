//! Main graph refresh coordination.
//!
//! [`RefreshCoordinator`] owns the current graph and decides which fetch
//! results may replace it. It is driven from a single control loop:
//!
//! ```text
//!            refresh()                       GraphLoaded(id == current)
//!   Idle ───────────────► Loading { id } ───────────────────────────► Idle
//!    ▲  (no-op while Loading)   │
//!    │                          └── GraphLoaded(id != current): dropped,
//!    │                              still Loading
//!    └── auto-refresh tick: refresh() only if visible and Idle;
//!        the next tick is always scheduled
//! ```
//!
//! A refresh first commits a new request id and only then spawns the fetch,
//! so a fetch that completes immediately can never race the bookkeeping that
//! makes its id current.

use crate::domain::{GraphEdge, GraphNode, RequestId, ViewFilter, WorkItem};
use crate::enrich::{Enricher, panic_message};
use crate::error::{EnrichError, Error, Result};
use crate::event::{DashboardEvent, EventSender, LoadedGraph};
use crate::graph::assemble_graph;
use crate::source::DataSource;
use crate::view::{ViewRules, drop_agent_edges, exclude_agents};
use chrono::Utc;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shortest allowed auto-refresh interval.
pub const MIN_AUTO_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Whether a graph fetch is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No fetch in flight
    #[default]
    Idle,
    /// A fetch tagged with `request_id` is the one whose result will be kept
    Loading {
        /// The current request id
        request_id: RequestId,
    },
}

/// Auto-refresh cadence. A zero interval disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoRefresh {
    interval: Option<Duration>,
}

impl AutoRefresh {
    /// Clamp `interval` to [`MIN_AUTO_REFRESH_INTERVAL`]; zero disables.
    pub fn new(interval: Duration) -> Self {
        if interval.is_zero() {
            Self { interval: None }
        } else {
            Self {
                interval: Some(interval.max(MIN_AUTO_REFRESH_INTERVAL)),
            }
        }
    }

    /// Disabled auto-refresh.
    pub fn disabled() -> Self {
        Self { interval: None }
    }

    /// The effective interval, if enabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}

/// Status shown alongside the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Selected view
    pub view: ViewFilter,
    /// Number of nodes in the graph
    pub item_count: usize,
    /// Whether a fetch is in flight
    pub loading: bool,
    /// Error banner from the last failed fetch
    pub error: Option<String>,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.item_count == 1 { "item" } else { "items" };
        write!(f, "{} · {} {noun}", self.view, self.item_count)?;
        if self.loading {
            f.write_str(" · loading…")?;
        }
        if let Some(error) = &self.error {
            write!(f, " · error: {error}")?;
        }
        Ok(())
    }
}

/// A copy of the current graph for a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSnapshot {
    /// View the graph was built for
    pub view: ViewFilter,
    /// Nodes in list order
    pub nodes: Vec<GraphNode>,
    /// Edges in derivation order
    pub edges: Vec<GraphEdge>,
    /// Status line
    pub status: StatusLine,
}

/// List, filter, enrich and de-agent the items of one view.
///
/// # Errors
///
/// Returns the list error, or a batch-level enrichment error.
pub async fn load_view(
    source: &dyn DataSource,
    enricher: &Enricher,
    rules: ViewRules,
    view: ViewFilter,
    cancel: &CancellationToken,
) -> Result<LoadedGraph> {
    let listed = source.list(view, cancel).await?;
    let selected = rules.select(view, listed, Utc::now());
    debug!(%view, count = selected.len(), "Enriching view items");
    let enriched = enricher.enrich(selected, cancel).await?;
    let (items, agents) = exclude_agents(enriched);
    Ok(LoadedGraph {
        view,
        items,
        agents,
    })
}

/// Owns the current graph and the request id discipline for refreshing it.
pub struct RefreshCoordinator {
    source: Arc<dyn DataSource>,
    enricher: Enricher,
    rules: ViewRules,
    view: watch::Sender<ViewFilter>,
    state: LoadState,
    last_request: RequestId,
    items: Vec<WorkItem>,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    error: Option<String>,
    visible: bool,
    auto_refresh: AutoRefresh,
    events: EventSender,
    shutdown: CancellationToken,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("view", &*self.view.borrow())
            .field("state", &self.state)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("error", &self.error)
            .field("visible", &self.visible)
            .field("auto_refresh", &self.auto_refresh)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// Create an idle coordinator showing `view` with an empty graph.
    pub fn new(
        source: Arc<dyn DataSource>,
        view: ViewFilter,
        events: EventSender,
        shutdown: CancellationToken,
    ) -> Self {
        let (view, _) = watch::channel(view);
        Self {
            enricher: Enricher::new(Arc::clone(&source)),
            source,
            rules: ViewRules::default(),
            view,
            state: LoadState::Idle,
            last_request: RequestId::default(),
            items: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            error: None,
            visible: true,
            auto_refresh: AutoRefresh::disabled(),
            events,
            shutdown,
        }
    }

    /// Use `rules` for client-side view filtering.
    #[must_use]
    pub fn with_rules(mut self, rules: ViewRules) -> Self {
        self.rules = rules;
        self
    }

    /// Use `auto_refresh` once [`start_auto_refresh`](Self::start_auto_refresh) is called.
    #[must_use]
    pub fn with_auto_refresh(mut self, auto_refresh: AutoRefresh) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    /// Current state.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Whether a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading { .. })
    }

    /// The selected view.
    pub fn view(&self) -> ViewFilter {
        *self.view.borrow()
    }

    /// Whether the graph pane is visible.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Error banner from the last failed fetch.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The auto-refresh cadence.
    pub fn auto_refresh(&self) -> AutoRefresh {
        self.auto_refresh
    }

    /// Items of the current graph.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Look up an item of the current graph.
    pub fn item(&self, id: &str) -> Option<&WorkItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Status line for the current state.
    pub fn status(&self) -> StatusLine {
        StatusLine {
            view: self.view(),
            item_count: self.nodes.len(),
            loading: self.is_loading(),
            error: self.error.clone(),
        }
    }

    /// Copy of the current graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            view: self.view(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            status: self.status(),
        }
    }

    /// Start a fetch unless one is already in flight.
    ///
    /// Returns the id the new fetch was issued under.
    pub fn refresh(&mut self) -> Option<RequestId> {
        if self.is_loading() {
            debug!("Refresh skipped, fetch already in flight");
            return None;
        }
        let request_id = self.begin_request();
        self.dispatch(request_id);
        Some(request_id)
    }

    /// Commit a new current request id and enter `Loading`.
    fn begin_request(&mut self) -> RequestId {
        self.last_request = self.last_request.next();
        self.state = LoadState::Loading {
            request_id: self.last_request,
        };
        self.last_request
    }

    /// Spawn the fetch for an already committed id.
    ///
    /// The view is read when the task runs, not here. A panic inside the
    /// pipeline is reported as a failed result so the request still settles.
    fn dispatch(&self, request_id: RequestId) {
        let source = Arc::clone(&self.source);
        let enricher = self.enricher.clone();
        let rules = self.rules;
        let view = self.view.subscribe();
        let events = self.events.clone();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            let view = *view.borrow();
            debug!(%request_id, %view, "Graph fetch started");
            let pipeline = load_view(source.as_ref(), &enricher, rules, view, &cancel);
            let result = match AssertUnwindSafe(pipeline).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(%request_id, panic = %message, "Graph fetch panicked");
                    Err(Error::Panicked(message))
                }
            };
            if events
                .send(DashboardEvent::GraphLoaded { request_id, result })
                .is_err()
            {
                debug!(%request_id, "Graph result dropped, dashboard is gone");
            }
        });
    }

    /// Apply a fetch result if it belongs to the current request.
    ///
    /// Returns `true` if the result was applied. A result for any other id
    /// leaves every field untouched.
    pub fn handle_graph_loaded(&mut self, request_id: RequestId, result: Result<LoadedGraph>) -> bool {
        match self.state {
            LoadState::Loading { request_id: current } if current == request_id => {}
            _ => return false,
        }
        self.state = LoadState::Idle;

        match result {
            Ok(graph) => {
                let (nodes, edges) = assemble_graph(&graph.items);
                self.edges = drop_agent_edges(edges, &graph.agents);
                self.nodes = nodes;
                self.items = graph.items;
                self.error = None;
                info!(
                    %request_id,
                    view = %graph.view,
                    nodes = self.nodes.len(),
                    edges = self.edges.len(),
                    "Graph refreshed"
                );
            }
            Err(err) => {
                warn!(%request_id, error = %err, "Graph refresh failed, keeping previous graph");
                self.error = Some(banner(&err));
            }
        }
        true
    }

    /// Select the view the next fetch will list.
    ///
    /// Does not start a fetch or invalidate the one in flight.
    pub fn set_view(&mut self, view: ViewFilter) {
        self.view.send_replace(view);
    }

    /// Record whether the graph pane is on screen.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Schedule the first auto-refresh tick. No-op when disabled.
    pub fn start_auto_refresh(&self) {
        self.schedule_tick();
    }

    /// React to an auto-refresh tick.
    ///
    /// Refreshes only when visible and idle, and always schedules the next
    /// tick.
    pub fn on_auto_refresh_tick(&mut self) -> Option<RequestId> {
        let fired = if self.visible && !self.is_loading() {
            self.refresh()
        } else {
            debug!(visible = self.visible, loading = self.is_loading(), "Auto-refresh tick skipped");
            None
        };
        self.schedule_tick();
        fired
    }

    fn schedule_tick(&self) {
        let Some(interval) = self.auto_refresh.interval() else {
            return;
        };
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(interval) => {
                    // A closed channel means the dashboard shut down.
                    let _ = events.send(DashboardEvent::AutoRefreshTick);
                }
            }
        });
    }
}

/// Error banner text. Cancellation reads as such rather than as a failure.
fn banner(err: &Error) -> String {
    match err {
        Error::Source(source) if source.is_cancelled() => "refresh cancelled".to_string(),
        Error::Enrich(EnrichError::Cancelled) => "refresh cancelled".to_string(),
        other => other.to_string(),
    }
}
