//! Dashboard context for the graph pane.
//!
//! [`Dashboard`] owns both coordinators, the event channel they report on,
//! and the shutdown token their background tasks observe. Every method is
//! non-blocking; results come back through [`Dashboard::next_event`] and are
//! applied with [`Dashboard::handle_event`].
//!
//! # Example
//!
//! ```no_run
//! use beadgraph::app::Dashboard;
//! use beadgraph::config::DashboardConfig;
//! use beadgraph::source::CommandSource;
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = DashboardConfig::default();
//!     let source = Arc::new(CommandSource::new(config.command.clone()));
//!     let mut dashboard = Dashboard::new(source, &config);
//!     dashboard.start();
//!     while let Some(event) = dashboard.next_event().await {
//!         if let Some(update) = dashboard.handle_event(event) {
//!             println!("{update:?}");
//!         }
//!     }
//! }
//! ```

use crate::config::DashboardConfig;
use crate::detail::{DetailCoordinator, DetailView};
use crate::domain::ViewFilter;
use crate::event::{self, DashboardEvent, EventReceiver};
use crate::refresh::{GraphSnapshot, RefreshCoordinator};
use crate::render::Update;
use crate::source::DataSource;
use crate::view::ViewRules;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The graph pane's control state.
#[derive(Debug)]
pub struct Dashboard {
    graph: RefreshCoordinator,
    detail: DetailCoordinator,
    events: EventReceiver,
    shutdown: CancellationToken,
}

impl Dashboard {
    /// Create a dashboard over `source` configured by `config`.
    ///
    /// Nothing is fetched until [`start`](Self::start) or
    /// [`refresh`](Self::refresh) is called.
    pub fn new(source: Arc<dyn DataSource>, config: &DashboardConfig) -> Self {
        let (tx, rx) = event::channel();
        let shutdown = CancellationToken::new();
        let graph = RefreshCoordinator::new(
            Arc::clone(&source),
            config.initial_view,
            tx.clone(),
            shutdown.clone(),
        )
        .with_rules(ViewRules::new(config.closed_window_days))
        .with_auto_refresh(config.auto_refresh());
        let detail = DetailCoordinator::new(source, tx, shutdown.clone());

        Self {
            graph,
            detail,
            events: rx,
            shutdown,
        }
    }

    /// Issue the first refresh and start the auto-refresh timer.
    pub fn start(&mut self) {
        self.graph.refresh();
        self.graph.start_auto_refresh();
    }

    /// The main graph coordinator.
    pub fn graph(&self) -> &RefreshCoordinator {
        &self.graph
    }

    /// The drill-down coordinator.
    pub fn detail(&self) -> &DetailCoordinator {
        &self.detail
    }

    /// Copy of the current graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    /// Start a graph fetch unless one is in flight.
    pub fn refresh(&mut self) {
        self.graph.refresh();
    }

    /// Select the view the next fetch will list.
    pub fn set_view(&mut self, view: ViewFilter) {
        self.graph.set_view(view);
    }

    /// Record whether the graph pane is on screen.
    pub fn set_visible(&mut self, visible: bool) {
        self.graph.set_visible(visible);
    }

    /// Open the drill-down for `id`, seeded with whatever the graph knows.
    pub fn open_detail(&mut self, id: &str) {
        let summary = self.graph.item(id).cloned();
        self.detail.open(id, summary);
    }

    /// Close the drill-down.
    pub fn close_detail(&mut self) {
        self.detail.close();
    }

    /// Wait for the next background event.
    ///
    /// Returns `None` once every sender is gone, which cannot happen while
    /// the dashboard itself is alive.
    pub async fn next_event(&mut self) -> Option<DashboardEvent> {
        self.events.recv().await
    }

    /// Apply an event and report what needs redrawing.
    pub fn handle_event(&mut self, event: DashboardEvent) -> Option<Update> {
        match event {
            DashboardEvent::GraphLoaded { request_id, result } => {
                if self.graph.handle_graph_loaded(request_id, result) {
                    Some(Update::Graph(self.graph.snapshot()))
                } else {
                    debug!(%request_id, "Discarded stale graph result");
                    None
                }
            }
            DashboardEvent::DetailLoaded { request_id, result } => {
                if self.detail.handle_detail_loaded(request_id, result) {
                    Some(Update::Detail(self.detail.view().cloned()))
                } else {
                    debug!(%request_id, "Discarded stale detail result");
                    None
                }
            }
            DashboardEvent::AutoRefreshTick => self
                .graph
                .on_auto_refresh_tick()
                .map(|_| Update::Graph(self.graph.snapshot())),
        }
    }

    /// The open drill-down pane.
    pub fn detail_view(&self) -> Option<&DetailView> {
        self.detail.view()
    }

    /// Cancel every background fetch and stop the auto-refresh timer.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
