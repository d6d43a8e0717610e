//! Events delivered from background tasks to the control loop.
//!
//! Background work never touches coordinator state. It sends one of these,
//! tagged with the request id it was started under, and the control loop
//! decides whether to apply it.

use crate::domain::{RequestId, ViewFilter, WorkItem};
use crate::error::Result;
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Sender half shared by every background task.
pub type EventSender = mpsc::UnboundedSender<DashboardEvent>;

/// Receiver half owned by the control loop.
pub type EventReceiver = mpsc::UnboundedReceiver<DashboardEvent>;

/// Create the dashboard's event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Items fetched for one view, ready to assemble.
#[derive(Debug, Clone, Default)]
pub struct LoadedGraph {
    /// The view the list call was made for
    pub view: ViewFilter,
    /// Visible items, enriched where possible, in list order
    pub items: Vec<WorkItem>,
    /// Ids of agent items removed from the batch
    pub agents: HashSet<String>,
}

/// A completed background operation or timer tick.
#[derive(Debug)]
pub enum DashboardEvent {
    /// A graph fetch finished.
    GraphLoaded {
        /// Id the fetch was issued under
        request_id: RequestId,
        /// Fetched items or the error that ended the fetch
        result: Result<LoadedGraph>,
    },

    /// A drill-down detail fetch finished.
    DetailLoaded {
        /// Id the fetch was issued under
        request_id: RequestId,
        /// Full record or the error that ended the fetch
        result: Result<WorkItem>,
    },

    /// The auto-refresh timer fired.
    AutoRefreshTick,
}
