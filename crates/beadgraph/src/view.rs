//! Per-view filtering of listed items.
//!
//! The tracker's list call only narrows by status, so each view re-checks
//! status membership here and the Closed view adds its age cut. Agent items
//! are dropped from every view.

use crate::domain::{GraphEdge, Status, ViewFilter, WorkItem};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;

/// Default age limit for the Closed view, in days.
pub const DEFAULT_CLOSED_WINDOW_DAYS: i64 = 7;

/// Widest accepted Closed view window, in days.
pub const MAX_CLOSED_WINDOW_DAYS: i64 = 36_500;

/// Client-side filter applied to list results.
#[derive(Debug, Clone, Copy)]
pub struct ViewRules {
    /// `None` when the window is too wide to represent; no age cut applies.
    closed_window: Option<TimeDelta>,
}

impl Default for ViewRules {
    fn default() -> Self {
        Self::new(DEFAULT_CLOSED_WINDOW_DAYS)
    }
}

impl ViewRules {
    /// Rules whose Closed view keeps items closed within `closed_window_days`.
    pub fn new(closed_window_days: i64) -> Self {
        Self {
            closed_window: TimeDelta::try_days(closed_window_days),
        }
    }

    /// Whether `item` belongs in `view` at time `now`, ignoring agent exclusion.
    pub fn matches(&self, view: ViewFilter, item: &WorkItem, now: DateTime<Utc>) -> bool {
        match view {
            ViewFilter::Active => matches!(
                item.status,
                Status::Open | Status::InProgress | Status::Blocked
            ),
            ViewFilter::Backlog => item.status == Status::Deferred,
            ViewFilter::Closed => {
                item.status == Status::Closed
                    && item.closed_at.is_some_and(|closed| {
                        self.closed_window
                            .and_then(|window| now.checked_sub_signed(window))
                            .is_none_or(|cutoff| closed >= cutoff)
                    })
            }
        }
    }

    /// Keep the items of `view`, in order.
    pub fn select(&self, view: ViewFilter, items: Vec<WorkItem>, now: DateTime<Utc>) -> Vec<WorkItem> {
        items
            .into_iter()
            .filter(|item| self.matches(view, item, now))
            .collect()
    }
}

/// Split agent items off a batch.
///
/// Returns the visible items and the ids of the agents that were removed.
pub fn exclude_agents(items: Vec<WorkItem>) -> (Vec<WorkItem>, HashSet<String>) {
    let (agents, visible): (Vec<_>, Vec<_>) = items.into_iter().partition(WorkItem::is_agent);
    (visible, agents.into_iter().map(|a| a.id).collect())
}

/// Drop edges touching any of the excluded agent ids.
pub fn drop_agent_edges(edges: Vec<GraphEdge>, agents: &HashSet<String>) -> Vec<GraphEdge> {
    if agents.is_empty() {
        return edges;
    }
    edges
        .into_iter()
        .filter(|e| !agents.contains(&e.from) && !agents.contains(&e.to))
        .collect()
}
