//! Domain types for the bead dependency graph.
//!
//! [`WorkItem`] mirrors the JSON records emitted by the `bd` issue tracker.
//! [`GraphNode`] and [`GraphEdge`] are the render-ready projections handed to
//! the display layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Issue type marking internal bookkeeping items that never appear in a view.
pub const AGENT_ISSUE_TYPE: &str = "agent";

/// Issue type marking epics.
pub const EPIC_ISSUE_TYPE: &str = "epic";

/// Workflow status of a work item.
///
/// Unknown values reported by the tracker are kept verbatim in
/// [`Status::Other`] so a new upstream status never breaks parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Ready to work on
    #[default]
    Open,
    /// Currently being worked on
    InProgress,
    /// Waiting on another item
    Blocked,
    /// Parked in the backlog
    Deferred,
    /// Completed
    Closed,
    /// Any status this crate does not know about
    Other(String),
}

impl Status {
    /// The wire representation used by the tracker.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Deferred => "deferred",
            Self::Closed => "closed",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "in_progress" => Self::InProgress,
            "blocked" => Self::Blocked,
            "deferred" => Self::Deferred,
            "closed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// A reference from one work item to another, as returned by a detail fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    /// ID of the referenced item
    pub id: String,

    /// Title of the referenced item
    #[serde(default)]
    pub title: String,

    /// Status of the referenced item
    #[serde(default)]
    pub status: Status,

    /// Relationship type, free-form (e.g. "blocks", "parent-child")
    #[serde(default)]
    pub dependency_type: String,
}

/// A tracked work item ("bead").
///
/// List fetches populate everything except `dependencies` and `dependents`;
/// those only arrive with a detail fetch. The pipeline never edits a record in
/// place, it replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable unique identifier
    pub id: String,

    /// Item title
    #[serde(default)]
    pub title: String,

    /// Item description
    #[serde(default)]
    pub description: String,

    /// Current status
    #[serde(default)]
    pub status: Status,

    /// Priority (0 = highest)
    #[serde(default)]
    pub priority: u8,

    /// Free-form type tag ("task", "epic", "agent", ...)
    #[serde(default)]
    pub issue_type: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Close timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Hierarchical parent, present even without a detail fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Free-form notes
    #[serde(default)]
    pub notes: String,

    /// Labels
    #[serde(default)]
    pub labels: Vec<String>,

    /// Items this one depends on (detail fetch only)
    #[serde(default)]
    pub dependencies: Vec<DependencyRef>,

    /// Items depending on this one (detail fetch only)
    #[serde(default)]
    pub dependents: Vec<DependencyRef>,
}

impl WorkItem {
    /// Create a bare item with the given id and title, timestamps set to now.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: Status::Open,
            priority: 2,
            issue_type: "task".to_string(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            parent: None,
            notes: String::new(),
            labels: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }

    /// The parent id, treating an empty string as absent.
    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref().filter(|p| !p.is_empty())
    }

    /// Whether this item is internal bookkeeping.
    pub fn is_agent(&self) -> bool {
        self.issue_type == AGENT_ISSUE_TYPE
    }

    /// Whether this item is an epic.
    pub fn is_epic(&self) -> bool {
        self.issue_type == EPIC_ISSUE_TYPE
    }
}

/// Render-ready projection of a [`WorkItem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Item id
    pub id: String,
    /// Item title
    pub title: String,
    /// Item status
    pub status: Status,
    /// Item priority
    pub priority: u8,
    /// Item type tag
    pub issue_type: String,
    /// True iff the type is exactly "epic"
    pub is_epic: bool,
}

impl From<&WorkItem> for GraphNode {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            status: item.status.clone(),
            priority: item.priority,
            issue_type: item.issue_type.clone(),
            is_epic: item.is_epic(),
        }
    }
}

/// Kind of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Parent to child
    Hierarchy,
    /// Prerequisite to dependent
    Dependency,
}

/// A typed, directed edge between two items.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    /// Source item id
    pub from: String,
    /// Target item id
    pub to: String,
    /// Edge kind
    pub kind: EdgeKind,
}

impl GraphEdge {
    /// Hierarchy edge from `parent` to `child`.
    pub fn hierarchy(parent: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            from: parent.into(),
            to: child.into(),
            kind: EdgeKind::Hierarchy,
        }
    }

    /// Dependency edge from `prerequisite` to `dependent`.
    pub fn dependency(prerequisite: impl Into<String>, dependent: impl Into<String>) -> Self {
        Self {
            from: prerequisite.into(),
            to: dependent.into(),
            kind: EdgeKind::Dependency,
        }
    }
}

/// Which slice of the tracker the dashboard shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewFilter {
    /// Open, in-progress and blocked work
    #[default]
    Active,
    /// Deferred work
    Backlog,
    /// Recently closed work
    Closed,
}

impl ViewFilter {
    /// Display name of the view.
    pub fn name(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Backlog => "Backlog",
            Self::Closed => "Closed",
        }
    }

    /// The next view in Active → Backlog → Closed order.
    pub fn next(self) -> Self {
        match self {
            Self::Active => Self::Backlog,
            Self::Backlog => Self::Closed,
            Self::Closed => Self::Active,
        }
    }
}

impl fmt::Display for ViewFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier tagging an asynchronous fetch.
///
/// Coordinators hand out strictly increasing ids; a result is applied only if
/// it carries the id that is current when it arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RequestId(pub u64);

impl RequestId {
    /// The id following this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
