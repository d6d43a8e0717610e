//! End-to-end tests for the refresh pipeline.
//!
//! These drive list → filter → enrich → assemble through the public API with
//! a scripted [`MockSource`], covering:
//! - A small epic/task hierarchy
//! - Partial enrichment failure
//! - Agent exclusion in every view
//! - Stale results racing a newer refresh

use beadgraph::app::Dashboard;
use beadgraph::config::DashboardConfig;
use beadgraph::domain::{DependencyRef, EdgeKind, GraphEdge, Status, ViewFilter, WorkItem};
use beadgraph::enrich::Enricher;
use beadgraph::event::DashboardEvent;
use beadgraph::refresh::load_view;
use beadgraph::render::Update;
use beadgraph::source::MockSource;
use beadgraph::view::ViewRules;
use chrono::{Duration as Days, Utc};
use rstest::rstest;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod helpers {
    use super::*;

    pub fn item(id: &str, issue_type: &str, status: Status) -> WorkItem {
        let mut item = WorkItem::new(id, format!("{id} title"));
        item.issue_type = issue_type.to_string();
        item.status = status;
        item
    }

    pub fn dep(id: &str, dependency_type: &str) -> DependencyRef {
        DependencyRef {
            id: id.to_string(),
            title: format!("{id} title"),
            status: Status::Open,
            dependency_type: dependency_type.to_string(),
        }
    }

    /// Epic E, task A under E, task B blocked by A.
    pub fn hierarchy(mock: &MockSource) {
        let epic = item("E", "epic", Status::Open);
        let mut a = item("A", "task", Status::InProgress);
        a.parent = Some("E".to_string());
        let b = item("B", "task", Status::Blocked);
        mock.set_list(ViewFilter::Active, vec![epic.clone(), a.clone(), b.clone()]);

        let mut a_full = a;
        a_full.dependencies = vec![dep("E", "parent-child")];
        a_full.labels = vec!["core".to_string()];
        let mut b_full = b;
        b_full.dependencies = vec![dep("A", "blocks"), dep("E", "PARENT_CHILD")];
        mock.set_detail(epic).set_detail(a_full).set_detail(b_full);
    }

    pub fn config() -> DashboardConfig {
        DashboardConfig {
            auto_refresh_secs: 0,
            ..DashboardConfig::default()
        }
    }

    pub async fn next_update(dashboard: &mut Dashboard) -> Option<Update> {
        let event = dashboard.next_event().await.expect("event channel open");
        dashboard.handle_event(event)
    }
}

use helpers::*;

#[tokio::test]
async fn epic_with_tasks_builds_typed_graph() {
    let mock = MockSource::new();
    hierarchy(&mock);
    let mut dashboard = Dashboard::new(Arc::new(mock.clone()), &config());

    dashboard.refresh();
    let Some(Update::Graph(snapshot)) = next_update(&mut dashboard).await else {
        panic!("expected graph update");
    };

    assert_eq!(snapshot.nodes.len(), 3);
    assert!(snapshot.nodes[0].is_epic);
    let hierarchy = snapshot
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Hierarchy)
        .count();
    assert!(hierarchy >= 2);
    assert_eq!(
        snapshot.edges,
        vec![
            GraphEdge::hierarchy("E", "A"),
            GraphEdge::dependency("A", "B"),
            GraphEdge::hierarchy("E", "B"),
        ]
    );
    assert_eq!(mock.started(), 3);
}

#[tokio::test]
async fn one_failed_detail_leaves_item_unenriched() {
    let mock = MockSource::new();
    hierarchy(&mock);
    mock.fail_detail("B");
    let enricher = Enricher::new(Arc::new(mock.clone()));

    let graph = load_view(
        &mock,
        &enricher,
        ViewRules::default(),
        ViewFilter::Active,
        &CancellationToken::new(),
    )
    .await
    .expect("partial failure is not a pipeline error");

    assert_eq!(graph.items.len(), 3);
    assert_eq!(graph.items[1].labels, ["core"]);
    assert_eq!(graph.items[1].dependencies.len(), 1);
    assert!(graph.items[2].dependencies.is_empty());
    assert_eq!(graph.items[2].title, "B title");
}

#[tokio::test]
async fn worker_panic_fails_refresh_but_keeps_previous_graph() {
    let mock = MockSource::new();
    hierarchy(&mock);
    let mut dashboard = Dashboard::new(Arc::new(mock.clone()), &config());
    dashboard.refresh();
    next_update(&mut dashboard).await;

    mock.panic_on_detail("A");
    dashboard.refresh();
    let Some(Update::Graph(snapshot)) = next_update(&mut dashboard).await else {
        panic!("expected graph update");
    };

    assert_eq!(snapshot.nodes.len(), 3);
    let error = snapshot.status.error.expect("panic surfaces as banner");
    assert!(error.contains("panicked"), "{error}");
}

#[rstest]
#[case(ViewFilter::Active, Status::Open)]
#[case(ViewFilter::Backlog, Status::Deferred)]
#[case(ViewFilter::Closed, Status::Closed)]
#[tokio::test]
async fn agents_never_appear_in_any_view(#[case] view: ViewFilter, #[case] status: Status) {
    let mock = MockSource::new();
    let mut agent = item("agent-7", "agent", status.clone());
    let mut task = item("T", "task", status);
    if view == ViewFilter::Closed {
        agent.closed_at = Some(Utc::now() - Days::days(1));
        task.closed_at = Some(Utc::now() - Days::days(1));
    }
    mock.set_list(view, vec![agent, task]);
    let enricher = Enricher::new(Arc::new(mock.clone()));

    let graph = load_view(
        &mock,
        &enricher,
        ViewRules::default(),
        view,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let ids: Vec<_> = graph.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["T"]);
    assert!(graph.agents.contains("agent-7"));
}

#[tokio::test]
async fn closed_view_drops_items_closed_long_ago() {
    let mock = MockSource::new();
    let mut recent = item("recent", "task", Status::Closed);
    recent.closed_at = Some(Utc::now() - Days::days(2));
    let mut old = item("old", "task", Status::Closed);
    old.closed_at = Some(Utc::now() - Days::days(30));
    mock.set_list(ViewFilter::Closed, vec![old, recent]);
    let enricher = Enricher::new(Arc::new(mock.clone()));

    let graph = load_view(
        &mock,
        &enricher,
        ViewRules::default(),
        ViewFilter::Closed,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(graph.items.len(), 1);
    assert_eq!(graph.items[0].id, "recent");
    assert_eq!(mock.started(), 1);
}

#[tokio::test(start_paused = true)]
async fn superseded_refresh_result_is_discarded() {
    let mock = MockSource::new();
    hierarchy(&mock);
    mock.set_list_delay(Duration::from_secs(1));
    let (tx, mut rx) = beadgraph::event::channel();
    let mut coordinator = beadgraph::refresh::RefreshCoordinator::new(
        Arc::new(mock.clone()),
        ViewFilter::Active,
        tx,
        CancellationToken::new(),
    );

    let first = coordinator.refresh().unwrap();
    let DashboardEvent::GraphLoaded { request_id, result } = rx.recv().await.unwrap() else {
        panic!("expected graph event");
    };
    assert_eq!(request_id, first);

    // A second request becomes current before the first result is handled.
    assert!(coordinator.handle_graph_loaded(request_id, result));
    let second = coordinator.refresh().unwrap();
    assert!(!coordinator.handle_graph_loaded(first, Ok(Default::default())));
    assert_eq!(coordinator.snapshot().nodes.len(), 3);

    let DashboardEvent::GraphLoaded { request_id, result } = rx.recv().await.unwrap() else {
        panic!("expected graph event");
    };
    assert_eq!(request_id, second);
    assert!(coordinator.handle_graph_loaded(request_id, result));
}
