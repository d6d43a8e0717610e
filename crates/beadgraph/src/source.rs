//! Data sources that produce work items.
//!
//! The [`DataSource`] trait is the only seam between the refresh pipeline and
//! the issue tracker. [`CommandSource`] drives the `bd` command line;
//! [`MockSource`] (tests and the `test-util` feature) is a scripted in-memory
//! stand-in.
//!
//! # Example
//!
//! ```no_run
//! use beadgraph::domain::ViewFilter;
//! use beadgraph::source::{CommandSource, DataSource};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let source = CommandSource::new("bd");
//!     let cancel = CancellationToken::new();
//!     let items = source.list(ViewFilter::Active, &cancel).await?;
//!     println!("{} active items", items.len());
//!     Ok(())
//! }
//! ```

use crate::domain::{ViewFilter, WorkItem};
use crate::error::SourceError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result type for data source calls.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Supplies work items to the pipeline.
///
/// Implementations must be safe to call concurrently from several tasks.
/// Honoring the cancellation token is encouraged but optional; callers
/// tolerate sources that ignore it.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// List the items of a view, without dependency data.
    async fn list(&self, view: ViewFilter, cancel: &CancellationToken)
    -> SourceResult<Vec<WorkItem>>;

    /// Fetch one item with its dependencies, dependents and labels.
    async fn fetch_detail(&self, id: &str, cancel: &CancellationToken) -> SourceResult<WorkItem>;
}

/// Arguments passed to the tracker's `list` subcommand for a view.
///
/// The tracker cannot filter by close date, so the Closed view lists every
/// closed item and the age cut happens client-side.
pub fn list_args(view: ViewFilter) -> Vec<&'static str> {
    match view {
        ViewFilter::Active => vec!["list", "--json"],
        ViewFilter::Backlog => vec!["list", "--json", "--status", "deferred"],
        ViewFilter::Closed => vec!["list", "--json", "--status", "closed"],
    }
}

/// `show --json` prints either a single record or a one-element array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ShowOutput {
    Many(Vec<WorkItem>),
    One(Box<WorkItem>),
}

/// Parse the output of `show <id> --json`.
pub fn parse_show_output(id: &str, stdout: &[u8]) -> SourceResult<WorkItem> {
    match serde_json::from_slice::<ShowOutput>(stdout)? {
        ShowOutput::One(item) => Ok(*item),
        ShowOutput::Many(items) => items
            .into_iter()
            .find(|item| item.id == id)
            .ok_or_else(|| SourceError::NotFound(id.to_string())),
    }
}

/// Parse the output of `list --json`. Empty output means an empty list.
pub fn parse_list_output(stdout: &[u8]) -> SourceResult<Vec<WorkItem>> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(stdout)?)
}

/// A data source backed by the `bd` command line.
///
/// Each call spawns one child process. A cancelled call drops the child,
/// which kills it.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    working_dir: Option<PathBuf>,
}

impl CommandSource {
    /// Create a source that runs `program` in the current directory.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
        }
    }

    /// Run the tracker from `dir` instead of the current directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The program this source invokes.
    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: &[&str], cancel: &CancellationToken) -> SourceResult<Vec<u8>> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(command = %command_line, "Running tracker command");
        let child = command.spawn().map_err(|source| SourceError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let output = tokio::select! {
            () = cancel.cancelled() => return Err(SourceError::Cancelled),
            output = child.wait_with_output() => output.map_err(|source| SourceError::Spawn {
                command: command_line.clone(),
                source,
            })?,
        };

        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl DataSource for CommandSource {
    async fn list(
        &self,
        view: ViewFilter,
        cancel: &CancellationToken,
    ) -> SourceResult<Vec<WorkItem>> {
        let stdout = self.run(&list_args(view), cancel).await?;
        parse_list_output(&stdout)
    }

    async fn fetch_detail(&self, id: &str, cancel: &CancellationToken) -> SourceResult<WorkItem> {
        let stdout = self.run(&["show", id, "--json"], cancel).await?;
        parse_show_output(id, &stdout)
    }
}

// ========== Test Utilities ==========

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockSource;

#[cfg(any(test, feature = "test-util"))]
mod mock {
    use super::{DataSource, SourceResult};
    use crate::domain::{ViewFilter, WorkItem};
    use crate::error::SourceError;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Script {
        lists: HashMap<ViewFilter, Vec<WorkItem>>,
        list_error: Option<String>,
        list_delay: Option<Duration>,
        list_panics: bool,
        details: HashMap<String, WorkItem>,
        failing: HashSet<String>,
        panicking: HashSet<String>,
        delays: HashMap<String, Duration>,
        default_delay: Option<Duration>,
        ignore_cancel: bool,
        list_calls: Vec<ViewFilter>,
    }

    #[derive(Default)]
    struct Counters {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    /// Scripted, instrumented [`DataSource`] for tests.
    ///
    /// Clones share the same script and counters, so a test can keep one
    /// handle for assertions while the pipeline owns another.
    ///
    /// # Behavior
    ///
    /// - `list`: returns the items registered for the view (empty if none),
    ///   the scripted list error, or panics when told to
    /// - `fetch_detail`: sleeps for the item's delay, then fails, panics, or
    ///   returns the registered detail (falling back to the listed record)
    /// - Delays observe the cancellation token unless
    ///   [`ignore_cancellation`](MockSource::ignore_cancellation) was called
    #[derive(Clone, Default)]
    pub struct MockSource {
        script: Arc<Mutex<Script>>,
        counters: Arc<Counters>,
    }

    impl MockSource {
        /// Create an empty mock.
        pub fn new() -> Self {
            Self::default()
        }

        fn script(&self) -> MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Items returned by `list` for `view`.
        pub fn set_list(&self, view: ViewFilter, items: Vec<WorkItem>) -> &Self {
            self.script().lists.insert(view, items);
            self
        }

        /// Make every `list` call fail with `message`, or succeed again with `None`.
        pub fn set_list_error(&self, message: Option<&str>) -> &Self {
            self.script().list_error = message.map(str::to_string);
            self
        }

        /// Make every `list` call panic, or stop panicking with `false`.
        pub fn panic_on_list(&self, panics: bool) -> &Self {
            self.script().list_panics = panics;
            self
        }

        /// Delay every `list` call.
        pub fn set_list_delay(&self, delay: Duration) -> &Self {
            self.script().list_delay = Some(delay);
            self
        }

        /// Full record returned by `fetch_detail` for the item's id.
        pub fn set_detail(&self, item: WorkItem) -> &Self {
            self.script().details.insert(item.id.clone(), item);
            self
        }

        /// Make `fetch_detail` fail for `id`.
        pub fn fail_detail(&self, id: &str) -> &Self {
            self.script().failing.insert(id.to_string());
            self
        }

        /// Make `fetch_detail` panic for `id`.
        pub fn panic_on_detail(&self, id: &str) -> &Self {
            self.script().panicking.insert(id.to_string());
            self
        }

        /// Delay `fetch_detail` for `id`.
        pub fn set_detail_delay(&self, id: &str, delay: Duration) -> &Self {
            self.script().delays.insert(id.to_string(), delay);
            self
        }

        /// Delay every `fetch_detail` without a per-id delay.
        pub fn set_default_delay(&self, delay: Duration) -> &Self {
            self.script().default_delay = Some(delay);
            self
        }

        /// Sleep through cancellation instead of returning early.
        pub fn ignore_cancellation(&self) -> &Self {
            self.script().ignore_cancel = true;
            self
        }

        /// Views passed to `list`, in call order.
        pub fn list_calls(&self) -> Vec<ViewFilter> {
            self.script().list_calls.clone()
        }

        /// Highest number of concurrent `fetch_detail` calls observed.
        pub fn max_in_flight(&self) -> usize {
            self.counters.max_in_flight.load(Ordering::SeqCst)
        }

        /// Number of `fetch_detail` calls currently running.
        pub fn in_flight(&self) -> usize {
            self.counters.in_flight.load(Ordering::SeqCst)
        }

        /// Number of `fetch_detail` calls started.
        pub fn started(&self) -> usize {
            self.counters.started.load(Ordering::SeqCst)
        }

        /// Number of `fetch_detail` calls that returned or panicked.
        pub fn finished(&self) -> usize {
            self.counters.finished.load(Ordering::SeqCst)
        }

        async fn pause(delay: Option<Duration>, honor: bool, cancel: &CancellationToken) -> bool {
            let Some(delay) = delay else {
                return true;
            };
            if !honor {
                tokio::time::sleep(delay).await;
                return true;
            }
            tokio::select! {
                () = cancel.cancelled() => false,
                () = tokio::time::sleep(delay) => true,
            }
        }
    }

    /// Decrements the in-flight counter even when the call panics.
    struct InFlight<'a>(&'a Counters);

    impl<'a> InFlight<'a> {
        fn enter(counters: &'a Counters) -> Self {
            counters.started.fetch_add(1, Ordering::SeqCst);
            let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
            Self(counters)
        }
    }

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.0.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DataSource for MockSource {
        async fn list(
            &self,
            view: ViewFilter,
            cancel: &CancellationToken,
        ) -> SourceResult<Vec<WorkItem>> {
            let (delay, honor) = {
                let mut script = self.script();
                script.list_calls.push(view);
                (script.list_delay, !script.ignore_cancel)
            };
            if !Self::pause(delay, honor, cancel).await {
                return Err(SourceError::Cancelled);
            }

            let script = self.script();
            if script.list_panics {
                drop(script);
                panic!("scripted list panic for {view}");
            }
            if let Some(message) = &script.list_error {
                return Err(SourceError::Other(message.clone()));
            }
            Ok(script.lists.get(&view).cloned().unwrap_or_default())
        }

        async fn fetch_detail(
            &self,
            id: &str,
            cancel: &CancellationToken,
        ) -> SourceResult<WorkItem> {
            let _guard = InFlight::enter(&self.counters);

            let (delay, honor) = {
                let script = self.script();
                (
                    script.delays.get(id).copied().or(script.default_delay),
                    !script.ignore_cancel,
                )
            };
            if !Self::pause(delay, honor, cancel).await {
                return Err(SourceError::Cancelled);
            }

            let script = self.script();
            if script.panicking.contains(id) {
                drop(script);
                panic!("scripted panic for {id}");
            }
            if script.failing.contains(id) {
                return Err(SourceError::Other(format!("scripted failure for {id}")));
            }
            script
                .details
                .get(id)
                .cloned()
                .or_else(|| {
                    script
                        .lists
                        .values()
                        .flatten()
                        .find(|item| item.id == id)
                        .cloned()
                })
                .ok_or_else(|| SourceError::NotFound(id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Status;

    const SHOW_JSON: &str = r#"[{
        "id": "bd-2",
        "title": "Wire the thing",
        "status": "blocked",
        "priority": 1,
        "issue_type": "task",
        "created_at": "2026-03-01T10:00:00Z",
        "updated_at": "2026-03-02T10:00:00Z",
        "labels": ["backend"],
        "dependencies": [
            {"id": "bd-1", "title": "Epic", "status": "open", "dependency_type": "parent-child"},
            {"id": "bd-3", "title": "Schema", "status": "in_progress", "dependency_type": "blocks"}
        ],
        "dependents": []
    }]"#;

    #[test]
    fn list_args_select_status_per_view() {
        assert_eq!(list_args(ViewFilter::Active), ["list", "--json"]);
        assert_eq!(
            list_args(ViewFilter::Backlog),
            ["list", "--json", "--status", "deferred"]
        );
        assert_eq!(
            list_args(ViewFilter::Closed),
            ["list", "--json", "--status", "closed"]
        );
    }

    #[test]
    fn show_output_array_is_parsed() {
        let item = parse_show_output("bd-2", SHOW_JSON.as_bytes()).unwrap();
        assert_eq!(item.status, Status::Blocked);
        assert_eq!(item.labels, ["backend"]);
        assert_eq!(item.dependencies.len(), 2);
        assert_eq!(item.dependencies[0].dependency_type, "parent-child");
    }

    #[test]
    fn show_output_object_is_parsed() {
        let json = r#"{"id": "bd-5", "created_at": "2026-03-01T10:00:00Z", "updated_at": "2026-03-01T10:00:00Z"}"#;
        let item = parse_show_output("bd-5", json.as_bytes()).unwrap();
        assert_eq!(item.id, "bd-5");
    }

    #[test]
    fn show_output_without_match_is_not_found() {
        let err = parse_show_output("bd-9", b"[]").unwrap_err();
        assert!(matches!(err, SourceError::NotFound(id) if id == "bd-9"));
    }

    #[test]
    fn blank_list_output_is_empty() {
        assert!(parse_list_output(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn malformed_list_output_is_parse_error() {
        assert!(matches!(
            parse_list_output(b"{not json"),
            Err(SourceError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let source = CommandSource::new("beadgraph-definitely-not-installed");
        let err = source
            .list(ViewFilter::Active, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Spawn { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let source = CommandSource::new("bd");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = source.fetch_detail("bd-1", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn mock_source_counts_calls() {
        let mock = MockSource::new();
        mock.set_list(ViewFilter::Active, vec![WorkItem::new("bd-1", "one")]);
        let cancel = CancellationToken::new();

        let listed = mock.list(ViewFilter::Active, &cancel).await.unwrap();
        let detail = mock.fetch_detail("bd-1", &cancel).await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(detail.id, "bd-1");
        assert_eq!(mock.started(), 1);
        assert_eq!(mock.finished(), 1);
        assert_eq!(mock.list_calls(), [ViewFilter::Active]);
    }
}
