//! CLI argument parsing and the watch loop.
//!
//! # Example
//!
//! ```bash
//! beadgraph                          # watch the Active view, refresh every 5s
//! beadgraph --view closed --once     # print recently closed items and exit
//! beadgraph --detail bd-42 --once    # print the graph and one item's detail
//! ```

use crate::app::Dashboard;
use crate::config::DashboardConfig;
use crate::domain::ViewFilter;
use crate::event::DashboardEvent;
use crate::output::{OutputConfig, TextRenderer};
use crate::render::Renderer;
use crate::source::CommandSource;
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

/// View selection for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewArg {
    /// Open, in-progress and blocked work
    Active,
    /// Deferred work
    Backlog,
    /// Work closed in the last week
    Closed,
}

impl From<ViewArg> for ViewFilter {
    fn from(arg: ViewArg) -> Self {
        match arg {
            ViewArg::Active => Self::Active,
            ViewArg::Backlog => Self::Backlog,
            ViewArg::Closed => Self::Closed,
        }
    }
}

/// Beadgraph - live dependency graph of beads
///
/// Lists work items from the tracker, enriches them with dependency data and
/// prints the resulting graph every time it changes.
#[derive(Parser, Debug)]
#[command(name = "beadgraph")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: .beadgraph/config.yaml in the current directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Tracker command to run
    #[arg(long)]
    pub command: Option<String>,

    /// Directory to run the tracker in
    #[arg(short = 'C', long)]
    pub dir: Option<PathBuf>,

    /// Seconds between auto-refreshes (0 disables)
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// View to show
    #[arg(long, value_enum)]
    pub view: Option<ViewArg>,

    /// Open the detail pane for this item once the graph has loaded
    #[arg(long)]
    pub detail: Option<String>,

    /// Render once and exit instead of watching
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    /// Parse arguments from the process command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the config file and apply command-line overrides.
    pub async fn resolve_config(&self) -> Result<DashboardConfig> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => DashboardConfig::default_path(
                &std::env::current_dir().context("Failed to read current directory")?,
            ),
        };
        let mut config = if self.config.is_some() {
            DashboardConfig::load(&path).await
        } else {
            DashboardConfig::load_or_default(&path).await
        }
        .with_context(|| format!("Failed to load {}", path.display()))?;

        if let Some(command) = &self.command {
            config.command.clone_from(command);
        }
        if let Some(dir) = &self.dir {
            config.working_dir = Some(dir.clone());
        }
        if let Some(interval) = self.interval {
            config.auto_refresh_secs = interval;
        }
        if let Some(view) = self.view {
            config.initial_view = view.into();
        }
        if self.once {
            config.auto_refresh_secs = 0;
        }
        config.validate()?;
        Ok(config)
    }

    /// Run the dashboard until Ctrl-C, or until the first graph with `--once`.
    pub async fn execute(self) -> Result<()> {
        let config = self.resolve_config().await?;
        tracing::debug!(?config, "Resolved configuration");

        let mut source = CommandSource::new(config.command.clone());
        if let Some(dir) = &config.working_dir {
            source = source.with_working_dir(dir);
        }

        let mut dashboard = Dashboard::new(Arc::new(source), &config);
        let mut renderer = TextRenderer::stdout(OutputConfig::from_env());
        let mut pending_detail = self.detail.clone();
        dashboard.start();

        loop {
            let event = tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    tracing::debug!("Interrupted, shutting down");
                    dashboard.shutdown();
                    return Ok(());
                }
                event = dashboard.next_event() => match event {
                    Some(event) => event,
                    None => return Ok(()),
                },
            };

            let graph_event = matches!(event, DashboardEvent::GraphLoaded { .. });
            let detail_event = matches!(event, DashboardEvent::DetailLoaded { .. });
            let Some(update) = dashboard.handle_event(event) else {
                continue;
            };
            update.render_to(&mut renderer);

            if graph_event && let Some(id) = pending_detail.take() {
                dashboard.open_detail(&id);
                renderer.present_detail(dashboard.detail_view().cloned());
                continue;
            }

            let detail_pending = dashboard.detail().current_request().is_some();
            if self.once && (graph_event || detail_event) && !detail_pending {
                dashboard.shutdown();
                if let Some(error) = dashboard.graph().error() {
                    bail!("Refresh failed: {error}");
                }
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn flags_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "command: tracker\nauto-refresh-secs: 9\n").unwrap();

        let cli = Cli::parse_from([
            "beadgraph",
            "--config",
            path.to_str().unwrap(),
            "--interval",
            "2",
            "--view",
            "backlog",
        ]);
        let config = cli.resolve_config().await.unwrap();

        assert_eq!(config.command, "tracker");
        assert_eq!(config.auto_refresh_secs, 2);
        assert_eq!(config.initial_view, ViewFilter::Backlog);
    }

    #[tokio::test]
    async fn once_disables_auto_refresh() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "auto-refresh-secs: 9\n").unwrap();

        let cli = Cli::parse_from(["beadgraph", "--config", path.to_str().unwrap(), "--once"]);
        let config = cli.resolve_config().await.unwrap();
        assert_eq!(config.auto_refresh_secs, 0);
    }

    #[tokio::test]
    async fn explicit_missing_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope.yaml");
        let cli = Cli::parse_from(["beadgraph", "--config", path.to_str().unwrap()]);
        assert!(cli.resolve_config().await.is_err());
    }
}
