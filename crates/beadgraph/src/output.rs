//! Line-oriented renderer for the `beadgraph` binary.
//!
//! Prints each accepted snapshot as a flat node list followed by its edges.
//! It draws no tree; layout belongs to a real terminal UI.

use crate::detail::DetailView;
use crate::domain::{EdgeKind, GraphNode, Status};
use crate::refresh::GraphSnapshot;
use crate::render::Renderer;
use colored::Colorize;
use std::env;
use std::io::{self, Write};

/// Output styling options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create an OutputConfig by reading from environment variables.
    ///
    /// Reads:
    /// - `NO_COLOR`: Standard env var to disable colors (any value disables colors)
    /// - `BEADGRAPH_COLOR`: Set to "0" or "false" to disable colors (default: true)
    pub fn from_env() -> Self {
        let use_colors = if env::var_os("NO_COLOR").is_some() {
            false
        } else {
            !matches!(env::var("BEADGRAPH_COLOR"), Ok(v) if v == "0" || v.eq_ignore_ascii_case("false"))
        };
        Self { use_colors }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { use_colors: true }
    }
}

fn paint_status(status: &Status, config: OutputConfig) -> String {
    let text = status.to_string();
    if !config.use_colors {
        return text;
    }
    match status {
        Status::Open => text.white().to_string(),
        Status::InProgress => text.yellow().to_string(),
        Status::Blocked => text.red().to_string(),
        Status::Deferred => text.dimmed().to_string(),
        Status::Closed => text.green().to_string(),
        Status::Other(_) => text,
    }
}

fn paint_id(id: &str, config: OutputConfig) -> String {
    if config.use_colors {
        id.cyan().to_string()
    } else {
        id.to_string()
    }
}

fn node_line(node: &GraphNode, config: OutputConfig) -> String {
    let kind = if node.is_epic && config.use_colors {
        node.issue_type.magenta().to_string()
    } else {
        node.issue_type.clone()
    };
    format!(
        "  {} [{kind}] P{} {} ({})",
        paint_id(&node.id, config),
        node.priority,
        node.title,
        paint_status(&node.status, config)
    )
}

/// Writes snapshots as plain text lines.
#[derive(Debug)]
pub struct TextRenderer<W: Write> {
    out: W,
    config: OutputConfig,
}

impl TextRenderer<io::Stdout> {
    /// Renderer writing to standard output.
    pub fn stdout(config: OutputConfig) -> Self {
        Self::new(io::stdout(), config)
    }
}

impl<W: Write> TextRenderer<W> {
    /// Renderer writing to `out`.
    pub fn new(out: W, config: OutputConfig) -> Self {
        Self { out, config }
    }

    /// Consume the renderer and return its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_snapshot(&mut self, snapshot: &GraphSnapshot) -> io::Result<()> {
        let status = snapshot.status.to_string();
        if !self.config.use_colors {
            writeln!(self.out, "{status}")?;
        } else if snapshot.status.error.is_some() {
            writeln!(self.out, "{}", status.red())?;
        } else {
            writeln!(self.out, "{}", status.bold())?;
        }
        for node in &snapshot.nodes {
            writeln!(self.out, "{}", node_line(node, self.config))?;
        }
        for edge in &snapshot.edges {
            let arrow = match edge.kind {
                EdgeKind::Hierarchy => "=>",
                EdgeKind::Dependency => "->",
            };
            writeln!(
                self.out,
                "    {} {arrow} {}",
                paint_id(&edge.from, self.config),
                paint_id(&edge.to, self.config)
            )?;
        }
        self.out.flush()
    }

    fn write_detail(&mut self, detail: Option<&DetailView>) -> io::Result<()> {
        let Some(detail) = detail else {
            return Ok(());
        };
        writeln!(self.out, "detail {}", paint_id(&detail.id, self.config))?;
        if let Some(item) = detail.item() {
            writeln!(self.out, "  {}", item.title)?;
            if !item.labels.is_empty() {
                writeln!(self.out, "  labels: {}", item.labels.join(", "))?;
            }
            for dep in &item.dependencies {
                writeln!(
                    self.out,
                    "  depends on {} ({})",
                    paint_id(&dep.id, self.config),
                    dep.dependency_type
                )?;
            }
            for dep in &item.dependents {
                writeln!(self.out, "  needed by {}", paint_id(&dep.id, self.config))?;
            }
        }
        if detail.loading {
            writeln!(self.out, "  loading…")?;
        }
        if let Some(error) = &detail.error {
            writeln!(self.out, "  error: {error}")?;
        }
        self.out.flush()
    }
}

impl<W: Write> Renderer for TextRenderer<W> {
    fn present(&mut self, snapshot: GraphSnapshot) {
        if let Err(e) = self.write_snapshot(&snapshot) {
            tracing::warn!(error = %e, "Failed to write graph snapshot");
        }
    }

    fn present_detail(&mut self, detail: Option<DetailView>) {
        if let Err(e) = self.write_detail(detail.as_ref()) {
            tracing::warn!(error = %e, "Failed to write detail view");
        }
    }
}
