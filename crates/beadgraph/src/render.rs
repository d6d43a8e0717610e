//! Renderer seam.
//!
//! Layout and drawing live outside this crate. A renderer receives owned
//! copies of the graph and drill-down state and must not assume it will be
//! called again with the same data.

use crate::detail::DetailView;
use crate::refresh::GraphSnapshot;

/// Consumes state changes produced by the dashboard.
pub trait Renderer {
    /// Draw a new graph snapshot.
    fn present(&mut self, snapshot: GraphSnapshot);

    /// Draw the drill-down pane, or clear it with `None`.
    fn present_detail(&mut self, detail: Option<DetailView>);
}

/// A state change worth redrawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// The graph or its status line changed
    Graph(GraphSnapshot),
    /// The drill-down pane changed
    Detail(Option<DetailView>),
}

impl Update {
    /// Hand this update to `renderer`.
    pub fn render_to(self, renderer: &mut dyn Renderer) {
        match self {
            Self::Graph(snapshot) => renderer.present(snapshot),
            Self::Detail(detail) => renderer.present_detail(detail),
        }
    }
}
