//! Error types for beadgraph.

use crate::domain::WorkItem;
use std::io;
use thiserror::Error;

/// Errors produced by a [`DataSource`](crate::source::DataSource).
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The tracker command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The tracker command exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The tracker produced output that could not be parsed.
    #[error("invalid tracker output: {0}")]
    Parse(#[from] serde_json::Error),

    /// The requested item does not exist.
    #[error("item not found: {0}")]
    NotFound(String),

    /// Any other source failure.
    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Whether this error represents an expected cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Batch-level failures of [`Enricher::enrich`](crate::enrich::Enricher::enrich).
///
/// Individual item failures never show up here; they are logged and the
/// affected items keep their list data.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The cancellation token fired before or during enrichment.
    #[error("enrichment cancelled")]
    Cancelled,

    /// At least one worker panicked.
    ///
    /// `partial` still holds every result the other workers produced, in
    /// input order.
    #[error("enrichment worker panicked for {}", panicked.join(", "))]
    WorkerPanicked {
        /// Results in input order, enriched where a worker succeeded.
        partial: Vec<WorkItem>,
        /// IDs of the items whose workers panicked.
        panicked: Vec<String>,
    },
}

/// The error type for beadgraph operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A data source call failed.
    #[error("{0}")]
    Source(#[from] SourceError),

    /// Enrichment failed as a whole.
    #[error("{0}")]
    Enrich(#[from] EnrichError),

    /// A background fetch panicked before producing a result.
    #[error("fetch panicked: {0}")]
    Panicked(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A specialized Result type for beadgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicked_error_lists_item_ids() {
        let err = EnrichError::WorkerPanicked {
            partial: vec![],
            panicked: vec!["bd-1".to_string(), "bd-7".to_string()],
        };
        assert_eq!(err.to_string(), "enrichment worker panicked for bd-1, bd-7");
    }

    #[test]
    fn source_errors_convert_transparently() {
        let err: Error = SourceError::NotFound("bd-9".to_string()).into();
        assert_eq!(err.to_string(), "item not found: bd-9");
    }

    #[test]
    fn only_cancelled_reports_cancellation() {
        assert!(SourceError::Cancelled.is_cancelled());
        assert!(!SourceError::Other("boom".to_string()).is_cancelled());
    }
}
