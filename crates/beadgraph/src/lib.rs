//! Beadgraph - live dependency graph for a beads terminal dashboard.
//!
//! This crate keeps a graph of tracked work items fresh while a terminal
//! event loop keeps running. It lists items from the tracker, enriches each
//! one with its dependencies using a bounded set of concurrent fetches,
//! derives typed edges, and hands renderers snapshots that are never older
//! than the latest accepted refresh.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod domain;
pub mod error;
pub mod graph;
pub mod source;
pub mod view;

// Concurrency and coordination
pub mod detail;
pub mod enrich;
pub mod event;
pub mod refresh;

// Control loop and renderer seam
pub mod app;
pub mod config;
pub mod render;

// CLI front end (needed by binary)
pub mod cli;
pub mod output;
