//! `cov-periods` library crate.
//!
//! The binary (`cov`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes
//! - the CLI and the TUI share one load / normalize / aggregate / merge path
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod plot;
pub mod report;
pub mod transform;
pub mod tui;
