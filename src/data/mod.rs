//! Data source access.

pub mod source;

pub use source::{SourceClient, resolve_source};
