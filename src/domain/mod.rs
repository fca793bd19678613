//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the fixed field set and derived metrics (`Field`, `Metric`)
//! - calendar buckets (`Granularity`, `Period`)
//! - record and table shapes for each stage (`RawRecord` .. `MergedTable`)
//! - run configuration (`DashConfig`, `DataSource`)

pub mod period;
pub mod types;

pub use period::*;
pub use types::*;
