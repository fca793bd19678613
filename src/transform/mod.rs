//! The aggregation core: normalize → aggregate → merge.
//!
//! Every stage is a pure function over borrowed input that returns new values.

pub mod aggregate;
pub mod merge;
pub mod normalize;

pub use aggregate::aggregate;
pub use merge::{JoinPolicy, merge};
pub use normalize::normalize;
