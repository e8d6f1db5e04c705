//! Core data types shared by the feed and the aggregator.

pub mod instrument;
pub mod trade;

pub use instrument::*;
pub use trade::*;
