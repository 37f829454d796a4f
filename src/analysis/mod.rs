//! Analysis modules.
//!
//! Turns raw provider statistics into the grouped view used by the report
//! renderer.

pub mod aggregator;

pub use aggregator::*;
