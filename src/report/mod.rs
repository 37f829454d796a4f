//! Report rendering.
//!
//! Maps an experiment and its aggregated statistics to a chat message.

pub mod generator;

pub use generator::*;
