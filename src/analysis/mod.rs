//! The analysis pipeline.
//!
//! Aggregation of the business sources, prompt composition, response
//! extraction and the orchestrator that sequences them.

pub mod aggregator;
pub mod extract;
pub mod pipeline;
pub mod prompt;

pub use pipeline::{Pipeline, Preparer};
