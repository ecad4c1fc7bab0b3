//! Batch Orchestrator: many documents through the single-document pipeline
//! under a bounded worker pool and one shared rate limiter.

pub mod types;
pub mod runner;

pub use types::*;
pub use runner::{BatchAnalyzer, WorkerPool};
