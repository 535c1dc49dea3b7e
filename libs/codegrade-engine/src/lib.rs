//! Code submission evaluation engine.
//!
//! Data flows strictly top-down:
//! `Evaluator` (orchestrator) → `TestCaseRunner` → `ExecutionClient` →
//! `normalizer`, then back up through the `aggregator`.

pub mod aggregator;
pub mod client;
pub mod error;
pub mod normalizer;
pub mod orchestrator;
pub mod runner;


pub use client::ExecutionClient;
pub use error::{EvaluationError, ExecutionError};
pub use orchestrator::{Evaluator, EvaluatorSettings};
pub use tokio_util::sync::CancellationToken;
