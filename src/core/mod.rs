//! Core orchestration logic.
//!
//! This module contains:
//! - EventStore: Append-only event logging and run artifacts
//! - Limits: Revision, time and input limits
//! - Retry: Bounded, concurrency-capped service calls
//! - Output: Poster and editable bundle persistence
//! - Orchestrator: Main execution engine

pub mod event_store;
pub mod limits;
pub mod orchestrator;
pub mod output;
pub mod retry;

// Re-export commonly used types
pub use event_store::EventStore;
pub use limits::{InputPolicy, LimitViolation, PipelineLimits, RunBudget};
pub use orchestrator::{Orchestrator, PipelineOutcome, PipelineSettings, PosterRequest};
pub use output::{export_bundle, write_iteration, write_outputs, OutputPaths};
pub use retry::{CallFailure, CallOutcome, Invoker, RetryPolicy};
