//! posterloom - Multi-agent poster generation orchestrator
//!
//! Turns a short keyword list (plus optional brand material) into a composed
//! poster and its editable bundle.
//!
//! # Architecture
//!
//! A single orchestrator owns the shared `PosterSpec` and drives a stage machine:
//! - Planning lays out the elements; brand grounding commits the style guide
//! - Asset generation fans out one job per element behind a join barrier
//! - Composition flattens layers; validation runs independent checks
//! - Hard failures loop back through targeted revision until the budget runs out
//!
//! Every run keeps an append-only event log under `<home>/runs/<run-id>/`.
//!
//! # Modules
//!
//! - `adapters`: Capability-typed model backends (local, HTTP)
//! - `agents`: Planning, brand, generation, composition and validation agents
//! - `core`: Orchestrator, event store, limits, retries and outputs
//! - `domain`: Data structures (PosterSpec, Composition, Event, Run)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Generate a poster
//! posterloom generate -k Italian Restaurant --wireframe
//!
//! # Check run status
//! posterloom status <run-id>
//! ```

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestrator, PipelineOutcome, PipelineSettings, PosterRequest};
pub use domain::{Composition, Event, EventType, PosterSpec, RunSummary, Stage, Termination};
pub use error::{CompositionError, PipelineError, ServiceError};
