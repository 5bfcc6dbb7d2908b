//! Stateless agents invoked by the orchestrator.
//!
//! Agents read `&PosterSpec` and return values; committing results into the
//! spec is left to the orchestrator.

pub mod brand;
pub mod composition;
pub mod generation;
pub mod planning;
pub mod validation;

pub use brand::BrandGroundingAgent;
pub use composition::Compositor;
pub use generation::{
    GenerationJob, GenerationOutput, GenerationParams, ImageAgent, LayoutAgent, TextAgent,
};
pub use planning::{ElementRevision, PlanningAgent, RevisionPlan};
pub use validation::{CheckOverride, ValidationAgent, ValidationSettings};
