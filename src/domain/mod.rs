//! Domain types for the posterloom orchestrator.
//!
//! This module contains the core data structures:
//! - Poster: the shared `PosterSpec`, elements, style guide and assets
//! - Composition: layered candidate posters and their manifest
//! - Validation: immutable check results
//! - Events / Run: the audit log and run state

pub mod color;
pub mod composition;
pub mod events;
pub mod poster;
pub mod run;
pub mod validation;

// Re-export commonly used types
pub use color::Rgb;
pub use composition::{Composition, Layer, LayerBody, ManifestEntry};
pub use events::{Event, EventType};
pub use poster::{
    content_digest, Asset, AssetBody, AssetMetadata, BoundingBox, BrandInput, Canvas, ColorRole,
    Constraint, ContentRole, Element, ElementId, ElementKind, ImageArtifact, Palette, PosterSpec,
    SpecError, StyleGuide, TextAlign, TextStyle, TypeRole, TypeRoles,
};
pub use run::{PipelineRun, RunSummary, Stage, Termination};
pub use validation::{hard_failures, CheckKind, Severity, ValidationResult};
