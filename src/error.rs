//! Error taxonomy for the pipeline.
//!
//! Only `InvalidInput` and service errors that outlive their retry budget reach
//! the caller. Incomplete assets, hard validation failures and budget exhaustion
//! are absorbed by the orchestrator's control loop.

use std::time::Duration;

use thiserror::Error;

use crate::adapters::Capability;
use crate::core::retry::CallFailure;
use crate::domain::{ElementId, SpecError};

/// Failure of a call to an external model service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{capability} service unavailable: {message}")]
    Transient {
        capability: Capability,
        message: String,
    },

    #[error("{capability} service rejected the request: {message}")]
    Permanent {
        capability: Capability,
        message: String,
    },

    #[error("{capability} call timed out after {after:?}")]
    Timeout {
        capability: Capability,
        after: Duration,
    },

    #[error("No backend bound for capability {0}")]
    Unbound(Capability),
}

impl ServiceError {
    pub fn transient(capability: Capability, message: impl Into<String>) -> Self {
        Self::Transient {
            capability,
            message: message.into(),
        }
    }

    pub fn permanent(capability: Capability, message: impl Into<String>) -> Self {
        Self::Permanent {
            capability,
            message: message.into(),
        }
    }

    /// Timeouts and rate limits are worth retrying; everything else is not
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Composition could not produce a candidate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error("Missing assets for elements: {}", missing.join(", "))]
    IncompleteAssets { missing: Vec<ElementId> },

    #[error("Style guide has not been committed")]
    MissingStyle,

    #[error("{source}")]
    Service {
        #[source]
        source: ServiceError,
        attempts: u32,
    },
}

impl From<CallFailure> for CompositionError {
    fn from(failure: CallFailure) -> Self {
        Self::Service {
            source: failure.error,
            attempts: failure.attempts,
        }
    }
}

/// User-visible pipeline failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model service kept failing after {attempts} attempts: {source}")]
    TransientServiceError {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("Model service failed: {0}")]
    PermanentServiceError(#[source] ServiceError),

    #[error("Poster state invariant violated: {0}")]
    Spec(#[from] SpecError),

    #[error("Composition failed: {0}")]
    Composition(CompositionError),

    #[error("Generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl PipelineError {
    /// Classify a service error that escaped its retry loop
    pub fn from_service(error: ServiceError, attempts: u32) -> Self {
        if error.is_transient() {
            Self::TransientServiceError {
                attempts,
                source: error,
            }
        } else {
            Self::PermanentServiceError(error)
        }
    }
}

impl From<CompositionError> for PipelineError {
    fn from(error: CompositionError) -> Self {
        match error {
            CompositionError::Service { source, attempts } => Self::from_service(source, attempts),
            other => Self::Composition(other),
        }
    }
}

impl From<CallFailure> for PipelineError {
    fn from(failure: CallFailure) -> Self {
        Self::from_service(failure.error, failure.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_classification() {
        assert!(ServiceError::transient(Capability::ImageGen, "429").is_transient());
        assert!(ServiceError::Timeout {
            capability: Capability::TextGen,
            after: Duration::from_secs(5),
        }
        .is_transient());
        assert!(!ServiceError::permanent(Capability::ImageGen, "400").is_transient());
        assert!(!ServiceError::Unbound(Capability::LayoutGen).is_transient());
    }

    #[test]
    fn test_pipeline_error_from_service() {
        let err = PipelineError::from_service(ServiceError::transient(Capability::ImageGen, "busy"), 3);
        assert!(matches!(
            err,
            PipelineError::TransientServiceError { attempts: 3, .. }
        ));

        let err = PipelineError::from_service(ServiceError::permanent(Capability::ImageGen, "bad"), 1);
        assert!(matches!(err, PipelineError::PermanentServiceError(_)));
    }

    #[test]
    fn test_incomplete_assets_message() {
        let err = CompositionError::IncompleteAssets {
            missing: vec!["background-1".into(), "cta-1".into()],
        };
        assert_eq!(err.to_string(), "Missing assets for elements: background-1, cta-1");
    }
}
