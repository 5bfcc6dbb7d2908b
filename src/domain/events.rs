//! Event types for the run audit log.
//!
//! Every stage transition and agent outcome is recorded as an immutable event in
//! an append-only log next to the run's artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::run::Stage;

/// A single event in the append-only event log.
///
/// A run summary can be reconstructed by replaying its events in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Pipeline stage the event was emitted from
    pub stage: Stage,

    /// Revision iteration (1-based)
    pub iteration: u32,

    /// Element the event is about (if applicable)
    pub element_id: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (NO secrets)
    pub payload_summary: String,

    /// Time taken in milliseconds
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        stage: Stage,
        iteration: u32,
        event_type: EventType,
        payload_summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            stage,
            iteration,
            element_id: None,
            event_type,
            payload_summary: payload_summary.into(),
            duration_ms: None,
            error: None,
        }
    }

    /// Attach the element this event concerns
    pub fn for_element(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }

    /// Create an event with duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Create an event with error information
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Types of events that can occur during a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// The state machine moved to a new stage
    StageEntered,

    /// An element asset was generated and committed
    ElementGenerated,

    /// An element could not be generated this stage
    ElementGenerationFailed,

    /// A model call failed transiently and was retried
    CallRetrying,

    /// A candidate poster was composed
    CompositionBuilt,

    /// A validation check result was recorded
    CheckRecorded,

    /// A targeted revision was planned
    RevisionPlanned,

    /// All hard checks passed
    RunCompleted,

    /// The revision or time budget ran out; best candidate returned
    RunBudgetExhausted,

    /// The run stopped with a user-visible error
    RunFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            Stage::AssetGeneration,
            1,
            EventType::ElementGenerated,
            "Generated headline-1",
        )
        .for_element("headline-1");

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, EventType::ElementGenerated);
        assert_eq!(parsed.stage, Stage::AssetGeneration);
        assert_eq!(parsed.element_id.as_deref(), Some("headline-1"));
        assert!(json.contains("\"element_generated\""));
    }

    #[test]
    fn test_event_with_duration_and_error() {
        let event = Event::new(
            Uuid::new_v4(),
            Stage::AssetGeneration,
            2,
            EventType::ElementGenerationFailed,
            "Image generation failed",
        )
        .with_duration(1500)
        .with_error("Connection timeout");

        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error.as_deref(), Some("Connection timeout"));
    }
}
