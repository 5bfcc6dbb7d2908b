//! Pipeline run state and reconstruction from events.
//!
//! A `PipelineRun` is one poster-generation session. It exclusively owns the
//! `PosterSpec`; `RunSummary` is the lightweight view rebuilt from the event log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventType};
use super::poster::PosterSpec;

/// States of the orchestration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    BrandGrounding,
    AssetGeneration,
    Composition,
    Validation,
    Revise,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::BrandGrounding => "brand_grounding",
            Self::AssetGeneration => "asset_generation",
            Self::Composition => "composition",
            Self::Validation => "validation",
            Self::Revise => "revise",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum Termination {
    /// Every hard check passed
    AllChecksPassed,

    /// Revision or time budget ran out; the best candidate is returned
    BudgetExhausted { detail: String },

    /// A user-visible error stopped the run
    Error { message: String },
}

impl Termination {
    /// Whether the returned poster passed every hard check
    pub fn quality_guaranteed(&self) -> bool {
        matches!(self, Self::AllChecksPassed)
    }
}

/// A poster-generation session
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub id: Uuid,
    pub spec: PosterSpec,
    pub stage: Stage,
    /// Current validation iteration (1-based)
    pub iteration: u32,
    /// Loops back to asset generation consumed so far
    pub revisions_used: u32,
    pub termination: Option<Termination>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(id: Uuid, spec: PosterSpec) -> Self {
        Self {
            id,
            spec,
            stage: Stage::Planning,
            iteration: 1,
            revisions_used: 0,
            termination: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Record the termination reason and move to the matching terminal stage
    pub fn terminate(&mut self, termination: Termination) {
        self.stage = match termination {
            Termination::AllChecksPassed => Stage::Done,
            _ => Stage::Failed,
        };
        self.termination = Some(termination);
        self.completed_at = Some(Utc::now());
    }
}

/// Run state as recovered from its event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub keywords: String,
    pub stage: Stage,
    pub iteration: u32,
    pub elements_generated: u32,
    pub checks_failed: u32,
    pub termination: Option<Termination>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    /// Reconstruct a summary from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut summary = Self {
            id: first_event.run_id,
            keywords: String::new(),
            stage: first_event.stage,
            iteration: first_event.iteration,
            elements_generated: 0,
            checks_failed: 0,
            termination: None,
            started_at: first_event.timestamp,
            completed_at: None,
        };

        for event in events {
            summary.apply_event(event);
        }

        Some(summary)
    }

    /// Apply a single event to update the summary
    pub fn apply_event(&mut self, event: &Event) {
        self.stage = event.stage;
        self.iteration = self.iteration.max(event.iteration);

        match event.event_type {
            EventType::RunStarted => {
                self.started_at = event.timestamp;
                self.keywords = event.payload_summary.clone();
            }
            EventType::ElementGenerated => self.elements_generated += 1,
            EventType::CheckRecorded => {
                if event.error.is_some() {
                    self.checks_failed += 1;
                }
            }
            EventType::RunCompleted => {
                self.stage = Stage::Done;
                self.termination = Some(Termination::AllChecksPassed);
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunBudgetExhausted => {
                self.stage = Stage::Failed;
                self.termination = Some(Termination::BudgetExhausted {
                    detail: event.error.clone().unwrap_or_default(),
                });
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.stage = Stage::Failed;
                self.termination = Some(Termination::Error {
                    message: event.error.clone().unwrap_or_default(),
                });
                self.completed_at = Some(event.timestamp);
            }
            EventType::StageEntered
            | EventType::ElementGenerationFailed
            | EventType::CallRetrying
            | EventType::CompositionBuilt
            | EventType::RevisionPlanned => {}
        }
    }

    pub fn is_running(&self) -> bool {
        self.termination.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::poster::BrandInput;

    #[test]
    fn test_run_creation() {
        let run_id = Uuid::new_v4();
        let spec = PosterSpec::new(vec!["Italian".into()], BrandInput::default());
        let mut run = PipelineRun::new(run_id, spec);

        assert_eq!(run.stage, Stage::Planning);
        assert_eq!(run.iteration, 1);
        assert!(run.termination.is_none());

        run.terminate(Termination::BudgetExhausted {
            detail: "3 revisions used".into(),
        });
        assert_eq!(run.stage, Stage::Failed);
        assert!(!run.termination.as_ref().unwrap().quality_guaranteed());
    }

    #[test]
    fn test_summary_from_events() {
        let run_id = Uuid::new_v4();

        let events = vec![
            Event::new(run_id, Stage::Planning, 1, EventType::RunStarted, "Italian, Restaurant"),
            Event::new(
                run_id,
                Stage::AssetGeneration,
                1,
                EventType::ElementGenerated,
                "headline-1",
            ),
            Event::new(run_id, Stage::Validation, 1, EventType::CheckRecorded, "contrast")
                .with_error("low contrast"),
            Event::new(
                run_id,
                Stage::AssetGeneration,
                2,
                EventType::ElementGenerated,
                "headline-1",
            ),
            Event::new(run_id, Stage::Validation, 2, EventType::RunCompleted, "done"),
        ];

        let summary = RunSummary::from_events(&events).unwrap();

        assert_eq!(summary.id, run_id);
        assert_eq!(summary.keywords, "Italian, Restaurant");
        assert_eq!(summary.stage, Stage::Done);
        assert_eq!(summary.iteration, 2);
        assert_eq!(summary.elements_generated, 2);
        assert_eq!(summary.checks_failed, 1);
        assert_eq!(summary.termination, Some(Termination::AllChecksPassed));
        assert!(RunSummary::from_events(&[]).is_none());
    }
}
