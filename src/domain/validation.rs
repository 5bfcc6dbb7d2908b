//! Validation check results.
//!
//! A `ValidationResult` is immutable once built: the pipeline appends new results
//! to the poster's history instead of editing old ones.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::poster::ElementId;

/// The checks the validation agent knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckKind {
    MarginTextPresence,
    Contrast,
    #[serde(rename = "color-count-consistency")]
    ColorCount,
    FontConsistency,
    TextCorrectness,
    TextOverlap,
    ImageTextFree,
    AestheticQuality,
}

impl CheckKind {
    /// Every check, in execution order
    pub const ALL: [CheckKind; 8] = [
        CheckKind::TextCorrectness,
        CheckKind::MarginTextPresence,
        CheckKind::TextOverlap,
        CheckKind::Contrast,
        CheckKind::ColorCount,
        CheckKind::FontConsistency,
        CheckKind::ImageTextFree,
        CheckKind::AestheticQuality,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::MarginTextPresence => "margin-text-presence",
            Self::Contrast => "contrast",
            Self::ColorCount => "color-count-consistency",
            Self::FontConsistency => "font-consistency",
            Self::TextCorrectness => "text-correctness",
            Self::TextOverlap => "text-overlap",
            Self::ImageTextFree => "image-text-free",
            Self::AestheticQuality => "aesthetic-quality",
        }
    }

    /// Severity used when the configuration does not override it
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::ColorCount | Self::FontConsistency => Severity::Soft,
            _ => Severity::Hard,
        }
    }

    /// Whether the check delegates to a non-deterministic external model
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Self::AestheticQuality)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hard failures block termination; soft (advisory) ones only annotate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Hard,
    Soft,
}

/// Outcome of one check for one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    check: CheckKind,
    passed: bool,
    severity: Severity,
    feedback: String,
    targets: Vec<ElementId>,
    deterministic: bool,
    score: Option<f64>,
    iteration: u32,
    recorded_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn pass(check: CheckKind, severity: Severity, iteration: u32) -> Self {
        Self {
            check,
            passed: true,
            severity,
            feedback: format!("{} passed", check),
            targets: Vec::new(),
            deterministic: check.is_deterministic(),
            score: None,
            iteration,
            recorded_at: Utc::now(),
        }
    }

    pub fn fail(
        check: CheckKind,
        severity: Severity,
        iteration: u32,
        feedback: impl Into<String>,
        targets: Vec<ElementId>,
    ) -> Self {
        Self {
            check,
            passed: false,
            severity,
            feedback: feedback.into(),
            targets,
            deterministic: check.is_deterministic(),
            score: None,
            iteration,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    pub fn check(&self) -> CheckKind {
        self.check
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    pub fn targets(&self) -> &[ElementId] {
        &self.targets
    }

    /// False when retrying the check may give a different verdict
    pub fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn is_hard_failure(&self) -> bool {
        !self.passed && self.severity == Severity::Hard
    }
}

/// Hard failures among `results`
pub fn hard_failures<'a>(
    results: impl IntoIterator<Item = &'a ValidationResult>,
) -> Vec<&'a ValidationResult> {
    results.into_iter().filter(|r| r.is_hard_failure()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_failure_is_not_hard() {
        let soft = ValidationResult::fail(
            CheckKind::FontConsistency,
            Severity::Soft,
            1,
            "three families",
            vec![],
        );
        let hard = ValidationResult::fail(
            CheckKind::Contrast,
            Severity::Hard,
            1,
            "low contrast",
            vec!["headline-1".into()],
        );
        let pass = ValidationResult::pass(CheckKind::MarginTextPresence, Severity::Hard, 1);

        assert!(!soft.is_hard_failure());
        assert!(hard.is_hard_failure());
        assert!(!pass.is_hard_failure());

        let all = [soft, hard, pass];
        let failures = hard_failures(all.iter());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].targets(), ["headline-1".to_string()]);
    }

    #[test]
    fn test_aesthetic_marked_non_deterministic() {
        let result = ValidationResult::pass(CheckKind::AestheticQuality, Severity::Hard, 2)
            .with_score(0.8);
        assert!(!result.is_deterministic());
        assert_eq!(result.score(), Some(0.8));
        assert!(ValidationResult::pass(CheckKind::Contrast, Severity::Hard, 2).is_deterministic());
    }

    #[test]
    fn test_check_names_match_serde() {
        for check in CheckKind::ALL {
            let json = serde_json::to_string(&check).unwrap();
            assert_eq!(json, format!("\"{}\"", check.name()));
        }
    }
}
