//! Run limits and input checks.
//!
//! Bounds every run through configurable limits on:
//! - Keyword count
//! - Revision loops
//! - Wall-clock time and per-call timeouts
//! - Denylist patterns for brand material (to avoid uploading secrets)

use std::path::Path;
use std::time::{Duration, Instant};

use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BrandInput, Canvas};

/// `pipeline:` section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineLimits {
    /// Loops back to asset generation before giving up (default: 3)
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,

    /// Simultaneous in-flight model calls (default: 2)
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_min_keywords")]
    pub min_keywords: usize,

    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Total run timeout in seconds (default: 1800 = 30 min)
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// Per-call timeout in seconds (default: 120)
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    #[serde(default)]
    pub canvas: Canvas,

    /// Inset from every canvas edge that text must respect
    #[serde(default = "default_margin")]
    pub margin_px: u32,

    /// 0 favours fidelity, 1 favours diversity
    #[serde(default = "default_quality_diversity")]
    pub quality_diversity: f32,
}

fn default_max_revisions() -> u32 {
    3
}
fn default_max_in_flight() -> usize {
    2
}
fn default_min_keywords() -> usize {
    2
}
fn default_max_keywords() -> usize {
    5
}
fn default_run_timeout() -> u64 {
    1800
} // 30 min
fn default_call_timeout() -> u64 {
    120
}
fn default_margin() -> u32 {
    36
}
fn default_quality_diversity() -> f32 {
    0.5
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            max_in_flight: default_max_in_flight(),
            min_keywords: default_min_keywords(),
            max_keywords: default_max_keywords(),
            run_timeout_seconds: default_run_timeout(),
            call_timeout_seconds: default_call_timeout(),
            canvas: Canvas::default(),
            margin_px: default_margin(),
            quality_diversity: default_quality_diversity(),
        }
    }
}

impl PipelineLimits {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Trim keywords and check their count
    pub fn validate_keywords(&self, keywords: &[String]) -> Result<Vec<String>, LimitViolation> {
        if keywords.len() < self.min_keywords {
            return Err(LimitViolation::TooFewKeywords {
                actual: keywords.len(),
                min: self.min_keywords,
            });
        }
        if keywords.len() > self.max_keywords {
            return Err(LimitViolation::TooManyKeywords {
                actual: keywords.len(),
                max: self.max_keywords,
            });
        }

        keywords
            .iter()
            .enumerate()
            .map(|(index, keyword)| {
                let trimmed = keyword.trim();
                if trimmed.is_empty() {
                    Err(LimitViolation::BlankKeyword { index })
                } else {
                    Ok(trimmed.to_string())
                }
            })
            .collect()
    }

    /// Check current budget state against limits
    pub fn check(&self, budget: &RunBudget) -> Result<(), LimitViolation> {
        if budget.revisions_used >= self.max_revisions {
            return Err(LimitViolation::MaxRevisions {
                used: budget.revisions_used,
                limit: self.max_revisions,
            });
        }

        budget.check_deadline()
    }
}

/// `input:` section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPolicy {
    /// Glob patterns to reject (brand files matching these won't be uploaded)
    #[serde(default = "default_denylist")]
    pub denylist_patterns: Vec<String>,
}

fn default_denylist() -> Vec<String> {
    vec![
        "**/.env*".to_string(),
        "**/secrets*".to_string(),
        "**/*credential*".to_string(),
        "**/*.pem".to_string(),
        "**/*.key".to_string(),
    ]
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self {
            denylist_patterns: default_denylist(),
        }
    }
}

impl InputPolicy {
    /// Check if an input path matches any denylist pattern
    pub fn is_denylisted(&self, path: &str) -> bool {
        self.denylist_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|pattern| pattern.matches(path))
    }

    /// Brand files must exist and stay clear of the denylist
    pub fn validate_brand(&self, brand: &BrandInput) -> Result<(), LimitViolation> {
        for path in brand.paths() {
            self.validate_path(path)?;
        }
        Ok(())
    }

    fn validate_path(&self, path: &Path) -> Result<(), LimitViolation> {
        let path_str = path.to_string_lossy();
        if self.is_denylisted(&path_str) {
            return Err(LimitViolation::DenylistMatch {
                path: path_str.to_string(),
            });
        }
        if !path.is_file() {
            return Err(LimitViolation::MissingFile {
                path: path_str.to_string(),
            });
        }
        Ok(())
    }
}

/// Tracks budget consumption during a run
#[derive(Debug, Clone)]
pub struct RunBudget {
    /// Loops back to asset generation so far
    pub revisions_used: u32,

    /// When the run started
    pub started_at: Instant,

    deadline: Duration,
}

impl RunBudget {
    pub fn new(deadline: Duration) -> Self {
        Self {
            revisions_used: 0,
            started_at: Instant::now(),
            deadline,
        }
    }

    /// Record one loop back to asset generation
    pub fn record_revision(&mut self) {
        self.revisions_used += 1;
    }

    pub fn is_past_deadline(&self) -> bool {
        self.started_at.elapsed() >= self.deadline
    }

    pub fn check_deadline(&self) -> Result<(), LimitViolation> {
        if self.is_past_deadline() {
            return Err(LimitViolation::RunTimeout {
                elapsed_seconds: self.started_at.elapsed().as_secs(),
                limit_seconds: self.deadline.as_secs(),
            });
        }
        Ok(())
    }
}

/// Limit violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitViolation {
    #[error("Expected at least {min} keywords, got {actual}")]
    TooFewKeywords { actual: usize, min: usize },

    #[error("Expected at most {max} keywords, got {actual}")]
    TooManyKeywords { actual: usize, max: usize },

    #[error("Keyword {index} is blank")]
    BlankKeyword { index: usize },

    #[error("Path matches denylist pattern: {path}")]
    DenylistMatch { path: String },

    #[error("Brand file not found: {path}")]
    MissingFile { path: String },

    #[error("Revision budget exhausted: {used} >= {limit}")]
    MaxRevisions { used: u32, limit: u32 },

    #[error("Run timeout: {elapsed_seconds}s >= {limit_seconds}s")]
    RunTimeout {
        elapsed_seconds: u64,
        limit_seconds: u64,
    },
}
