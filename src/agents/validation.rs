//! Validation agent: automated checks against a composed candidate.
//!
//! Every check is independent and can be disabled or re-graded in the
//! `validation:` config section. All checks except `aesthetic-quality` are pure
//! functions of the poster state and the composition.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::{Capability, ScoreRequest, ServiceRequest, ServiceResponse};
use crate::core::retry::{CallFailure, Invoker};
use crate::domain::{
    CheckKind, Composition, Constraint, Element, ElementId, ElementKind, LayerBody, PosterSpec,
    Rgb, Severity, ValidationResult,
};

/// Per-check switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOverride {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub severity: Option<Severity>,
}

fn default_enabled() -> bool {
    true
}

/// `validation:` section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Minimum WCAG contrast ratio between text and its backdrop (default: 4.5)
    #[serde(default = "default_min_contrast")]
    pub min_contrast_ratio: f64,

    #[serde(default = "default_max_colors")]
    pub max_colors: usize,

    #[serde(default = "default_max_font_families")]
    pub max_font_families: usize,

    /// Minimum aesthetic score in 0..=1 (default: 0.6)
    #[serde(default = "default_aesthetic_threshold")]
    pub aesthetic_threshold: f64,

    #[serde(default)]
    pub checks: HashMap<CheckKind, CheckOverride>,
}

fn default_min_contrast() -> f64 {
    4.5
}
fn default_max_colors() -> usize {
    5
}
fn default_max_font_families() -> usize {
    2
}
fn default_aesthetic_threshold() -> f64 {
    0.6
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_contrast_ratio: default_min_contrast(),
            max_colors: default_max_colors(),
            max_font_families: default_max_font_families(),
            aesthetic_threshold: default_aesthetic_threshold(),
            checks: HashMap::new(),
        }
    }
}

impl ValidationSettings {
    pub fn is_enabled(&self, check: CheckKind) -> bool {
        self.checks.get(&check).map_or(true, |o| o.enabled)
    }

    pub fn severity(&self, check: CheckKind) -> Severity {
        self.checks
            .get(&check)
            .and_then(|o| o.severity)
            .unwrap_or_else(|| check.default_severity())
    }
}

/// Color the element sits on: the topmost image beneath it, else the canvas background
pub fn backdrop_color(spec: &PosterSpec, element: &Element) -> Rgb {
    spec.layout()
        .iter()
        .rev()
        .filter(|e| e.z < element.z && e.kind != ElementKind::Text)
        .filter(|e| e.bbox.intersects(&element.bbox))
        .find_map(|e| spec.asset(&e.id).and_then(|a| a.metadata.dominant_color))
        .or_else(|| spec.style().map(|s| s.palette.background))
        .unwrap_or(Rgb::WHITE)
}

#[derive(Debug, Clone)]
pub struct ValidationAgent {
    settings: ValidationSettings,
    margin_px: u32,
}

impl ValidationAgent {
    pub fn new(settings: ValidationSettings, margin_px: u32) -> Self {
        Self {
            settings,
            margin_px,
        }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Run every enabled check in order.
    ///
    /// Only a transient aesthetic-service failure that outlives its retries is
    /// returned as an error; a rejected scoring request becomes a soft annotation.
    pub async fn validate(
        &self,
        invoker: &Invoker,
        spec: &PosterSpec,
        composition: &Composition,
        iteration: u32,
    ) -> Result<Vec<ValidationResult>, CallFailure> {
        let mut results = self.run_deterministic(spec, composition, iteration);

        if self.settings.is_enabled(CheckKind::AestheticQuality) {
            results.push(self.aesthetic_quality(invoker, spec, composition, iteration).await?);
        }

        Ok(results)
    }

    /// The pure checks, in execution order
    pub fn run_deterministic(
        &self,
        spec: &PosterSpec,
        composition: &Composition,
        iteration: u32,
    ) -> Vec<ValidationResult> {
        CheckKind::ALL
            .into_iter()
            .filter(|check| check.is_deterministic() && self.settings.is_enabled(*check))
            .map(|check| {
                let failure = match check {
                    CheckKind::TextCorrectness => self.text_correctness(spec),
                    CheckKind::MarginTextPresence => self.margin_text_presence(spec, composition),
                    CheckKind::TextOverlap => self.text_overlap(spec),
                    CheckKind::Contrast => self.contrast(spec, composition),
                    CheckKind::ColorCount => self.color_count(spec, composition),
                    CheckKind::FontConsistency => self.font_consistency(composition),
                    CheckKind::ImageTextFree => self.image_text_free(spec),
                    CheckKind::AestheticQuality => None,
                };
                let severity = self.settings.severity(check);
                match failure {
                    None => ValidationResult::pass(check, severity, iteration),
                    Some((feedback, targets)) => {
                        debug!(%check, %feedback, "Check failed");
                        ValidationResult::fail(check, severity, iteration, feedback, targets)
                    }
                }
            })
            .collect()
    }

    fn text_correctness(&self, spec: &PosterSpec) -> Option<(String, Vec<ElementId>)> {
        let mut problems = Vec::new();
        let mut targets = Vec::new();

        for element in spec.layout().iter().filter(|e| e.is_text()) {
            let Some(content) = spec.asset(&element.id).and_then(|a| a.text()) else {
                continue;
            };
            let words = content.split_whitespace().count();

            let problem = if words == 0 {
                Some("is empty".to_string())
            } else if content.contains("...") || content.contains('…') {
                Some("looks truncated".to_string())
            } else {
                element
                    .role
                    .word_limit()
                    .filter(|limit| words > *limit)
                    .map(|limit| format!("has {words} words, limit is {limit}"))
            };

            if let Some(problem) = problem {
                problems.push(format!("{} {}", element.id, problem));
                targets.push(element.id.clone());
            }
        }

        (!targets.is_empty()).then(|| (problems.join("; "), targets))
    }

    fn margin_text_presence(
        &self,
        spec: &PosterSpec,
        composition: &Composition,
    ) -> Option<(String, Vec<ElementId>)> {
        let safe = composition.canvas.safe_area(self.margin_px);
        let targets: Vec<ElementId> = spec
            .layout()
            .iter()
            .filter(|e| e.has_constraint(Constraint::WithinMargin) && !safe.contains(&e.bbox))
            .map(|e| e.id.clone())
            .collect();

        (!targets.is_empty()).then(|| {
            (
                format!(
                    "{} outside the {}px margin",
                    targets.join(", "),
                    self.margin_px
                ),
                targets,
            )
        })
    }

    /// Overlapping text pairs; the upper element of each pair is the one to move
    fn text_overlap(&self, spec: &PosterSpec) -> Option<(String, Vec<ElementId>)> {
        let text: Vec<&Element> = spec.layout().iter().filter(|e| e.is_text()).collect();
        let mut targets = BTreeSet::new();
        let mut pairs = Vec::new();

        for (i, lower) in text.iter().enumerate() {
            for upper in &text[i + 1..] {
                let constrained = lower.has_constraint(Constraint::NoTextOverlap)
                    || upper.has_constraint(Constraint::NoTextOverlap);
                if constrained && lower.bbox.intersects(&upper.bbox) {
                    pairs.push(format!("{} overlaps {}", upper.id, lower.id));
                    targets.insert(upper.id.clone());
                }
            }
        }

        (!targets.is_empty()).then(|| (pairs.join("; "), targets.into_iter().collect()))
    }

    fn contrast(&self, spec: &PosterSpec, composition: &Composition) -> Option<(String, Vec<ElementId>)> {
        let mut problems = Vec::new();
        let mut targets = Vec::new();

        for layer in &composition.layers {
            let LayerBody::Text { color, .. } = &layer.body else {
                continue;
            };
            let Some(element) = spec.element(&layer.element_id) else {
                continue;
            };
            let backdrop = backdrop_color(spec, element);
            let ratio = color.contrast_ratio(backdrop);
            if ratio < self.settings.min_contrast_ratio {
                problems.push(format!(
                    "{} contrast {:.2}:1 on {} is below {:.1}:1",
                    layer.element_id, ratio, backdrop, self.settings.min_contrast_ratio
                ));
                targets.push(layer.element_id.clone());
            }
        }

        (!targets.is_empty()).then(|| (problems.join("; "), targets))
    }

    fn color_count(&self, spec: &PosterSpec, composition: &Composition) -> Option<(String, Vec<ElementId>)> {
        let palette: Vec<Rgb> = spec
            .style()
            .map(|s| s.palette.colors().to_vec())
            .unwrap_or_default();

        let mut colors = BTreeSet::new();
        if let Some(style) = spec.style() {
            colors.insert(style.palette.background.to_hex());
        }
        let mut off_palette = Vec::new();

        for layer in &composition.layers {
            match &layer.body {
                LayerBody::Text { color, .. } => {
                    colors.insert(color.to_hex());
                    if !palette.contains(color) {
                        off_palette.push(layer.element_id.clone());
                    }
                }
                LayerBody::Image { .. } => {
                    if let Some(dominant) = spec
                        .asset(&layer.element_id)
                        .and_then(|a| a.metadata.dominant_color)
                    {
                        colors.insert(dominant.to_hex());
                    }
                }
            }
        }

        (colors.len() > self.settings.max_colors).then(|| {
            (
                format!(
                    "{} distinct colors, at most {} allowed",
                    colors.len(),
                    self.settings.max_colors
                ),
                off_palette,
            )
        })
    }

    fn font_consistency(&self, composition: &Composition) -> Option<(String, Vec<ElementId>)> {
        let mut families: Vec<&str> = Vec::new();
        let mut targets = Vec::new();

        for layer in &composition.layers {
            let LayerBody::Text { font_family, .. } = &layer.body else {
                continue;
            };
            if !families.contains(&font_family.as_str()) {
                families.push(font_family);
            }
            if families.len() > self.settings.max_font_families
                && !families[..self.settings.max_font_families].contains(&font_family.as_str())
            {
                targets.push(layer.element_id.clone());
            }
        }

        (families.len() > self.settings.max_font_families).then(|| {
            (
                format!(
                    "{} font families ({}), at most {} allowed",
                    families.len(),
                    families.join(", "),
                    self.settings.max_font_families
                ),
                targets,
            )
        })
    }

    fn image_text_free(&self, spec: &PosterSpec) -> Option<(String, Vec<ElementId>)> {
        let targets: Vec<ElementId> = spec
            .layout()
            .iter()
            .filter(|e| e.kind == ElementKind::Image)
            .filter(|e| spec.asset(&e.id).map_or(false, |a| a.metadata.contains_text))
            .map(|e| e.id.clone())
            .collect();

        (!targets.is_empty()).then(|| {
            (
                format!("{} contains rendered text", targets.join(", ")),
                targets,
            )
        })
    }

    async fn aesthetic_quality(
        &self,
        invoker: &Invoker,
        spec: &PosterSpec,
        composition: &Composition,
        iteration: u32,
    ) -> Result<ValidationResult, CallFailure> {
        let check = CheckKind::AestheticQuality;
        let severity = self.settings.severity(check);
        let threshold = self.settings.aesthetic_threshold;

        let request = ServiceRequest::Score(ScoreRequest {
            image: composition.image.clone(),
            keywords: spec.keywords().to_vec(),
        });

        let score = match invoker.call(&request).await {
            Ok(outcome) => match outcome.response {
                ServiceResponse::Score(score) => score,
                other => {
                    let error = other.unexpected(Capability::AestheticScore);
                    warn!(%error, "Aesthetic scoring returned the wrong payload");
                    return Ok(unscored(iteration, &error.to_string()));
                }
            },
            Err(failure) if !failure.error.is_transient() => {
                warn!(error = %failure.error, "Aesthetic scoring unavailable");
                return Ok(unscored(iteration, &failure.error.to_string()));
            }
            Err(failure) => return Err(failure),
        };

        if score >= threshold {
            return Ok(ValidationResult::pass(check, severity, iteration)
                .with_score(score)
                .with_feedback(format!("aesthetic score {score:.2} meets {threshold:.2}")));
        }

        let targets = spec
            .layout()
            .iter()
            .filter(|e| e.kind == ElementKind::Image)
            .map(|e| e.id.clone())
            .collect();
        Ok(ValidationResult::fail(
            check,
            severity,
            iteration,
            format!("aesthetic score {score:.2} below {threshold:.2}"),
            targets,
        )
        .with_score(score))
    }
}

/// Advisory result for a scoring request the backend refused
fn unscored(iteration: u32, reason: &str) -> ValidationResult {
    ValidationResult::fail(
        CheckKind::AestheticQuality,
        Severity::Soft,
        iteration,
        format!("aesthetic score unavailable: {reason}"),
        Vec::new(),
    )
}
