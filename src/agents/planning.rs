//! Planning: keywords to layout, validation feedback to targeted revisions.

use std::collections::BTreeMap;

use crate::domain::{
    BoundingBox, BrandInput, Canvas, CheckKind, ColorRole, Constraint, ContentRole, Element,
    ElementId, ElementKind, PosterSpec, TextAlign, TextStyle, TypeRole, ValidationResult,
};
use crate::error::PipelineError;

use super::validation::backdrop_color;

/// Longest guidance string handed to a generation agent
pub const MAX_GUIDANCE_CHARS: usize = 300;

/// What to redo for one element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementRevision {
    /// Regenerate the element's content
    pub regenerate_content: bool,
    /// Ask the layout service for new geometry
    pub refine_geometry: bool,
    /// Switch a text element to another palette role
    pub restyle: Option<ColorRole>,
    /// Feedback forwarded to the generation agents
    pub guidance: String,
}

impl ElementRevision {
    fn add_guidance(&mut self, feedback: &str) {
        if !self.guidance.is_empty() {
            self.guidance.push_str("; ");
        }
        self.guidance.push_str(feedback);
        if self.guidance.chars().count() > MAX_GUIDANCE_CHARS {
            self.guidance = self.guidance.chars().take(MAX_GUIDANCE_CHARS).collect();
        }
    }

    /// Whether a generation task is needed (restyling alone is applied in place)
    pub fn needs_generation(&self) -> bool {
        self.regenerate_content || self.refine_geometry
    }
}

/// Elements to revise after a failed validation, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionPlan {
    pub elements: BTreeMap<ElementId, ElementRevision>,
}

impl RevisionPlan {
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element_ids(&self) -> Vec<ElementId> {
        self.elements.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&ElementRevision> {
        self.elements.get(id)
    }
}

#[derive(Debug, Clone)]
pub struct PlanningAgent {
    canvas: Canvas,
    margin_px: u32,
}

impl PlanningAgent {
    pub fn new(canvas: Canvas, margin_px: u32) -> Self {
        Self { canvas, margin_px }
    }

    /// Initial element list: full-bleed background, optional logo, headline, body and call to action
    pub fn plan(&self, keywords: &[String], brand: &BrandInput) -> Result<Vec<Element>, PipelineError> {
        if keywords.is_empty() {
            return Err(PipelineError::InvalidInput("keyword list is empty".into()));
        }

        let topic = keywords.join(", ");
        let safe = self.canvas.safe_area(self.margin_px);
        let h = self.canvas.height;
        let mut elements = Vec::new();
        let mut z = 0;

        elements.push(Element {
            id: element_id(ContentRole::Background),
            kind: ContentRole::Background.kind(),
            role: ContentRole::Background,
            bbox: self.canvas.bounds(),
            z,
            constraints: vec![Constraint::FullBleed],
            text_style: None,
            brief: format!("Atmospheric poster background evoking {topic}"),
        });

        let mut top = safe.y;
        if brand.logo.is_some() {
            z += 1;
            let side = (safe.w / 5).max(48);
            elements.push(Element {
                id: element_id(ContentRole::Logo),
                kind: ContentRole::Logo.kind(),
                role: ContentRole::Logo,
                bbox: BoundingBox::new(safe.x + (safe.w - side) / 2, top, side, side),
                z,
                constraints: vec![Constraint::WithinMargin, Constraint::KeepAspect],
                text_style: None,
                brief: "Brand logo".into(),
            });
            top += side;
        }

        let text_blocks = [
            (
                ContentRole::Headline,
                top.max(h * 16 / 100),
                h * 14 / 100,
                TextStyle {
                    role: TypeRole::Display,
                    color: ColorRole::Background,
                    size_px: scaled(72, h),
                    weight: 700,
                    align: TextAlign::Center,
                },
                format!("Short, bold headline about {topic}"),
            ),
            (
                ContentRole::Body,
                top.max(h * 16 / 100) + h * 17 / 100,
                h * 11 / 100,
                TextStyle {
                    role: TypeRole::Body,
                    color: ColorRole::Background,
                    size_px: scaled(32, h),
                    weight: 400,
                    align: TextAlign::Center,
                },
                format!("One-line supporting message for {topic}"),
            ),
            (
                ContentRole::CallToAction,
                safe.bottom().saturating_sub(h * 10 / 100 + h * 4 / 100),
                h * 10 / 100,
                TextStyle {
                    role: TypeRole::Label,
                    color: ColorRole::Secondary,
                    size_px: scaled(40, h),
                    weight: 700,
                    align: TextAlign::Center,
                },
                "Call to action".to_string(),
            ),
        ];

        for (role, y, height, style, brief) in text_blocks {
            z += 1;
            elements.push(Element {
                id: element_id(role),
                kind: role.kind(),
                role,
                bbox: BoundingBox::new(safe.x, y, safe.w, height),
                z,
                constraints: vec![Constraint::WithinMargin, Constraint::NoTextOverlap],
                text_style: Some(style),
                brief,
            });
        }

        Ok(elements)
    }

    /// Map the hard failures of one iteration to the smallest set of element revisions
    pub fn revise(&self, spec: &PosterSpec, failures: &[&ValidationResult]) -> RevisionPlan {
        let mut plan = RevisionPlan::default();

        for result in failures.iter().filter(|r| r.is_hard_failure()) {
            let targets = implicated_elements(spec, result);

            for id in targets {
                let Some(element) = spec.element(&id) else {
                    continue;
                };
                let revision = plan.elements.entry(id.clone()).or_default();
                revision.add_guidance(result.feedback());

                match result.check() {
                    CheckKind::MarginTextPresence | CheckKind::TextOverlap => {
                        revision.refine_geometry = true;
                    }
                    CheckKind::Contrast => match best_text_role(spec, element) {
                        Some(role) => revision.restyle = Some(role),
                        None => revision.regenerate_content = true,
                    },
                    CheckKind::TextCorrectness
                    | CheckKind::ImageTextFree
                    | CheckKind::AestheticQuality
                    | CheckKind::ColorCount
                    | CheckKind::FontConsistency => revision.regenerate_content = true,
                }
            }
        }

        plan
    }
}

fn element_id(role: ContentRole) -> ElementId {
    format!("{}-1", role.id_prefix())
}

/// Font size scaled from the 1280px reference height
fn scaled(size: u32, height: u32) -> u32 {
    (size * height / 1280).max(12)
}

/// Targets of a failed check; a failure without targets implicates the image elements
fn implicated_elements(spec: &PosterSpec, result: &ValidationResult) -> Vec<ElementId> {
    if !result.targets().is_empty() {
        return result.targets().to_vec();
    }
    spec.layout()
        .iter()
        .filter(|e| e.kind == ElementKind::Image)
        .map(|e| e.id.clone())
        .collect()
}

/// Palette role with the best contrast against the element's backdrop, if better than the current one
fn best_text_role(spec: &PosterSpec, element: &Element) -> Option<ColorRole> {
    let style = spec.style()?;
    let current = element.text_style?.color;
    let backdrop = backdrop_color(spec, element);
    let ratio = |role: ColorRole| style.palette.get(role).contrast_ratio(backdrop);

    let best = ColorRole::ALL
        .into_iter()
        .max_by(|a, b| ratio(*a).total_cmp(&ratio(*b)))?;

    (best != current && ratio(best) > ratio(current)).then_some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::brand::BrandGroundingAgent;
    use crate::domain::Severity;

    fn keywords() -> Vec<String> {
        vec!["Italian".into(), "Restaurant".into()]
    }

    fn planned_spec() -> PosterSpec {
        let planner = PlanningAgent::new(Canvas::default(), 36);
        let mut spec = PosterSpec::new(keywords(), BrandInput::default());
        spec.set_layout(planner.plan(&keywords(), &BrandInput::default()).unwrap())
            .unwrap();
        spec.commit_style(BrandGroundingAgent::new().default_style(&keywords()))
            .unwrap();
        spec
    }

    #[test]
    fn test_plan_rejects_empty_keywords() {
        let planner = PlanningAgent::new(Canvas::default(), 36);
        assert!(matches!(
            planner.plan(&[], &BrandInput::default()),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_plan_layout() {
        let canvas = Canvas::default();
        let planner = PlanningAgent::new(canvas, 36);
        let elements = planner.plan(&keywords(), &BrandInput::default()).unwrap();

        let ids: Vec<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["background-1", "headline-1", "body-1", "cta-1"]);
        assert_eq!(elements[0].bbox, canvas.bounds());

        let safe = canvas.safe_area(36);
        let text: Vec<&Element> = elements.iter().filter(|e| e.is_text()).collect();
        for (i, a) in text.iter().enumerate() {
            assert!(safe.contains(&a.bbox), "{} leaves the safe area", a.id);
            for b in &text[i + 1..] {
                assert!(!a.bbox.intersects(&b.bbox), "{} overlaps {}", a.id, b.id);
            }
        }
    }

    #[test]
    fn test_plan_with_logo() {
        let planner = PlanningAgent::new(Canvas::default(), 36);
        let brand = BrandInput {
            logo: Some("logo.png".into()),
            marketing: vec![],
        };
        let elements = planner.plan(&keywords(), &brand).unwrap();
        let logo = elements.iter().find(|e| e.id == "logo-1").unwrap();
        let headline = elements.iter().find(|e| e.id == "headline-1").unwrap();

        assert_eq!(logo.kind, ElementKind::Logo);
        assert!(!logo.bbox.intersects(&headline.bbox));
    }

    #[test]
    fn test_margin_failure_revises_only_target() {
        let spec = planned_spec();
        let planner = PlanningAgent::new(Canvas::default(), 36);
        let failure = ValidationResult::fail(
            CheckKind::MarginTextPresence,
            Severity::Hard,
            1,
            "headline-1 crosses the margin",
            vec!["headline-1".into()],
        );
        let soft = ValidationResult::fail(CheckKind::FontConsistency, Severity::Soft, 1, "3 families", vec![]);

        let plan = planner.revise(&spec, &[&failure, &soft]);
        assert_eq!(plan.element_ids(), vec!["headline-1".to_string()]);

        let revision = plan.get("headline-1").unwrap();
        assert!(revision.refine_geometry);
        assert!(!revision.regenerate_content);
        assert_eq!(revision.guidance, "headline-1 crosses the margin");
    }

    #[test]
    fn test_untargeted_failure_implicates_images() {
        let spec = planned_spec();
        let planner = PlanningAgent::new(Canvas::default(), 36);
        let failure = ValidationResult::fail(CheckKind::AestheticQuality, Severity::Hard, 1, "score 0.41", vec![]);

        let plan = planner.revise(&spec, &[&failure]);
        assert_eq!(plan.element_ids(), vec!["background-1".to_string()]);
        assert!(plan.get("background-1").unwrap().regenerate_content);
    }

    #[test]
    fn test_guidance_is_truncated() {
        let spec = planned_spec();
        let planner = PlanningAgent::new(Canvas::default(), 36);
        let failure = ValidationResult::fail(
            CheckKind::TextCorrectness,
            Severity::Hard,
            1,
            "x".repeat(1000),
            vec!["body-1".into()],
        );

        let plan = planner.revise(&spec, &[&failure]);
        assert_eq!(plan.get("body-1").unwrap().guidance.len(), MAX_GUIDANCE_CHARS);
    }
}
