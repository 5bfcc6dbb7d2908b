//! Asset generation agents.
//!
//! Each agent turns one element plus the committed style into a service request
//! and the response into a value; none of them touches `PosterSpec`. A
//! `GenerationJob` bundles everything one element needs so it can run on its own
//! task during the fan-out.

use std::path::{Path, PathBuf};

use crate::adapters::{
    Capability, ImageRequest, LayoutRequest, ServiceRequest, ServiceResponse, TextRequest,
};
use crate::core::retry::{CallFailure, Invoker};
use crate::domain::{
    Asset, AssetBody, AssetMetadata, BoundingBox, Canvas, Constraint, Element, ElementId,
    ElementKind, ImageArtifact, StyleGuide, TypeRole,
};
use crate::error::ServiceError;

/// Always steer image models away from rendering text
pub const IMAGE_NEGATIVE_PROMPT: &str = "text, letters, watermark";

/// Renders image elements through `image-gen`
#[derive(Debug, Clone, Default)]
pub struct ImageAgent;

impl ImageAgent {
    pub async fn generate(
        &self,
        invoker: &Invoker,
        element: &Element,
        style: &StyleGuide,
        keywords: &[String],
        params: &GenerationParams,
    ) -> Result<(Asset, u32), CallFailure> {
        let request = ServiceRequest::Image(ImageRequest {
            element_id: element.id.clone(),
            role: element.role,
            prompt: format!("{}. Keywords: {}", element.brief, keywords.join(", ")),
            negative_prompt: IMAGE_NEGATIVE_PROMPT.to_string(),
            width: element.bbox.w,
            height: element.bbox.h,
            palette: style.palette,
            quality_diversity: params.quality_diversity,
            guidance: params.guidance.clone(),
        });

        let outcome = invoker.call(&request).await?;
        match outcome.response {
            ServiceResponse::Image(image) => {
                let asset = Asset::new(
                    element.id.clone(),
                    AssetBody::Image(image.artifact),
                    Capability::ImageGen.as_str(),
                    params.iteration,
                )
                .with_confidence(image.confidence)
                .with_metadata(AssetMetadata {
                    dominant_color: image.dominant_color,
                    contains_text: image.contains_text,
                    font_family: None,
                });
                Ok((asset, outcome.attempts))
            }
            other => Err(CallFailure {
                error: other.unexpected(Capability::ImageGen),
                attempts: outcome.attempts,
            }),
        }
    }

    /// Brand logos are passed through from the supplied file
    pub async fn load_logo(&self, element: &Element, path: &Path, iteration: u32) -> Result<Asset, CallFailure> {
        let data = tokio::fs::read(path).await.map_err(|e| CallFailure {
            error: ServiceError::permanent(
                Capability::ImageGen,
                format!("cannot read logo {}: {}", path.display(), e),
            ),
            attempts: 0,
        })?;

        let media_type = match path.extension().and_then(|e| e.to_str()) {
            Some("svg") => "image/svg+xml",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            _ => "image/png",
        };

        Ok(Asset::new(
            element.id.clone(),
            AssetBody::Image(ImageArtifact::new(media_type, element.bbox.w, element.bbox.h, data)),
            "brand-input",
            iteration,
        ))
    }
}

/// Writes copy for text elements through `text-gen`
#[derive(Debug, Clone, Default)]
pub struct TextAgent;

impl TextAgent {
    pub async fn generate(
        &self,
        invoker: &Invoker,
        element: &Element,
        style: &StyleGuide,
        keywords: &[String],
        params: &GenerationParams,
    ) -> Result<(Asset, u32), CallFailure> {
        let text_style = element.text_style;
        let type_role = text_style.map_or(TypeRole::Body, |s| s.role);
        let color = text_style.map_or(style.palette.neutral, |s| style.palette.get(s.color));

        let request = ServiceRequest::Text(TextRequest {
            element_id: element.id.clone(),
            role: element.role,
            keywords: keywords.to_vec(),
            brief: element.brief.clone(),
            word_limit: element.role.word_limit(),
            font_family: style.type_roles.family(type_role).to_string(),
            color,
            quality_diversity: params.quality_diversity,
            guidance: params.guidance.clone(),
        });

        let outcome = invoker.call(&request).await?;
        match outcome.response {
            ServiceResponse::Text(text) => {
                let asset = Asset::new(
                    element.id.clone(),
                    AssetBody::Text {
                        content: text.content.trim().to_string(),
                    },
                    Capability::TextGen.as_str(),
                    params.iteration,
                )
                .with_confidence(text.confidence)
                .with_metadata(AssetMetadata {
                    dominant_color: None,
                    contains_text: true,
                    font_family: text.font_family,
                });
                Ok((asset, outcome.attempts))
            }
            other => Err(CallFailure {
                error: other.unexpected(Capability::TextGen),
                attempts: outcome.attempts,
            }),
        }
    }
}

/// Refines element geometry through `layout-gen`
#[derive(Debug, Clone, Default)]
pub struct LayoutAgent;

impl LayoutAgent {
    pub async fn refine(
        &self,
        invoker: &Invoker,
        element: &Element,
        canvas: Canvas,
        margin_px: u32,
        occupied: &[BoundingBox],
        guidance: Option<String>,
    ) -> Result<(BoundingBox, u32), CallFailure> {
        let request = ServiceRequest::Layout(LayoutRequest {
            element: element.clone(),
            canvas,
            margin_px,
            occupied: occupied.to_vec(),
            guidance,
        });

        let outcome = invoker.call(&request).await?;
        match outcome.response {
            ServiceResponse::Layout(geometry) => {
                let bbox = geometry.bbox;
                if bbox.is_empty() || !canvas.bounds().contains(&bbox) {
                    return Err(CallFailure {
                        error: ServiceError::permanent(
                            Capability::LayoutGen,
                            format!(
                                "box {}x{} at ({}, {}) for {} is outside the {}x{} canvas",
                                bbox.w, bbox.h, bbox.x, bbox.y, element.id, canvas.width, canvas.height
                            ),
                        ),
                        attempts: outcome.attempts,
                    });
                }
                Ok((bbox, outcome.attempts))
            }
            other => Err(CallFailure {
                error: other.unexpected(Capability::LayoutGen),
                attempts: outcome.attempts,
            }),
        }
    }
}

/// Knobs shared by every generation call of a stage
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub quality_diversity: f32,
    pub guidance: Option<String>,
    pub iteration: u32,
}

/// Everything needed to (re)generate one element off the orchestrator's task
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub element: Element,
    pub keywords: Vec<String>,
    pub style: StyleGuide,
    pub canvas: Canvas,
    pub margin_px: u32,
    /// Boxes of the other text elements
    pub occupied: Vec<BoundingBox>,
    pub logo: Option<PathBuf>,
    pub regenerate_content: bool,
    pub refine_geometry: bool,
    pub params: GenerationParams,
}

/// Result of one job, tagged with the iteration it was produced for
#[derive(Debug)]
pub struct GenerationOutput {
    pub element_id: ElementId,
    pub iteration: u32,
    /// New geometry, when refinement was requested and succeeded
    pub geometry: Option<BoundingBox>,
    pub asset: Option<Asset>,
    /// Attempts spent across the job's calls
    pub attempts: u32,
    /// Attempts beyond the first, summed over calls
    pub retries: u32,
    pub failure: Option<CallFailure>,
}

impl GenerationOutput {
    fn record_attempts(&mut self, attempts: u32) {
        self.attempts += attempts;
        self.retries += attempts.saturating_sub(1);
    }
}

impl GenerationJob {
    /// Refine geometry first, then produce content for the refined element
    pub async fn run(mut self, invoker: Invoker) -> GenerationOutput {
        let mut output = GenerationOutput {
            element_id: self.element.id.clone(),
            iteration: self.params.iteration,
            geometry: None,
            asset: None,
            attempts: 0,
            retries: 0,
            failure: None,
        };

        if self.refine_geometry {
            match LayoutAgent
                .refine(
                    &invoker,
                    &self.element,
                    self.canvas,
                    self.margin_px,
                    &self.occupied,
                    self.params.guidance.clone(),
                )
                .await
            {
                Ok((bbox, attempts)) => {
                    output.record_attempts(attempts);
                    self.element.bbox = bbox;
                    output.geometry = Some(bbox);
                }
                Err(failure) => {
                    output.record_attempts(failure.attempts);
                    output.failure = Some(failure);
                    return output;
                }
            }
        }

        if !self.regenerate_content {
            return output;
        }

        let result = match (self.element.kind, &self.logo) {
            (ElementKind::Logo, Some(path)) => ImageAgent
                .load_logo(&self.element, path, self.params.iteration)
                .await
                .map(|asset| (asset, 0)),
            (ElementKind::Text, _) => {
                TextAgent
                    .generate(&invoker, &self.element, &self.style, &self.keywords, &self.params)
                    .await
            }
            _ => {
                ImageAgent
                    .generate(&invoker, &self.element, &self.style, &self.keywords, &self.params)
                    .await
            }
        };

        match result {
            Ok((asset, attempts)) => {
                output.record_attempts(attempts);
                output.asset = Some(asset);
            }
            Err(failure) => {
                output.record_attempts(failure.attempts);
                output.failure = Some(failure);
            }
        }
        output
    }
}

/// Whether the initial pass should ask the layout service about this element
pub fn needs_initial_refinement(element: &Element) -> bool {
    !element.has_constraint(Constraint::FullBleed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LocalStudio, ServiceRegistry};
    use crate::agents::brand::BrandGroundingAgent;
    use crate::core::retry::RetryPolicy;
    use crate::domain::{ColorRole, ContentRole, TextAlign, TextStyle};
    use std::sync::Arc;
    use std::time::Duration;

    fn invoker() -> Invoker {
        let registry = ServiceRegistry::new().bind_all(Arc::new(LocalStudio::new()));
        Invoker::new(registry, 2, RetryPolicy::default(), Duration::from_secs(5))
    }

    fn headline() -> Element {
        Element {
            id: "headline-1".into(),
            kind: ElementKind::Text,
            role: ContentRole::Headline,
            bbox: BoundingBox::new(0, 204, 720, 179),
            z: 1,
            constraints: vec![Constraint::WithinMargin],
            text_style: Some(TextStyle {
                role: TypeRole::Display,
                color: ColorRole::Background,
                size_px: 72,
                weight: 700,
                align: TextAlign::Center,
            }),
            brief: "Headline".into(),
        }
    }

    fn job(element: Element, refine_geometry: bool) -> GenerationJob {
        let keywords = vec!["Italian".to_string(), "Restaurant".to_string()];
        GenerationJob {
            element,
            style: BrandGroundingAgent::new().default_style(&keywords),
            keywords,
            canvas: Canvas::default(),
            margin_px: 36,
            occupied: vec![],
            logo: None,
            regenerate_content: true,
            refine_geometry,
            params: GenerationParams {
                quality_diversity: 0.5,
                guidance: None,
                iteration: 2,
            },
        }
    }

    #[tokio::test]
    async fn test_text_job_refines_then_writes() {
        let output = job(headline(), true).run(invoker()).await;

        assert!(output.failure.is_none());
        assert_eq!(output.iteration, 2);
        let bbox = output.geometry.unwrap();
        assert!(Canvas::default().safe_area(36).contains(&bbox));

        let asset = output.asset.unwrap();
        assert_eq!(asset.text(), Some("Italian Restaurant"));
        assert_eq!(asset.produced_by, "text-gen");
        assert_eq!(asset.iteration, 2);
    }

    #[tokio::test]
    async fn test_geometry_only_job_produces_no_asset() {
        let mut geometry_only = job(headline(), true);
        geometry_only.regenerate_content = false;

        let output = geometry_only.run(invoker()).await;
        assert!(output.geometry.is_some());
        assert!(output.asset.is_none());
        assert_eq!(output.attempts, 1);
    }

    #[tokio::test]
    async fn test_logo_is_passed_through() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("logo.svg");
        std::fs::write(&path, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();

        let element = Element {
            id: "logo-1".into(),
            kind: ElementKind::Logo,
            role: ContentRole::Logo,
            bbox: BoundingBox::new(300, 36, 120, 120),
            z: 1,
            constraints: vec![Constraint::WithinMargin],
            text_style: None,
            brief: String::new(),
        };
        let mut logo_job = job(element, false);
        logo_job.logo = Some(path);

        let output = logo_job.run(invoker()).await;
        let asset = output.asset.unwrap();
        assert_eq!(asset.produced_by, "brand-input");
        assert_eq!(asset.image().unwrap().media_type, "image/svg+xml");
        assert_eq!(output.attempts, 0);
    }

    /// Layout backend that places everything at a fixed box
    struct FixedLayout(BoundingBox);

    #[async_trait::async_trait]
    impl crate::adapters::ModelService for FixedLayout {
        fn name(&self) -> &str {
            "fixed-layout"
        }

        fn supports(&self, capability: Capability) -> bool {
            capability == Capability::LayoutGen
        }

        async fn call(&self, _request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
            Ok(ServiceResponse::Layout(crate::adapters::RefinedGeometry {
                bbox: self.0,
                confidence: 1.0,
            }))
        }
    }

    fn fixed_layout_invoker(bbox: BoundingBox) -> Invoker {
        let registry = ServiceRegistry::new()
            .bind_all(Arc::new(LocalStudio::new()))
            .bind(Capability::LayoutGen, Arc::new(FixedLayout(bbox)));
        Invoker::new(registry, 2, RetryPolicy::default(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_off_canvas_geometry_is_rejected() {
        for bbox in [
            BoundingBox::new(u32::MAX - 5, 40, 100, 100),
            BoundingBox::new(700, 40, 100, 100),
            BoundingBox::new(40, 40, 0, 100),
        ] {
            let output = job(headline(), true).run(fixed_layout_invoker(bbox)).await;

            let failure = output.failure.unwrap();
            assert!(!failure.error.is_transient());
            assert!(matches!(
                failure.error,
                ServiceError::Permanent {
                    capability: Capability::LayoutGen,
                    ..
                }
            ));
            assert!(output.geometry.is_none());
            assert!(output.asset.is_none());
        }
    }

    #[tokio::test]
    async fn test_in_canvas_geometry_is_accepted() {
        let bbox = BoundingBox::new(40, 300, 640, 120);
        let output = job(headline(), true).run(fixed_layout_invoker(bbox)).await;
        assert!(output.failure.is_none());
        assert_eq!(output.geometry, Some(bbox));
    }
}
