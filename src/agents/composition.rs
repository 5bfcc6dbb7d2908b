//! Composition: committed assets to a layered candidate poster.
//!
//! `compose` flattens every layer through `image-edit`. `recompose` starts from
//! the previous candidate and only sends the layers whose digest changed, so
//! untouched elements are carried over verbatim.

use tracing::debug;

use crate::adapters::{Capability, ComposeRequest, EditRequest, ServiceRequest, ServiceResponse};
use crate::core::retry::{CallFailure, Invoker};
use crate::domain::{
    AssetBody, Canvas, Composition, ElementId, ImageArtifact, Layer, LayerBody, PosterSpec,
    TextAlign, TypeRole,
};
use crate::error::{CompositionError, ServiceError};

#[derive(Debug, Clone)]
pub struct Compositor {
    canvas: Canvas,
}

impl Compositor {
    pub fn new(canvas: Canvas) -> Self {
        Self { canvas }
    }

    /// Resolve one layer per element, back to front
    pub fn resolve_layers(&self, spec: &PosterSpec) -> Result<Vec<Layer>, CompositionError> {
        let missing = spec.missing_assets();
        if !missing.is_empty() {
            return Err(CompositionError::IncompleteAssets { missing });
        }
        let style = spec.style().ok_or(CompositionError::MissingStyle)?;

        let mut layers = Vec::with_capacity(spec.layout().len());
        for element in spec.layout() {
            let Some(asset) = spec.asset(&element.id) else {
                return Err(CompositionError::IncompleteAssets {
                    missing: vec![element.id.clone()],
                });
            };

            let body = match &asset.body {
                AssetBody::Image(artifact) => LayerBody::Image {
                    artifact: artifact.clone(),
                },
                AssetBody::Text { content } => {
                    let text_style = element.text_style;
                    let type_role = text_style.map_or(TypeRole::Body, |s| s.role);
                    LayerBody::Text {
                        content: content.clone(),
                        font_family: asset
                            .metadata
                            .font_family
                            .clone()
                            .unwrap_or_else(|| style.type_roles.family(type_role).to_string()),
                        color: text_style
                            .map_or(style.palette.neutral, |s| style.palette.get(s.color)),
                        size_px: text_style.map_or(32, |s| s.size_px),
                        weight: text_style.map_or(400, |s| s.weight),
                        align: text_style.map_or(TextAlign::Left, |s| s.align),
                    }
                }
            };

            layers.push(Layer::new(
                element.id.clone(),
                element.kind,
                element.role,
                element.bbox,
                element.z,
                body,
            ));
        }

        Ok(layers)
    }

    /// Full composition of every layer
    pub async fn compose(
        &self,
        invoker: &Invoker,
        spec: &PosterSpec,
        iteration: u32,
    ) -> Result<Composition, CompositionError> {
        let layers = self.resolve_layers(spec)?;
        let background = spec
            .style()
            .map(|s| s.palette.background)
            .ok_or(CompositionError::MissingStyle)?;

        let request = ServiceRequest::Compose(ComposeRequest {
            canvas: self.canvas,
            background,
            layers: layers.clone(),
        });
        let image = self.flatten(invoker, &request).await?;

        Ok(Composition {
            canvas: self.canvas,
            layers,
            image,
            reused: Vec::new(),
            iteration,
        })
    }

    /// Targeted edit of `previous`: layers whose digest is unchanged are reused as-is
    pub async fn recompose(
        &self,
        invoker: &Invoker,
        spec: &PosterSpec,
        previous: &Composition,
        iteration: u32,
    ) -> Result<Composition, CompositionError> {
        let resolved = self.resolve_layers(spec)?;
        let background = spec
            .style()
            .map(|s| s.palette.background)
            .ok_or(CompositionError::MissingStyle)?;

        let mut layers = Vec::with_capacity(resolved.len());
        let mut reused: Vec<ElementId> = Vec::new();
        let mut replaced: Vec<ElementId> = Vec::new();

        for layer in resolved {
            match previous.layer(&layer.element_id) {
                Some(prior) if prior.digest() == layer.digest() => {
                    reused.push(prior.element_id.clone());
                    layers.push(prior.clone());
                }
                _ => {
                    replaced.push(layer.element_id.clone());
                    layers.push(layer);
                }
            }
        }

        let dropped = previous
            .layers
            .iter()
            .any(|prior| !layers.iter().any(|l| l.element_id == prior.element_id));

        let image = if replaced.is_empty() && !dropped {
            previous.image.clone()
        } else {
            debug!(replaced = ?replaced, reused = reused.len(), "Editing previous candidate");
            let request = ServiceRequest::Edit(EditRequest {
                canvas: self.canvas,
                background,
                base: previous.image.clone(),
                layers: layers.clone(),
                replaced,
            });
            self.flatten(invoker, &request).await?
        };

        Ok(Composition {
            canvas: self.canvas,
            layers,
            image,
            reused,
            iteration,
        })
    }

    async fn flatten(
        &self,
        invoker: &Invoker,
        request: &ServiceRequest,
    ) -> Result<ImageArtifact, CallFailure> {
        let outcome = invoker.call(request).await?;
        match outcome.response {
            ServiceResponse::Poster(image)
                if image.width != self.canvas.width || image.height != self.canvas.height =>
            {
                Err(CallFailure {
                    error: ServiceError::permanent(
                        request.capability(),
                        format!(
                            "poster is {}x{}, expected {}x{}",
                            image.width, image.height, self.canvas.width, self.canvas.height
                        ),
                    ),
                    attempts: outcome.attempts,
                })
            }
            ServiceResponse::Poster(image) => Ok(image),
            other => Err(CallFailure {
                error: other.unexpected(Capability::ImageEdit),
                attempts: outcome.attempts,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LocalStudio, ServiceRegistry};
    use crate::agents::brand::BrandGroundingAgent;
    use crate::agents::planning::PlanningAgent;
    use crate::core::retry::RetryPolicy;
    use crate::domain::{Asset, BrandInput, ElementKind};
    use std::sync::Arc;
    use std::time::Duration;

    fn invoker() -> Invoker {
        let registry = ServiceRegistry::new().bind_all(Arc::new(LocalStudio::new()));
        Invoker::new(registry, 2, RetryPolicy::default(), Duration::from_secs(5))
    }

    fn planned_spec() -> PosterSpec {
        let keywords = vec!["Italian".to_string(), "Restaurant".to_string()];
        let mut spec = PosterSpec::new(keywords.clone(), BrandInput::default());
        spec.set_layout(
            PlanningAgent::new(Canvas::default(), 36)
                .plan(&keywords, &BrandInput::default())
                .unwrap(),
        )
        .unwrap();
        spec.commit_style(BrandGroundingAgent::new().default_style(&keywords))
            .unwrap();
        spec
    }

    fn fill(spec: &mut PosterSpec, text: &str) {
        for element in spec.layout().to_vec() {
            let body = match element.kind {
                ElementKind::Text => AssetBody::Text {
                    content: format!("{text} {}", element.role.id_prefix()),
                },
                _ => AssetBody::Image(ImageArtifact::new(
                    "image/svg+xml",
                    720,
                    1280,
                    b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>".to_vec(),
                )),
            };
            spec.commit_asset(Asset::new(element.id.clone(), body, "test", 1))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_missing_assets_are_reported() {
        let mut spec = planned_spec();
        spec.commit_asset(Asset::new(
            "headline-1",
            AssetBody::Text {
                content: "Ciao".into(),
            },
            "test",
            1,
        ))
        .unwrap();

        let err = Compositor::new(Canvas::default())
            .compose(&invoker(), &spec, 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CompositionError::IncompleteAssets {
                missing: vec!["background-1".into(), "body-1".into(), "cta-1".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_compose_full_canvas() {
        let mut spec = planned_spec();
        fill(&mut spec, "Ciao");

        let composition = Compositor::new(Canvas::default())
            .compose(&invoker(), &spec, 1)
            .await
            .unwrap();

        assert_eq!((composition.image.width, composition.image.height), (720, 1280));
        assert_eq!(composition.layers.len(), spec.layout().len());
        assert!(composition.reused.is_empty());
    }

    #[tokio::test]
    async fn test_recompose_reuses_untouched_layers() {
        let mut spec = planned_spec();
        fill(&mut spec, "Ciao");
        let compositor = Compositor::new(Canvas::default());
        let invoker = invoker();
        let first = compositor.compose(&invoker, &spec, 1).await.unwrap();

        spec.commit_asset(Asset::new(
            "headline-1",
            AssetBody::Text {
                content: "Buon Appetito".into(),
            },
            "test",
            2,
        ))
        .unwrap();
        let second = compositor.recompose(&invoker, &spec, &first, 2).await.unwrap();

        assert_eq!(second.reused, vec!["background-1", "body-1", "cta-1"]);
        for layer in &second.layers {
            let prior = first.layer(&layer.element_id).unwrap();
            if layer.element_id == "headline-1" {
                assert_ne!(prior.digest(), layer.digest());
            } else {
                assert_eq!(prior, layer);
            }
        }
        assert_ne!(first.image, second.image);
    }

    #[tokio::test]
    async fn test_recompose_without_changes_keeps_image() {
        let mut spec = planned_spec();
        fill(&mut spec, "Ciao");
        let compositor = Compositor::new(Canvas::default());
        let invoker = invoker();
        let first = compositor.compose(&invoker, &spec, 1).await.unwrap();
        let calls = invoker.calls_made();

        let second = compositor.recompose(&invoker, &spec, &first, 2).await.unwrap();
        assert_eq!(second.image, first.image);
        assert_eq!(second.reused.len(), first.layers.len());
        assert_eq!(invoker.calls_made(), calls);
    }

    /// Image-edit backend that answers with a fixed-size poster
    struct WrongSizeStudio;

    #[async_trait::async_trait]
    impl crate::adapters::ModelService for WrongSizeStudio {
        fn name(&self) -> &str {
            "wrong-size"
        }

        fn supports(&self, capability: Capability) -> bool {
            capability == Capability::ImageEdit
        }

        async fn call(&self, _request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
            Ok(ServiceResponse::Poster(ImageArtifact::new(
                "image/png",
                100,
                100,
                vec![0x89, b'P', b'N', b'G'],
            )))
        }
    }

    #[tokio::test]
    async fn test_poster_must_match_canvas() {
        let mut spec = planned_spec();
        fill(&mut spec, "Ciao");
        let registry = ServiceRegistry::new().bind(Capability::ImageEdit, Arc::new(WrongSizeStudio));
        let invoker = Invoker::new(registry, 1, RetryPolicy::default(), Duration::from_secs(5));

        let err = Compositor::new(Canvas::default())
            .compose(&invoker, &spec, 1)
            .await
            .unwrap_err();
        match err {
            CompositionError::Service { source, attempts } => {
                assert_eq!(attempts, 1);
                assert!(!source.is_transient());
                assert!(source.to_string().contains("100x100"));
            }
            other => panic!("expected a service rejection, got {other:?}"),
        }
    }
}
