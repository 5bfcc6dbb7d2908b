//! Capability-typed external model services.
//!
//! Agents declare which capability they need (image generation, text generation,
//! layout refinement, image editing, aesthetic scoring, brand analysis) and the
//! orchestrator resolves it through a `ServiceRegistry` bound at configuration
//! time, so orchestration logic never depends on a specific backend.

pub mod http;
pub mod local;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    BoundingBox, Canvas, ContentRole, Element, ElementId, ImageArtifact, Layer, Palette, Rgb,
    StyleGuide,
};
use crate::error::ServiceError;

pub use http::HttpModelService;
pub use local::LocalStudio;

/// What an agent needs from the outside world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    ImageGen,
    TextGen,
    LayoutGen,
    ImageEdit,
    AestheticScore,
    BrandAnalysis,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ImageGen,
        Capability::TextGen,
        Capability::LayoutGen,
        Capability::ImageEdit,
        Capability::AestheticScore,
        Capability::BrandAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageGen => "image-gen",
            Self::TextGen => "text-gen",
            Self::LayoutGen => "layout-gen",
            Self::ImageEdit => "image-edit",
            Self::AestheticScore => "aesthetic-score",
            Self::BrandAnalysis => "brand-analysis",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render one image element
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub element_id: ElementId,
    pub role: ContentRole,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
    /// 0 favours fidelity, 1 favours diversity
    pub quality_diversity: f32,
    pub guidance: Option<String>,
}

/// Write the copy for one text element
#[derive(Debug, Clone, Serialize)]
pub struct TextRequest {
    pub element_id: ElementId,
    pub role: ContentRole,
    pub keywords: Vec<String>,
    pub brief: String,
    pub word_limit: Option<usize>,
    pub font_family: String,
    pub color: Rgb,
    pub quality_diversity: f32,
    pub guidance: Option<String>,
}

/// Refine the geometry of one element
#[derive(Debug, Clone, Serialize)]
pub struct LayoutRequest {
    pub element: Element,
    pub canvas: Canvas,
    pub margin_px: u32,
    /// Boxes of other text elements to keep clear of
    pub occupied: Vec<BoundingBox>,
    pub guidance: Option<String>,
}

/// Flatten layers into a full poster
#[derive(Debug, Clone, Serialize)]
pub struct ComposeRequest {
    pub canvas: Canvas,
    pub background: Rgb,
    pub layers: Vec<Layer>,
}

/// Replace a subset of layers on an existing poster
#[derive(Debug, Clone, Serialize)]
pub struct EditRequest {
    pub canvas: Canvas,
    pub background: Rgb,
    pub base: ImageArtifact,
    pub layers: Vec<Layer>,
    pub replaced: Vec<ElementId>,
}

/// Score a composed poster
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRequest {
    pub image: ImageArtifact,
    pub keywords: Vec<String>,
}

/// Derive palette and type roles from brand material
#[derive(Debug, Clone, Serialize)]
pub struct BrandRequest {
    pub logo: Option<PathBuf>,
    pub marketing: Vec<PathBuf>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ServiceRequest {
    Image(ImageRequest),
    Text(TextRequest),
    Layout(LayoutRequest),
    Compose(ComposeRequest),
    Edit(EditRequest),
    Score(ScoreRequest),
    Brand(BrandRequest),
}

impl ServiceRequest {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Image(_) => Capability::ImageGen,
            Self::Text(_) => Capability::TextGen,
            Self::Layout(_) => Capability::LayoutGen,
            Self::Compose(_) | Self::Edit(_) => Capability::ImageEdit,
            Self::Score(_) => Capability::AestheticScore,
            Self::Brand(_) => Capability::BrandAnalysis,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub artifact: ImageArtifact,
    pub dominant_color: Option<Rgb>,
    pub contains_text: bool,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedText {
    pub content: String,
    pub font_family: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefinedGeometry {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceResponse {
    Image(GeneratedImage),
    Text(GeneratedText),
    Layout(RefinedGeometry),
    Poster(ImageArtifact),
    Score(f64),
    Brand(StyleGuide),
}

impl ServiceResponse {
    fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Text(_) => "text",
            Self::Layout(_) => "layout",
            Self::Poster(_) => "poster",
            Self::Score(_) => "score",
            Self::Brand(_) => "brand",
        }
    }

    /// Error for a backend that answered with the wrong kind of payload
    pub fn unexpected(&self, capability: Capability) -> ServiceError {
        ServiceError::permanent(
            capability,
            format!("unexpected {} response", self.kind()),
        )
    }
}

/// Trait for external model backends
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Whether this backend can serve a capability
    fn supports(&self, capability: Capability) -> bool;

    /// Perform one call. Implementations must not retry internally.
    async fn call(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError>;
}

/// Which backend family to bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Http,
}

/// `services:` section of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the HTTP model gateway
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the gateway API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Per-capability backend overrides
    #[serde(default)]
    pub overrides: HashMap<Capability, BackendKind>,
}

/// Binding of capabilities to concrete backends
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    bindings: HashMap<Capability, Arc<dyn ModelService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a capability to a backend, replacing any previous binding
    pub fn bind(mut self, capability: Capability, service: Arc<dyn ModelService>) -> Self {
        self.bindings.insert(capability, service);
        self
    }

    /// Bind every capability the backend supports
    pub fn bind_all(mut self, service: Arc<dyn ModelService>) -> Self {
        for capability in Capability::ALL {
            if service.supports(capability) {
                self.bindings.insert(capability, service.clone());
            }
        }
        self
    }

    pub fn resolve(&self, capability: Capability) -> Result<Arc<dyn ModelService>, ServiceError> {
        self.bindings
            .get(&capability)
            .cloned()
            .ok_or(ServiceError::Unbound(capability))
    }

    pub fn is_bound(&self, capability: Capability) -> bool {
        self.bindings.contains_key(&capability)
    }

    /// Build the registry described by the `services:` config section
    pub fn from_config(config: &ServicesConfig) -> Result<Self> {
        let local: Arc<dyn ModelService> = Arc::new(LocalStudio::new());
        let needs_http = config.backend == BackendKind::Http
            || config.overrides.values().any(|b| *b == BackendKind::Http);

        let http: Option<Arc<dyn ModelService>> = if needs_http {
            let base_url = config
                .base_url
                .clone()
                .or_else(|| std::env::var("POSTERLOOM_SERVICE_URL").ok())
                .context("HTTP backend selected but no services.base_url or POSTERLOOM_SERVICE_URL set")?;
            let api_key = config
                .api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok());
            Some(Arc::new(HttpModelService::new(base_url, api_key)?))
        } else {
            None
        };

        let mut registry = Self::new();
        for capability in Capability::ALL {
            let kind = config
                .overrides
                .get(&capability)
                .copied()
                .unwrap_or(config.backend);
            let service = match (kind, &http) {
                (BackendKind::Http, Some(http)) => http.clone(),
                _ => local.clone(),
            };
            registry = registry.bind(capability, service);
        }
        Ok(registry)
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for capability in Capability::ALL {
            if let Some(service) = self.bindings.get(&capability) {
                map.entry(&capability.as_str(), &service.name());
            }
        }
        map.finish()
    }
}
