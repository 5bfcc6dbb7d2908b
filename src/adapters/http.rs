//! HTTP model gateway backend.
//!
//! Each capability is a `POST <base_url>/<capability>` endpoint. Requests with
//! only structured input are sent as JSON; requests carrying image or file bytes
//! are sent as multipart with a `request` JSON part plus one part per file.
//! Generated images come back as a URL and are downloaded.
//!
//! Auth: optional Bearer token

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Capability, GeneratedImage, GeneratedText, ModelService, RefinedGeometry, ServiceRequest,
    ServiceResponse,
};
use crate::domain::{BoundingBox, ImageArtifact, Layer, LayerBody, Rgb, StyleGuide};
use crate::error::ServiceError;

/// Client for an HTTP model gateway
pub struct HttpModelService {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ImageReply {
    image_url: String,
    #[serde(default)]
    media_type: Option<String>,
    width: u32,
    height: u32,
    #[serde(default)]
    dominant_color: Option<Rgb>,
    #[serde(default)]
    contains_text: bool,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct TextReply {
    content: String,
    #[serde(default)]
    font_family: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct LayoutReply {
    bbox: BoundingBox,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    score: f64,
}

fn default_confidence() -> f32 {
    1.0
}

impl HttpModelService {
    /// Create a new client
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("HTTP backend needs a non-empty base URL");
        }

        // Per-call timeouts are enforced by the invoker
        let client = reqwest::Client::builder()
            .user_agent(concat!("posterloom/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    fn endpoint(&self, capability: Capability) -> String {
        format!("{}/{}", self.base_url, capability.as_str())
    }

    fn post(&self, capability: Capability) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.endpoint(capability));
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    async fn post_json<B, R>(&self, capability: Capability, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(%capability, "POST json");
        let response = self
            .post(capability)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(capability, e))?;
        decode(capability, response).await
    }

    async fn post_form<R>(&self, capability: Capability, form: Form) -> Result<R, ServiceError>
    where
        R: DeserializeOwned,
    {
        debug!(%capability, "POST multipart");
        let response = self
            .post(capability)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(capability, e))?;
        decode(capability, response).await
    }

    /// Fetch an image the gateway produced
    async fn download(&self, capability: Capability, reply: ImageReply) -> Result<GeneratedImage, ServiceError> {
        let response = self
            .client
            .get(&reply.image_url)
            .send()
            .await
            .map_err(|e| transport_error(capability, e))?;
        let response = check_status(capability, response).await?;

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let media_type = reply
            .media_type
            .or(header_type)
            .unwrap_or_else(|| "image/png".to_string());

        let data = response
            .bytes()
            .await
            .map_err(|e| transport_error(capability, e))?
            .to_vec();

        Ok(GeneratedImage {
            artifact: ImageArtifact::new(media_type, reply.width, reply.height, data),
            dominant_color: reply.dominant_color,
            contains_text: reply.contains_text,
            confidence: reply.confidence,
        })
    }

    async fn poster(&self, form: Form) -> Result<ServiceResponse, ServiceError> {
        let reply: ImageReply = self.post_form(Capability::ImageEdit, form).await?;
        let image = self.download(Capability::ImageEdit, reply).await?;
        Ok(ServiceResponse::Poster(image.artifact))
    }
}

#[async_trait]
impl ModelService for HttpModelService {
    fn name(&self) -> &str {
        "http"
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    async fn call(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        let capability = request.capability();

        match request {
            ServiceRequest::Image(req) => {
                let reply: ImageReply = self.post_json(capability, req).await?;
                Ok(ServiceResponse::Image(self.download(capability, reply).await?))
            }
            ServiceRequest::Text(req) => {
                let reply: TextReply = self.post_json(capability, req).await?;
                Ok(ServiceResponse::Text(GeneratedText {
                    content: reply.content,
                    font_family: reply.font_family,
                    confidence: reply.confidence,
                }))
            }
            ServiceRequest::Layout(req) => {
                let reply: LayoutReply = self.post_json(capability, req).await?;
                Ok(ServiceResponse::Layout(RefinedGeometry {
                    bbox: reply.bbox,
                    confidence: reply.confidence,
                }))
            }
            ServiceRequest::Compose(req) => {
                let form = layer_form(capability, req, &req.layers)?;
                self.poster(form).await
            }
            ServiceRequest::Edit(req) => {
                let form = layer_form(capability, req, &req.layers)?
                    .part("base", artifact_part(capability, "base", &req.base)?);
                self.poster(form).await
            }
            ServiceRequest::Score(req) => {
                let form = json_form(capability, req)?
                    .part("image", artifact_part(capability, "poster", &req.image)?);
                let reply: ScoreReply = self.post_form(capability, form).await?;
                Ok(ServiceResponse::Score(reply.score.clamp(0.0, 1.0)))
            }
            ServiceRequest::Brand(req) => {
                let mut form = json_form(capability, req)?;
                for (index, path) in req.logo.iter().chain(req.marketing.iter()).enumerate() {
                    let name = if index == 0 && req.logo.is_some() {
                        "logo".to_string()
                    } else {
                        format!("marketing-{}", index)
                    };
                    form = form.part(name, file_part(capability, path).await?);
                }
                let style: StyleGuide = self.post_form(capability, form).await?;
                Ok(ServiceResponse::Brand(style))
            }
        }
    }
}

/// Map a transport failure; connection problems and timeouts are worth retrying
fn transport_error(capability: Capability, error: reqwest::Error) -> ServiceError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        ServiceError::transient(capability, error.to_string())
    } else {
        ServiceError::permanent(capability, error.to_string())
    }
}

/// 408, 429 and 5xx are transient; any other non-success status is a rejection
fn classify_status(capability: Capability, status: StatusCode, body: &str) -> ServiceError {
    let message = format!("HTTP {}: {}", status, body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ServiceError::transient(capability, message)
    } else {
        ServiceError::permanent(capability, message)
    }
}

async fn check_status(capability: Capability, response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(capability, status, &body))
}

async fn decode<R: DeserializeOwned>(capability: Capability, response: reqwest::Response) -> Result<R, ServiceError> {
    let response = check_status(capability, response).await?;
    response
        .json()
        .await
        .map_err(|e| ServiceError::permanent(capability, format!("Failed to parse response: {}", e)))
}

fn json_form<B: Serialize + ?Sized>(capability: Capability, body: &B) -> Result<Form, ServiceError> {
    let json = serde_json::to_string(body)
        .map_err(|e| ServiceError::permanent(capability, format!("Failed to serialize request: {}", e)))?;
    let part = Part::text(json)
        .mime_str("application/json")
        .map_err(|e| ServiceError::permanent(capability, e.to_string()))?;
    Ok(Form::new().part("request", part))
}

fn artifact_part(capability: Capability, stem: &str, artifact: &ImageArtifact) -> Result<Part, ServiceError> {
    Part::bytes(artifact.data.clone())
        .file_name(format!("{}.{}", stem, artifact.extension()))
        .mime_str(&artifact.media_type)
        .map_err(|e| ServiceError::permanent(capability, e.to_string()))
}

/// Request JSON plus one part per image layer, named after its element
fn layer_form<B: Serialize>(capability: Capability, body: &B, layers: &[Layer]) -> Result<Form, ServiceError> {
    let mut form = json_form(capability, body)?;
    for layer in layers {
        if let LayerBody::Image { artifact } = &layer.body {
            form = form.part(
                layer.element_id.clone(),
                artifact_part(capability, &layer.element_id, artifact)?,
            );
        }
    }
    Ok(form)
}

async fn file_part(capability: Capability, path: &Path) -> Result<Part, ServiceError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ServiceError::permanent(capability, format!("Failed to read {}: {}", path.display(), e))
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(bytes).file_name(file_name))
}
