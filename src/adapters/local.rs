//! Deterministic in-process backend.
//!
//! Serves every capability without a network: images and posters are rendered as
//! SVG, copy is assembled from the keywords, and geometry refinement clamps boxes
//! into the safe area. Used for offline runs and as the default backend.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{
    BrandRequest, Capability, ComposeRequest, GeneratedImage, GeneratedText, ImageRequest,
    LayoutRequest, ModelService, RefinedGeometry, ScoreRequest, ServiceRequest, ServiceResponse,
    TextRequest,
};
use crate::agents::brand::style_from_seed;
use crate::domain::{
    BoundingBox, Canvas, ContentRole, ImageArtifact, Layer, LayerBody, Rgb, TextAlign,
};
use crate::error::ServiceError;

const SVG: &str = "image/svg+xml";

/// Offline studio backend
#[derive(Debug, Clone, Default)]
pub struct LocalStudio;

impl LocalStudio {
    pub fn new() -> Self {
        Self
    }

    fn render_image(&self, request: &ImageRequest) -> GeneratedImage {
        let palette = &request.palette;
        let dominant = palette.primary.mix(Rgb::BLACK, 0.55);
        let glow = palette.secondary.mix(Rgb::BLACK, 0.35);

        let svg = format!(
            concat!(
                "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\">",
                "<defs><linearGradient id=\"bg-{id}\" x1=\"0\" y1=\"0\" x2=\"0\" y2=\"1\">",
                "<stop offset=\"0\" stop-color=\"{a}\"/><stop offset=\"1\" stop-color=\"{b}\"/>",
                "</linearGradient></defs>",
                "<rect width=\"{w}\" height=\"{h}\" fill=\"url(#bg-{id})\"/>",
                "<!-- {prompt} -->",
                "</svg>"
            ),
            w = request.width,
            h = request.height,
            id = xml_escape(&request.element_id),
            a = dominant,
            b = glow,
            prompt = xml_escape(&request.prompt).replace("--", "- -"),
        );

        GeneratedImage {
            artifact: ImageArtifact::new(SVG, request.width, request.height, svg.into_bytes()),
            dominant_color: Some(dominant.mix(glow, 0.5)),
            contains_text: false,
            confidence: 0.8,
        }
    }

    fn write_copy(&self, request: &TextRequest) -> GeneratedText {
        let keywords: Vec<String> = request.keywords.iter().map(|k| title_case(k)).collect();
        let first = keywords.first().cloned().unwrap_or_default();
        let variant = seed_byte(&[
            request.element_id.as_str(),
            request.guidance.as_deref().unwrap_or(""),
        ]) as usize;

        let copy = match request.role {
            ContentRole::Headline => keywords.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
            ContentRole::Body => {
                let openers = ["Discover", "Experience", "Taste", "Enjoy"];
                let rest: Vec<String> = request
                    .keywords
                    .iter()
                    .skip(1)
                    .map(|k| k.to_lowercase())
                    .collect();
                format!(
                    "{} {} {}",
                    openers[variant % openers.len()],
                    first.to_lowercase(),
                    rest.join(" ")
                )
            }
            ContentRole::CallToAction => {
                let actions = ["Visit Today", "Book Now", "Join Us", "Learn More"];
                actions[variant % actions.len()].to_string()
            }
            ContentRole::Background | ContentRole::Logo => first,
        };

        let content = match request.word_limit {
            Some(limit) => copy
                .split_whitespace()
                .take(limit)
                .collect::<Vec<_>>()
                .join(" "),
            None => copy.trim().to_string(),
        };

        GeneratedText {
            content,
            font_family: Some(request.font_family.clone()),
            confidence: 0.9,
        }
    }

    fn refine_layout(&self, request: &LayoutRequest) -> RefinedGeometry {
        let safe = request.canvas.safe_area(request.margin_px);
        let mut bbox = request.element.bbox.clamp_into(&safe);

        // Slide down past any occupied box, then back up if that left the safe area
        for occupied in &request.occupied {
            if bbox.intersects(occupied) {
                bbox.y = occupied.bottom().min(safe.bottom().saturating_sub(bbox.h));
            }
        }
        for occupied in &request.occupied {
            if bbox.intersects(occupied) {
                bbox.y = occupied.y.saturating_sub(bbox.h).max(safe.y);
            }
        }

        RefinedGeometry {
            bbox: bbox.clamp_into(&safe),
            confidence: 0.7,
        }
    }

    fn score(&self, request: &ScoreRequest) -> f64 {
        let byte = seed_byte(&[std::str::from_utf8(&request.image.data).unwrap_or("")]);
        0.62 + (byte as f64 / 255.0) * 0.3
    }

    fn analyze_brand(&self, request: &BrandRequest) -> Result<ServiceResponse, ServiceError> {
        let mut hasher = Sha256::new();
        for path in request.logo.iter().chain(request.marketing.iter()) {
            let bytes = std::fs::read(path).map_err(|e| {
                ServiceError::permanent(
                    Capability::BrandAnalysis,
                    format!("cannot read {}: {}", path.display(), e),
                )
            })?;
            hasher.update(&bytes);
        }
        for keyword in &request.keywords {
            hasher.update(keyword.to_lowercase().as_bytes());
        }
        let seed: [u8; 32] = hasher.finalize().into();
        Ok(ServiceResponse::Brand(style_from_seed(&seed)))
    }
}

#[async_trait]
impl ModelService for LocalStudio {
    fn name(&self) -> &str {
        "local-studio"
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    async fn call(&self, request: &ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        match request {
            ServiceRequest::Image(req) => Ok(ServiceResponse::Image(self.render_image(req))),
            ServiceRequest::Text(req) => Ok(ServiceResponse::Text(self.write_copy(req))),
            ServiceRequest::Layout(req) => Ok(ServiceResponse::Layout(self.refine_layout(req))),
            ServiceRequest::Compose(req) => Ok(ServiceResponse::Poster(render_poster(req))),
            ServiceRequest::Edit(req) => Ok(ServiceResponse::Poster(render_poster(&ComposeRequest {
                canvas: req.canvas,
                background: req.background,
                layers: req.layers.clone(),
            }))),
            ServiceRequest::Score(req) => Ok(ServiceResponse::Score(self.score(req))),
            ServiceRequest::Brand(req) => self.analyze_brand(req),
        }
    }
}

/// Flatten layers into an SVG poster
pub fn render_poster(request: &ComposeRequest) -> ImageArtifact {
    let Canvas { width, height } = request.canvas;
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\
         <rect width=\"{width}\" height=\"{height}\" fill=\"{}\"/>",
        request.background
    );

    let mut layers: Vec<&Layer> = request.layers.iter().collect();
    layers.sort_by_key(|l| l.z);

    for layer in layers {
        svg.push_str(&render_layer(layer));
    }
    svg.push_str("</svg>");

    ImageArtifact::new(SVG, width, height, svg.into_bytes())
}

fn render_layer(layer: &Layer) -> String {
    let BoundingBox { x, y, w, h } = layer.bbox;
    match &layer.body {
        LayerBody::Image { artifact } if artifact.media_type == SVG => {
            let inner = String::from_utf8_lossy(&artifact.data);
            format!(
                "<g id=\"{}\" transform=\"translate({x},{y})\"><svg width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {} {}\" preserveAspectRatio=\"xMidYMid slice\">{}</svg></g>",
                xml_escape(&layer.element_id),
                artifact.width,
                artifact.height,
                strip_root(&inner),
            )
        }
        LayerBody::Image { artifact } => format!(
            "<rect id=\"{}\" x=\"{x}\" y=\"{y}\" width=\"{w}\" height=\"{h}\" fill=\"#cccccc\"><title>{} ({})</title></rect>",
            xml_escape(&layer.element_id),
            xml_escape(&layer.element_id),
            xml_escape(&artifact.media_type),
        ),
        LayerBody::Text {
            content,
            font_family,
            color,
            size_px,
            weight,
            align,
        } => {
            let (anchor, tx) = match align {
                TextAlign::Left => ("start", x),
                TextAlign::Center => ("middle", x + w / 2),
                TextAlign::Right => ("end", x + w),
            };
            let baseline = y + h / 2 + size_px / 3;
            format!(
                "<text id=\"{}\" x=\"{tx}\" y=\"{baseline}\" font-family=\"{}\" font-size=\"{size_px}\" font-weight=\"{weight}\" fill=\"{color}\" text-anchor=\"{anchor}\">{}</text>",
                xml_escape(&layer.element_id),
                xml_escape(font_family),
                xml_escape(content),
            )
        }
    }
}

/// Body of an SVG document without its root element
fn strip_root(svg: &str) -> &str {
    let start = svg.find('>').map(|i| i + 1).unwrap_or(0);
    let end = svg.rfind("</svg>").unwrap_or(svg.len());
    if start <= end {
        &svg[start..end]
    } else {
        ""
    }
}

pub(crate) fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn title_case(word: &str) -> String {
    let mut chars = word.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn seed_byte(parts: &[&str]) -> u8 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hasher.finalize()[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ElementKind, Palette};

    fn palette() -> Palette {
        Palette {
            primary: Rgb::new(200, 40, 40),
            secondary: Rgb::new(40, 160, 80),
            neutral: Rgb::new(30, 30, 30),
            background: Rgb::new(245, 240, 230),
        }
    }

    #[tokio::test]
    async fn test_copy_respects_word_limit() {
        let studio = LocalStudio::new();
        let request = ServiceRequest::Text(TextRequest {
            element_id: "body-1".into(),
            role: ContentRole::Body,
            keywords: vec!["Italian".into(), "Restaurant".into()],
            brief: String::new(),
            word_limit: Some(3),
            font_family: "Inter".into(),
            color: Rgb::BLACK,
            quality_diversity: 0.5,
            guidance: None,
        });

        match studio.call(&request).await.unwrap() {
            ServiceResponse::Text(text) => {
                assert_eq!(text.content.split_whitespace().count(), 3);
                assert_eq!(text.font_family.as_deref(), Some("Inter"));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_headline_from_keywords() {
        let studio = LocalStudio::new();
        let request = ServiceRequest::Text(TextRequest {
            element_id: "headline-1".into(),
            role: ContentRole::Headline,
            keywords: vec!["italian".into(), "RESTAURANT".into(), "pasta".into()],
            brief: String::new(),
            word_limit: Some(3),
            font_family: "Inter".into(),
            color: Rgb::BLACK,
            quality_diversity: 0.5,
            guidance: None,
        });

        let response = studio.call(&request).await.unwrap();
        assert!(matches!(response, ServiceResponse::Text(ref t) if t.content == "Italian Restaurant"));
    }

    #[tokio::test]
    async fn test_image_is_deterministic_svg() {
        let studio = LocalStudio::new();
        let request = ServiceRequest::Image(ImageRequest {
            element_id: "background-1".into(),
            role: ContentRole::Background,
            prompt: "warm trattoria <interior>".into(),
            negative_prompt: "text".into(),
            width: 720,
            height: 1280,
            palette: palette(),
            quality_diversity: 0.5,
            guidance: None,
        });

        let first = studio.call(&request).await.unwrap();
        let second = studio.call(&request).await.unwrap();
        assert_eq!(first, second);

        match first {
            ServiceResponse::Image(image) => {
                assert_eq!(image.artifact.media_type, SVG);
                assert!(!image.contains_text);
                let svg = String::from_utf8(image.artifact.data).unwrap();
                assert!(svg.contains("&lt;interior&gt;"));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_layout_refinement_stays_in_safe_area() {
        let studio = LocalStudio::new();
        let canvas = Canvas::default();
        let element = crate::domain::Element {
            id: "headline-1".into(),
            kind: ElementKind::Text,
            role: ContentRole::Headline,
            bbox: BoundingBox::new(0, 0, 720, 160),
            z: 3,
            constraints: vec![],
            text_style: None,
            brief: String::new(),
        };
        let occupied = vec![BoundingBox::new(36, 36, 648, 200)];
        let request = ServiceRequest::Layout(LayoutRequest {
            element,
            canvas,
            margin_px: 36,
            occupied: occupied.clone(),
            guidance: None,
        });

        match studio.call(&request).await.unwrap() {
            ServiceResponse::Layout(geometry) => {
                assert!(canvas.safe_area(36).contains(&geometry.bbox));
                assert!(!geometry.bbox.intersects(&occupied[0]));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_render_poster_orders_layers_by_z() {
        let text = |id: &str, z: u32| {
            Layer::new(
                id.into(),
                ElementKind::Text,
                ContentRole::Headline,
                BoundingBox::new(40, 40, 200, 80),
                z,
                LayerBody::Text {
                    content: id.into(),
                    font_family: "Inter".into(),
                    color: Rgb::BLACK,
                    size_px: 40,
                    weight: 400,
                    align: TextAlign::Left,
                },
            )
        };
        let poster = render_poster(&ComposeRequest {
            canvas: Canvas::default(),
            background: Rgb::WHITE,
            layers: vec![text("top", 5), text("bottom", 1)],
        });
        let svg = String::from_utf8(poster.data).unwrap();
        assert!(svg.find("bottom").unwrap() < svg.find("top").unwrap());
        assert_eq!((poster.width, poster.height), (720, 1280));
    }
}
