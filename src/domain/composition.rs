//! Composed candidate posters.
//!
//! A composition keeps one resolved layer per element next to the flattened
//! image, so a later targeted edit can reuse untouched layers verbatim.

use serde::{Deserialize, Serialize};

use super::color::Rgb;
use super::poster::{
    content_digest, BoundingBox, Canvas, ContentRole, ElementId, ElementKind, ImageArtifact,
    TextAlign,
};

/// Resolved content of one layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerBody {
    Image {
        artifact: ImageArtifact,
    },
    Text {
        content: String,
        font_family: String,
        color: Rgb,
        size_px: u32,
        weight: u16,
        align: TextAlign,
    },
}

/// One element placed on the canvas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub element_id: ElementId,
    pub kind: ElementKind,
    pub role: ContentRole,
    pub bbox: BoundingBox,
    pub z: u32,
    pub body: LayerBody,
    digest: String,
}

impl Layer {
    pub fn new(
        element_id: ElementId,
        kind: ElementKind,
        role: ContentRole,
        bbox: BoundingBox,
        z: u32,
        body: LayerBody,
    ) -> Self {
        let fingerprint = match &body {
            LayerBody::Image { artifact } => format!("image|{}", artifact.digest()),
            LayerBody::Text {
                content,
                font_family,
                color,
                size_px,
                weight,
                align,
            } => format!("text|{content}|{font_family}|{color}|{size_px}|{weight}|{align:?}"),
        };
        let digest = content_digest(format!("{fingerprint}|{bbox:?}|{z}").as_bytes());
        Self {
            element_id,
            kind,
            role,
            bbox,
            z,
            body,
            digest,
        }
    }

    /// Digest over content, style and placement
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// A candidate poster
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub canvas: Canvas,
    /// Layers back to front
    pub layers: Vec<Layer>,
    pub image: ImageArtifact,
    /// Elements whose layers were carried over unchanged from the previous candidate
    pub reused: Vec<ElementId>,
    pub iteration: u32,
}

impl Composition {
    pub fn layer(&self, element_id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.element_id == element_id)
    }

    /// Element-to-placement mapping, persisted as `manifest.json`
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.layers
            .iter()
            .map(|layer| ManifestEntry {
                element_id: layer.element_id.clone(),
                kind: layer.kind,
                x: layer.bbox.x,
                y: layer.bbox.y,
                w: layer.bbox.w,
                h: layer.bbox.h,
                z: layer.z,
                digest: layer.digest().to_string(),
                reused: self.reused.contains(&layer.element_id),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub element_id: ElementId,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub z: u32,
    pub digest: String,
    pub reused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_layer(content: &str, color: Rgb) -> Layer {
        Layer::new(
            "headline-1".into(),
            ElementKind::Text,
            ContentRole::Headline,
            BoundingBox::new(40, 80, 640, 160),
            3,
            LayerBody::Text {
                content: content.into(),
                font_family: "Playfair Display".into(),
                color,
                size_px: 72,
                weight: 700,
                align: TextAlign::Center,
            },
        )
    }

    #[test]
    fn test_layer_digest_tracks_content_and_style() {
        let a = text_layer("Buon Appetito", Rgb::WHITE);
        let b = text_layer("Buon Appetito", Rgb::WHITE);
        let c = text_layer("Buon Appetito", Rgb::BLACK);
        let d = text_layer("Mangia Bene", Rgb::WHITE);

        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_ne!(a.digest(), d.digest());
    }

    #[test]
    fn test_manifest_marks_reused_layers() {
        let composition = Composition {
            canvas: Canvas::default(),
            layers: vec![text_layer("Hi", Rgb::WHITE)],
            image: ImageArtifact::new("image/svg+xml", 720, 1280, b"<svg/>".to_vec()),
            reused: vec!["headline-1".into()],
            iteration: 2,
        };

        let manifest = composition.manifest();
        assert_eq!(manifest.len(), 1);
        assert!(manifest[0].reused);
        assert_eq!(manifest[0].z, 3);

        let json = serde_json::to_value(&manifest[0]).unwrap();
        assert_eq!(json["elementId"], "headline-1");
        assert_eq!(json["type"], "text");
    }
}
