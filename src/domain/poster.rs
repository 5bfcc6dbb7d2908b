//! The poster specification shared by every stage of a run.
//!
//! `PosterSpec` is the single-writer state container: agents receive `&PosterSpec`
//! and return values, and only the orchestrator applies mutations through the
//! methods below, each of which re-checks the layout/asset invariants.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::color::Rgb;
use super::validation::ValidationResult;

/// Element identifier, e.g. `headline-1`
pub type ElementId = String;

/// Output canvas in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
        }
    }
}

impl Canvas {
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(0, 0, self.width, self.height)
    }

    /// The area left after insetting every edge by `margin`
    pub fn safe_area(&self, margin: u32) -> BoundingBox {
        let margin = margin.min(self.width / 2).min(self.height / 2);
        BoundingBox::new(
            margin,
            margin,
            self.width - 2 * margin,
            self.height - 2 * margin,
        )
    }
}

/// Axis-aligned box in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.h)
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return 0;
        }
        (right - left) as u64 * (bottom - top) as u64
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.intersection_area(other) > 0
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Move and shrink this box until it fits inside `area`
    pub fn clamp_into(&self, area: &BoundingBox) -> BoundingBox {
        let w = self.w.min(area.w);
        let h = self.h.min(area.h);
        let x = self.x.clamp(area.x, area.right() - w);
        let y = self.y.clamp(area.y, area.bottom() - h);
        BoundingBox::new(x, y, w, h)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Image,
    Text,
    Logo,
}

/// What an element is for on the poster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRole {
    Background,
    Logo,
    Headline,
    Body,
    CallToAction,
}

impl ContentRole {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Background => ElementKind::Image,
            Self::Logo => ElementKind::Logo,
            Self::Headline | Self::Body | Self::CallToAction => ElementKind::Text,
        }
    }

    /// Prefix used when minting element ids
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Logo => "logo",
            Self::Headline => "headline",
            Self::Body => "body",
            Self::CallToAction => "cta",
        }
    }

    /// Maximum words of copy allowed for textual roles
    pub fn word_limit(&self) -> Option<usize> {
        match self {
            Self::Headline | Self::CallToAction => Some(3),
            Self::Body => Some(8),
            Self::Background | Self::Logo => None,
        }
    }
}

/// Placement constraints attached to an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Constraint {
    /// Covers the whole canvas
    FullBleed,
    /// Must stay inside the margin-inset safe area
    WithinMargin,
    /// Must not overlap other text elements
    NoTextOverlap,
    /// Keep the source aspect ratio when scaling
    KeepAspect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRole {
    Display,
    Headline,
    Body,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorRole {
    Primary,
    Secondary,
    Neutral,
    Background,
}

impl ColorRole {
    pub const ALL: [ColorRole; 4] = [
        ColorRole::Primary,
        ColorRole::Secondary,
        ColorRole::Neutral,
        ColorRole::Background,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// Text styling expressed in palette/type roles, resolved against the style guide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub role: TypeRole,
    pub color: ColorRole,
    pub size_px: u32,
    pub weight: u16,
    pub align: TextAlign,
}

/// One placeable unit of the poster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: ElementId,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub role: ContentRole,
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub z: u32,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_style: Option<TextStyle>,
    /// Intended content, handed to the generation agent
    #[serde(default)]
    pub brief: String,
}

impl Element {
    pub fn has_constraint(&self, constraint: Constraint) -> bool {
        self.constraints.contains(&constraint)
    }

    pub fn is_text(&self) -> bool {
        self.kind == ElementKind::Text
    }
}

/// Semantic palette
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub primary: Rgb,
    pub secondary: Rgb,
    pub neutral: Rgb,
    pub background: Rgb,
}

impl Palette {
    pub fn get(&self, role: ColorRole) -> Rgb {
        match role {
            ColorRole::Primary => self.primary,
            ColorRole::Secondary => self.secondary,
            ColorRole::Neutral => self.neutral,
            ColorRole::Background => self.background,
        }
    }

    pub fn colors(&self) -> [Rgb; 4] {
        [self.primary, self.secondary, self.neutral, self.background]
    }
}

/// Font family per typographic role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRoles {
    pub display: String,
    pub headline: String,
    pub body: String,
    pub label: String,
}

impl TypeRoles {
    pub fn family(&self, role: TypeRole) -> &str {
        match role {
            TypeRole::Display => &self.display,
            TypeRole::Headline => &self.headline,
            TypeRole::Body => &self.body,
            TypeRole::Label => &self.label,
        }
    }
}

/// Palette, type roles and spacing; persisted as `style.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleGuide {
    pub palette: Palette,
    pub type_roles: TypeRoles,
    pub spacing_scale: Vec<u32>,
}

/// Optional brand material supplied with the request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandInput {
    pub logo: Option<PathBuf>,
    #[serde(default)]
    pub marketing: Vec<PathBuf>,
}

impl BrandInput {
    pub fn is_empty(&self) -> bool {
        self.logo.is_none() && self.marketing.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.logo.iter().chain(self.marketing.iter())
    }
}

/// Encoded image bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageArtifact {
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ImageArtifact {
    pub fn new(media_type: impl Into<String>, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            media_type: media_type.into(),
            width,
            height,
            data,
        }
    }

    /// File extension matching the media type
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/svg+xml" => "svg",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }

    pub fn digest(&self) -> String {
        content_digest(&self.data)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssetBody {
    Image(ImageArtifact),
    Text { content: String },
}

impl AssetBody {
    fn digest(&self) -> String {
        match self {
            Self::Image(image) => image.digest(),
            Self::Text { content } => content_digest(content.as_bytes()),
        }
    }
}

/// Facts reported by the generating service alongside the artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetMetadata {
    pub dominant_color: Option<Rgb>,
    pub contains_text: bool,
    pub font_family: Option<String>,
}

/// Committed content for one element
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub element_id: ElementId,
    pub body: AssetBody,
    pub confidence: f32,
    pub metadata: AssetMetadata,
    pub produced_by: String,
    pub iteration: u32,
    digest: String,
}

impl Asset {
    pub fn new(
        element_id: impl Into<ElementId>,
        body: AssetBody,
        produced_by: impl Into<String>,
        iteration: u32,
    ) -> Self {
        let digest = body.digest();
        Self {
            element_id: element_id.into(),
            body,
            confidence: 1.0,
            metadata: AssetMetadata::default(),
            produced_by: produced_by.into(),
            iteration,
            digest,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, metadata: AssetMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Content digest (first 16 hex chars of SHA-256)
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            AssetBody::Text { content } => Some(content),
            AssetBody::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<&ImageArtifact> {
        match &self.body {
            AssetBody::Image(image) => Some(image),
            AssetBody::Text { .. } => None,
        }
    }
}

/// First 16 hex chars of the SHA-256 of `bytes`
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(&hasher.finalize()[..8])
}

/// Violations of the `PosterSpec` invariants
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("Duplicate element id: {0}")]
    DuplicateId(ElementId),

    #[error("Duplicate z-order {z} (elements {first} and {second})")]
    DuplicateZ {
        z: u32,
        first: ElementId,
        second: ElementId,
    },

    #[error("Unknown element: {0}")]
    UnknownElement(ElementId),

    #[error("Element {element} changed kind from {from:?} to {to:?}")]
    KindChanged {
        element: ElementId,
        from: ElementKind,
        to: ElementKind,
    },

    #[error("Style guide is already committed")]
    StyleAlreadyCommitted,
}

/// The evolving poster state
#[derive(Debug, Clone, PartialEq)]
pub struct PosterSpec {
    keywords: Vec<String>,
    brand: BrandInput,
    style: Option<StyleGuide>,
    layout: Vec<Element>,
    assets: BTreeMap<ElementId, Asset>,
    validation_history: Vec<ValidationResult>,
    revisions: BTreeMap<ElementId, u32>,
}

impl PosterSpec {
    pub fn new(keywords: Vec<String>, brand: BrandInput) -> Self {
        Self {
            keywords,
            brand,
            style: None,
            layout: Vec::new(),
            assets: BTreeMap::new(),
            validation_history: Vec::new(),
            revisions: BTreeMap::new(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn brand(&self) -> &BrandInput {
        &self.brand
    }

    pub fn style(&self) -> Option<&StyleGuide> {
        self.style.as_ref()
    }

    /// Elements ordered by z (back to front)
    pub fn layout(&self) -> &[Element] {
        &self.layout
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.layout.iter().find(|e| e.id == id)
    }

    pub fn assets(&self) -> &BTreeMap<ElementId, Asset> {
        &self.assets
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.get(id)
    }

    pub fn validation_history(&self) -> &[ValidationResult] {
        &self.validation_history
    }

    /// Number of times an element's asset has been replaced after its first commit
    pub fn revision_count(&self, id: &str) -> u32 {
        self.revisions.get(id).copied().unwrap_or(0)
    }

    /// Element ids that have no committed asset, in z-order
    pub fn missing_assets(&self) -> Vec<ElementId> {
        self.layout
            .iter()
            .filter(|e| !self.assets.contains_key(&e.id))
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.layout.iter().all(|e| self.assets.contains_key(&e.id))
    }

    /// Commit the style guide; it cannot be replaced afterwards
    pub fn commit_style(&mut self, style: StyleGuide) -> Result<(), SpecError> {
        if self.style.is_some() {
            return Err(SpecError::StyleAlreadyCommitted);
        }
        self.style = Some(style);
        Ok(())
    }

    /// Replace the whole layout. Assets of elements that no longer exist are dropped.
    pub fn set_layout(&mut self, mut elements: Vec<Element>) -> Result<(), SpecError> {
        check_layout(&elements)?;
        elements.sort_by_key(|e| e.z);

        let ids: BTreeSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        self.assets.retain(|id, _| ids.contains(id.as_str()));
        self.revisions.retain(|id, _| ids.contains(id.as_str()));
        self.layout = elements;
        Ok(())
    }

    /// Replace one element's geometry/style in place
    pub fn update_element(&mut self, element: Element) -> Result<(), SpecError> {
        let index = self
            .layout
            .iter()
            .position(|e| e.id == element.id)
            .ok_or_else(|| SpecError::UnknownElement(element.id.clone()))?;

        let current = &self.layout[index];
        if current.kind != element.kind {
            return Err(SpecError::KindChanged {
                element: element.id.clone(),
                from: current.kind,
                to: element.kind,
            });
        }

        let mut next = self.layout.clone();
        next[index] = element;
        check_layout(&next)?;
        next.sort_by_key(|e| e.z);
        self.layout = next;
        Ok(())
    }

    /// Commit a generated asset for an existing element
    pub fn commit_asset(&mut self, asset: Asset) -> Result<(), SpecError> {
        if self.element(&asset.element_id).is_none() {
            return Err(SpecError::UnknownElement(asset.element_id));
        }
        if self.assets.contains_key(&asset.element_id) {
            *self.revisions.entry(asset.element_id.clone()).or_insert(0) += 1;
        }
        self.assets.insert(asset.element_id.clone(), asset);
        Ok(())
    }

    /// Drop the committed asset of an element so it must be regenerated
    pub fn invalidate(&mut self, id: &str) -> Option<Asset> {
        self.assets.remove(id)
    }

    /// Append results to the audit trail; existing results are never touched
    pub fn record_results(&mut self, results: impl IntoIterator<Item = ValidationResult>) {
        self.validation_history.extend(results);
    }

    /// Results recorded for one validation iteration
    pub fn results_for_iteration(&self, iteration: u32) -> Vec<&ValidationResult> {
        self.validation_history
            .iter()
            .filter(|r| r.iteration() == iteration)
            .collect()
    }

    /// Re-check the id/z uniqueness and the layout/asset correspondence
    pub fn check_invariants(&self) -> Result<(), SpecError> {
        check_layout(&self.layout)?;
        if let Some(orphan) = self.assets.keys().find(|id| self.element(id).is_none()) {
            return Err(SpecError::UnknownElement(orphan.clone()));
        }
        Ok(())
    }
}

fn check_layout(elements: &[Element]) -> Result<(), SpecError> {
    let mut ids = BTreeSet::new();
    let mut z_orders: BTreeMap<u32, &str> = BTreeMap::new();

    for element in elements {
        if !ids.insert(element.id.as_str()) {
            return Err(SpecError::DuplicateId(element.id.clone()));
        }
        if let Some(first) = z_orders.insert(element.z, element.id.as_str()) {
            return Err(SpecError::DuplicateZ {
                z: element.z,
                first: first.to_string(),
                second: element.id.clone(),
            });
        }
    }
    Ok(())
}
