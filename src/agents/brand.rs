//! Brand grounding: palette and type roles for the run.
//!
//! With brand material the `brand-analysis` service derives the style guide.
//! Without it, the style is a pure function of the normalized keywords so that
//! identical requests always get identical palettes and fonts.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::adapters::{BrandRequest, Capability, ServiceRequest, ServiceResponse};
use crate::core::retry::{CallFailure, Invoker};
use crate::domain::{BrandInput, Palette, Rgb, StyleGuide, TypeRoles};

/// Display / body family pairs for the default style
const FONT_PAIRS: [(&str, &str); 6] = [
    ("Playfair Display", "Source Sans Pro"),
    ("Montserrat", "Merriweather"),
    ("Oswald", "Open Sans"),
    ("Lora", "Lato"),
    ("Bebas Neue", "Roboto"),
    ("Raleway", "Crimson Text"),
];

const SPACING_SCALE: [u32; 8] = [4, 8, 12, 16, 24, 32, 48, 64];

/// Derive a complete style guide from seed bytes
pub fn style_from_seed(seed: &[u8]) -> StyleGuide {
    let byte = |i: usize| seed.get(i).copied().unwrap_or(0);
    let hue = u16::from_be_bytes([byte(0), byte(1)]) as f64 % 360.0;
    let (display, body) = FONT_PAIRS[byte(2) as usize % FONT_PAIRS.len()];

    StyleGuide {
        palette: Palette {
            primary: Rgb::from_hsl(hue, 0.65, 0.45),
            secondary: Rgb::from_hsl(hue + 150.0, 0.55, 0.55),
            neutral: Rgb::from_hsl(hue, 0.15, 0.15),
            background: Rgb::from_hsl(hue, 0.30, 0.94),
        },
        type_roles: TypeRoles {
            display: display.to_string(),
            headline: display.to_string(),
            body: body.to_string(),
            label: body.to_string(),
        },
        spacing_scale: SPACING_SCALE.to_vec(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct BrandGroundingAgent;

impl BrandGroundingAgent {
    pub fn new() -> Self {
        Self
    }

    /// Style used when no brand material is supplied
    pub fn default_style(&self, keywords: &[String]) -> StyleGuide {
        let normalized: Vec<String> = keywords.iter().map(|k| k.trim().to_lowercase()).collect();
        let mut hasher = Sha256::new();
        hasher.update(normalized.join("\n").as_bytes());
        style_from_seed(&hasher.finalize())
    }

    /// Ground the style in the brand material, or fall back to the default style.
    ///
    /// A backend that rejects the material outright is not fatal: the run keeps
    /// going with the keyword-derived style.
    pub async fn ground(
        &self,
        invoker: &Invoker,
        keywords: &[String],
        brand: &BrandInput,
    ) -> Result<StyleGuide, CallFailure> {
        if brand.is_empty() {
            return Ok(self.default_style(keywords));
        }

        let request = ServiceRequest::Brand(BrandRequest {
            logo: brand.logo.clone(),
            marketing: brand.marketing.clone(),
            keywords: keywords.to_vec(),
        });

        match invoker.call(&request).await {
            Ok(outcome) => match outcome.response {
                ServiceResponse::Brand(style) => Ok(style),
                other => Err(CallFailure {
                    error: other.unexpected(Capability::BrandAnalysis),
                    attempts: outcome.attempts,
                }),
            },
            Err(failure) if !failure.error.is_transient() => {
                warn!(error = %failure.error, "Brand analysis rejected, using default style");
                Ok(self.default_style(keywords))
            }
            Err(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_default_style_is_deterministic() {
        let agent = BrandGroundingAgent::new();
        let a = agent.default_style(&keywords(&["Italian", "Restaurant"]));
        let b = agent.default_style(&keywords(&[" italian", "RESTAURANT "]));
        let c = agent.default_style(&keywords(&["Jazz", "Festival"]));

        assert_eq!(a, b);
        assert_ne!(a.palette, c.palette);
    }

    #[test]
    fn test_default_style_shape() {
        let style = BrandGroundingAgent::new().default_style(&keywords(&["Italian", "Restaurant"]));

        assert_eq!(style.spacing_scale, SPACING_SCALE.to_vec());
        assert_eq!(style.type_roles.display, style.type_roles.headline);
        assert_eq!(style.type_roles.body, style.type_roles.label);
        // Light canvas, dark neutral
        assert!(style.palette.background.relative_luminance() > 0.7);
        assert!(style.palette.neutral.contrast_ratio(style.palette.background) > 7.0);
    }
}
