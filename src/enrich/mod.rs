//! Post-ingest enrichment
//!
//! The long-tail work the Job Manager runs off the request path:
//! region rendering, OCR, CAD↔OCR cross-validation, quality scoring,
//! and graph enrichment. Rendering and recognition engines are
//! external; this module owns their contracts and the data passed
//! across them.

pub mod regions;
pub mod runner;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use regions::{derive_regions, drawing_bounds};
pub use runner::{EnrichmentResult, EnrichmentRunner};
pub use validate::{cross_validate, score_quality, OcrEnrichment, QualityReport};

/// A rectangle in drawing coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Bounds {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Bounds { x_min, y_min, x_max, y_max }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Degenerate bounds cannot host regions.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Grow to include a point.
    pub fn include(&mut self, x: f64, y: f64) {
        self.x_min = self.x_min.min(x);
        self.y_min = self.y_min.min(y);
        self.x_max = self.x_max.max(x);
        self.y_max = self.y_max.max(y);
    }

    pub fn from_point(x: f64, y: f64) -> Self {
        Bounds::new(x, y, x, y)
    }
}

/// Classification of a rendered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    TitleBlock,
    Legend,
    Dimension,
    Annotation,
    SuspiciousVoid,
    BorderArea,
}

impl RegionType {
    pub fn name(&self) -> &'static str {
        match self {
            RegionType::TitleBlock => "title_block",
            RegionType::Legend => "legend",
            RegionType::Dimension => "dimension",
            RegionType::Annotation => "annotation",
            RegionType::SuspiciousVoid => "suspicious_void",
            RegionType::BorderArea => "border_area",
        }
    }

    /// Text patterns the OCR engine should expect in this region.
    pub fn expected_patterns(&self) -> &'static [&'static str] {
        match self {
            RegionType::TitleBlock => &[
                r"[A-Z]{2,}\d+-[A-Z]{2,}",
                r"ESC:?\s*1:\d+",
                r"\d{2}/\d{2}/\d{4}",
                r"REV:?\s*\w+",
            ],
            RegionType::Dimension => &[r"\d+\.?\d*", r"R\d+\.?\d*", r"Ø\d+\.?\d*"],
            RegionType::Legend => &[r"[A-Z]+\s*-\s*.+", r"COR:?\s*.+"],
            _ => &[],
        }
    }

    /// Guidance handed to the OCR engine with the image.
    pub fn contextual_prompt(&self) -> &'static str {
        match self {
            RegionType::TitleBlock => {
                "Extract project information, drawing numbers, scales, dates, \
                 and revision information from this title block."
            }
            RegionType::Dimension => {
                "Extract dimension values, measurements, radii (R), diameters (Ø) \
                 and tolerances from this drawing region."
            }
            RegionType::Legend => {
                "Extract legend items, color codes, line types and symbol \
                 descriptions from this legend."
            }
            RegionType::Annotation => {
                "Extract technical annotations, notes and text labels from this \
                 drawing region."
            }
            RegionType::SuspiciousVoid => {
                "Extract any text that might be embedded or rasterized in this \
                 region of the drawing."
            }
            RegionType::BorderArea => {
                "Extract border annotations, drawing frame information and edge \
                 notes from this drawing."
            }
        }
    }
}

/// A bounded rectangle submitted to rendering and OCR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub region_id: String,
    pub region_type: RegionType,
    pub bounds: Bounds,
    /// Processing priority in `[0, 1]`
    pub priority: f64,
}

/// Rendering parameters supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub dpi: u32,
    pub max_width_px: u32,
    pub max_height_px: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            dpi: 300,
            max_width_px: 4096,
            max_height_px: 4096,
        }
    }
}

/// The renderer's product for one region.
#[derive(Debug, Clone)]
pub struct RenderedRegion {
    pub region: Region,
    /// Encoded raster image (format is the renderer's concern)
    pub image: Vec<u8>,
    pub image_size: (u32, u32),
    pub actual_bounds: Bounds,
    pub scale_factor: f64,
    pub metadata: Value,
}

/// Context handed to the OCR engine alongside the image.
#[derive(Debug, Clone)]
pub struct OcrContext {
    pub region_type: RegionType,
    pub expected_patterns: Vec<String>,
    pub prompt: String,
    pub drawing_bounds: Bounds,
}

impl OcrContext {
    pub fn for_region(region_type: RegionType, drawing_bounds: Bounds) -> Self {
        OcrContext {
            region_type,
            expected_patterns: region_type
                .expected_patterns()
                .iter()
                .map(|p| p.to_string())
                .collect(),
            prompt: region_type.contextual_prompt().to_string(),
            drawing_bounds,
        }
    }
}

/// One recognized word or phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f64,
}

/// The OCR engine's product for one rendered region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOutcome {
    pub engine: String,
    pub full_text: String,
    pub words: Vec<OcrWord>,
    pub confidence_score: f64,
    /// Seconds the engine spent
    pub processing_time: f64,
}

/// External region renderer.
pub trait RegionRenderer: Send + Sync {
    fn render(&self, region: &Region, config: &RenderConfig) -> Result<RenderedRegion>;
}

/// External OCR engine.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, rendered: &RenderedRegion, context: &OcrContext) -> Result<OcrOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_accumulate() {
        let mut b = Bounds::from_point(1.0, 1.0);
        b.include(-2.0, 5.0);
        b.include(4.0, 0.0);
        assert_eq!(b, Bounds::new(-2.0, 0.0, 4.0, 5.0));
        assert_eq!(b.width(), 6.0);
        assert_eq!(b.height(), 5.0);
    }

    #[test]
    fn test_point_bounds_are_empty() {
        assert!(Bounds::from_point(3.0, 3.0).is_empty());
        assert!(!Bounds::new(0.0, 0.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn test_region_type_names() {
        assert_eq!(RegionType::TitleBlock.name(), "title_block");
        assert_eq!(RegionType::SuspiciousVoid.name(), "suspicious_void");
    }

    #[test]
    fn test_context_carries_patterns() {
        let ctx = OcrContext::for_region(RegionType::Dimension, Bounds::new(0.0, 0.0, 1.0, 1.0));
        assert!(!ctx.expected_patterns.is_empty());
        assert!(ctx.prompt.contains("dimension"));
    }
}
