//! Region derivation
//!
//! Picks the rectangles worth rendering for OCR from the drawing's
//! extent: the title block corner, the border strip, the legend area,
//! and a void region when the drawing carries conspicuously little
//! text for its size.

use crate::entity::CanonicalEntity;
use crate::types::AttrValue;

use super::{Bounds, Region, RegionType};

/// Fraction of the width where the title block column starts.
const TITLE_BLOCK_X_FRACTION: f64 = 0.65;
/// Fraction of the height the title block row covers.
const TITLE_BLOCK_Y_FRACTION: f64 = 0.25;
/// Fraction of the height covered by the border strip.
const BORDER_Y_FRACTION: f64 = 0.08;
/// Fraction of the width where the legend column starts.
const LEGEND_X_FRACTION: f64 = 0.75;
/// Fraction of the height where the legend row starts.
const LEGEND_Y_FRACTION: f64 = 0.70;
/// Below this many annotations the drawing is suspiciously text-poor
/// and the whole extent is offered for OCR.
const SPARSE_ANNOTATION_COUNT: usize = 3;

/// Accumulate the drawing extent over every coordinate an entity
/// carries. `None` when no coordinates exist.
pub fn drawing_bounds(entities: &[CanonicalEntity]) -> Option<Bounds> {
    let mut bounds: Option<Bounds> = None;
    for entity in entities {
        for value in entity.attributes.values() {
            match value {
                AttrValue::Point(p) => include(&mut bounds, p.x, p.y),
                AttrValue::Points(ps) => {
                    for p in ps {
                        include(&mut bounds, p.x, p.y);
                    }
                }
                _ => {}
            }
        }
    }
    bounds
}

fn include(bounds: &mut Option<Bounds>, x: f64, y: f64) {
    match bounds.as_mut() {
        Some(b) => b.include(x, y),
        None => *bounds = Some(Bounds::from_point(x, y)),
    }
}

/// Derive the OCR candidate regions for a drawing.
///
/// Region ids follow the `{type}_{index:03}` convention so enrichment
/// output stays correlatable with the region inventory.
pub fn derive_regions(bounds: &Bounds, annotation_count: usize) -> Vec<Region> {
    if bounds.is_empty() {
        return Vec::new();
    }
    let w = bounds.width();
    let h = bounds.height();
    let mut regions = Vec::new();

    regions.push(Region {
        region_id: format!("{}_{:03}", RegionType::TitleBlock.name(), regions.len()),
        region_type: RegionType::TitleBlock,
        bounds: Bounds::new(
            bounds.x_min + w * TITLE_BLOCK_X_FRACTION,
            bounds.y_min,
            bounds.x_max,
            bounds.y_min + h * TITLE_BLOCK_Y_FRACTION,
        ),
        priority: 0.9,
    });

    regions.push(Region {
        region_id: format!("{}_{:03}", RegionType::BorderArea.name(), regions.len()),
        region_type: RegionType::BorderArea,
        bounds: Bounds::new(
            bounds.x_min,
            bounds.y_min,
            bounds.x_max,
            bounds.y_min + h * BORDER_Y_FRACTION,
        ),
        priority: 0.5,
    });

    regions.push(Region {
        region_id: format!("{}_{:03}", RegionType::Legend.name(), regions.len()),
        region_type: RegionType::Legend,
        bounds: Bounds::new(
            bounds.x_min + w * LEGEND_X_FRACTION,
            bounds.y_min + h * LEGEND_Y_FRACTION,
            bounds.x_max,
            bounds.y_max,
        ),
        priority: 0.6,
    });

    if annotation_count < SPARSE_ANNOTATION_COUNT {
        regions.push(Region {
            region_id: format!("{}_{:03}", RegionType::SuspiciousVoid.name(), regions.len()),
            region_type: RegionType::SuspiciousVoid,
            bounds: *bounds,
            priority: 0.4,
        });
    }

    regions
}
