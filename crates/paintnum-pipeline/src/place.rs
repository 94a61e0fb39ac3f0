//! Number placement: pick a readable interior label position for each
//! region.
//!
//! Placement is order-dependent because the minimum-spacing constraint
//! is checked against every number already placed in the image. The
//! processing order is therefore an explicit part of the contract:
//! regions are processed in detection order (palette index ascending,
//! then contour trace order), so repeated runs place identically.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::distance::{DistanceField, distance_field};
use crate::pole::pole_of_inaccessibility;
use crate::types::{Point, Region};

/// How the initial placement candidate is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementMode {
    /// Use the region's distance-transform interior maximum. Cheap and
    /// usually good enough.
    #[default]
    DistanceTransform,

    /// Refine with a pole-of-inaccessibility search over the contour
    /// polygon. Slower, noticeably better on thin concave shapes.
    Pole,
}

/// Number placement parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementOptions {
    /// Initial candidate strategy.
    pub mode: PlacementMode,

    /// Minimum distance (pixels) from the mask boundary for a position
    /// to count as safely inside.
    pub min_margin: f64,

    /// Minimum distance (pixels) between any two placed numbers.
    pub min_spacing: f64,

    /// How many distance-transform maxima to try before falling back.
    pub candidates: usize,

    /// Grid-refinement stop threshold for [`PlacementMode::Pole`].
    pub pole_precision: f64,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            mode: PlacementMode::DistanceTransform,
            min_margin: 3.0,
            min_spacing: 12.0,
            candidates: 8,
            pole_precision: 0.5,
        }
    }
}

/// Assign `number_position` to every region, in order.
///
/// Each region tries its preferred candidate first (distance-transform
/// center or pole of inaccessibility), then up to
/// `options.candidates` distance-transform maxima, accepting the first
/// point that is both safely inside the mask and spacing-compliant.
/// When nothing qualifies, the most interior point wins regardless of
/// spacing and the degradation is logged. A number is always placed.
pub fn place_numbers(regions: &mut [Region], options: &PlacementOptions) {
    let mut placed: Vec<Point> = Vec::with_capacity(regions.len());
    for region in regions.iter_mut() {
        let position = place_one(region, options, &placed);
        placed.push(position);
        region.number_position = Some(position);
    }
}

fn place_one(region: &Region, options: &PlacementOptions, placed: &[Point]) -> Point {
    let field = distance_field(&region.mask);

    let preferred = match options.mode {
        PlacementMode::DistanceTransform => Some(region.center),
        PlacementMode::Pole => pole_of_inaccessibility(&region.contour, options.pole_precision),
    };
    if let Some(p) = preferred
        && qualifies(&field, region, p, options, placed)
    {
        return p;
    }

    for (candidate, _) in field.top_maxima(options.candidates, options.min_spacing) {
        if qualifies(&field, region, candidate, options, placed) {
            return candidate;
        }
    }

    // Fallback: the most interior point, spacing be damned. The mask
    // is nonempty by region invariant, but guard anyway.
    let fallback = field
        .interior_maximum()
        .map_or(region.center, |(p, _)| p);
    warn!(
        color_idx = region.color_idx,
        area = region.area,
        x = fallback.x,
        y = fallback.y,
        "no spacing-compliant number position, using most interior point",
    );
    fallback
}

/// A candidate qualifies when it sits inside the mask with the margin
/// to spare and keeps its distance from every placed number.
fn qualifies(
    field: &DistanceField,
    region: &Region,
    candidate: Point,
    options: &PlacementOptions,
    placed: &[Point],
) -> bool {
    boundary_distance(field, region, candidate)
        .is_some_and(|d| f64::from(d) >= options.min_margin)
        && placed
            .iter()
            .all(|p| p.distance(candidate) >= options.min_spacing)
}

/// Distance to the mask boundary at a (rounded) candidate position, or
/// `None` when the position falls outside the mask entirely.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn boundary_distance(field: &DistanceField, region: &Region, candidate: Point) -> Option<f32> {
    let (w, h) = region.mask.dimensions();
    if candidate.x < -0.5 || candidate.y < -0.5 {
        return None;
    }
    let x = candidate.x.round() as u32;
    let y = candidate.y.round() as u32;
    if x >= w || y >= h || region.mask.get_pixel(x, y).0[0] == 0 {
        return None;
    }
    Some(field.get(x, y))
}
