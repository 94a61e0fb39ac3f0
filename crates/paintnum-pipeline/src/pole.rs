//! Pole of inaccessibility: the interior point farthest from any
//! polygon edge, the ideal spot for a paint number.
//!
//! Iterative grid-refinement search starting from the centroid:
//! evaluate a 5×5 grid of candidate offsets around the current best,
//! keep the winner, halve the cell size, and repeat until the cell
//! drops below the precision threshold. This converges to a **local**
//! optimum of the signed-distance field, not necessarily the global
//! one — an accepted speed/precision tradeoff kept intentionally, and
//! an open area for improvement rather than a defect. Changing it to a
//! global search would change output geometry for existing fixtures.

use geo::line_measures::{Distance, Euclidean};
use geo::{Centroid, Contains, Coord, LineString, Polygon};

use crate::types::Point;

/// Grid half-extent per refinement round (5×5 candidates).
const GRID_REACH: i32 = 2;

/// Convert a pipeline `Point` to a `geo::Coord`.
const fn point_to_coord(p: Point) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Signed distance from `point` to the polygon boundary: positive
/// inside, negative outside.
#[must_use]
pub fn signed_distance(polygon: &Polygon<f64>, point: Point) -> f64 {
    let geo_point = geo::Point::new(point.x, point.y);
    let boundary_distance = polygon
        .exterior()
        .lines()
        .map(|line| Euclidean.distance(&geo_point, &line))
        .fold(f64::INFINITY, f64::min);
    if polygon.contains(&geo_point) {
        boundary_distance
    } else {
        -boundary_distance
    }
}

/// Find the pole of inaccessibility of a contour polygon.
///
/// `precision` is the cell size (in pixels) below which refinement
/// stops; 0.5 is plenty for label placement on a pixel grid.
///
/// Returns `None` for degenerate contours (fewer than 3 points).
#[must_use]
pub fn pole_of_inaccessibility(contour: &[Point], precision: f64) -> Option<Point> {
    if contour.len() < 3 {
        return None;
    }
    let ring: Vec<Coord<f64>> = contour.iter().map(|&p| point_to_coord(p)).collect();
    let polygon = Polygon::new(LineString::new(ring), vec![]);

    let start = polygon.centroid().map_or_else(
        || {
            // Degenerate (zero-area) ring: fall back to the vertex mean.
            #[allow(clippy::cast_precision_loss)]
            let n = contour.len() as f64;
            let (sx, sy) = contour
                .iter()
                .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
            Point::new(sx / n, sy / n)
        },
        |c| Point::new(c.x(), c.y()),
    );

    let (min_x, max_x) = contour
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.x), hi.max(p.x))
        });
    let (min_y, max_y) = contour
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.y), hi.max(p.y))
        });

    let mut best = start;
    let mut best_distance = signed_distance(&polygon, best);
    let mut cell = ((max_x - min_x).max(max_y - min_y) / 4.0).max(precision);

    while cell > precision {
        for dy in -GRID_REACH..=GRID_REACH {
            for dx in -GRID_REACH..=GRID_REACH {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let candidate = Point::new(
                    f64::from(dx).mul_add(cell, best.x),
                    f64::from(dy).mul_add(cell, best.y),
                );
                let d = signed_distance(&polygon, candidate);
                if d > best_distance {
                    best = candidate;
                    best_distance = d;
                }
            }
        }
        cell /= 2.0;
    }
    Some(best)
}
