//! Outline rendering: crisp anti-aliased region boundaries on a white
//! canvas, ready for template printing.
//!
//! Each region contributes its contour polygon as a closed stroked
//! path. `tiny-skia` handles sub-pixel positioning and proper AA
//! internally; the premultiplied pixmap is converted back to straight
//! RGBA at the end.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};
use tracing::debug;

use crate::types::{Dimensions, Point, Region, Rgb};

/// Outline rendering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineOptions {
    /// Stroke width in pixels at working resolution.
    pub line_width: f64,

    /// Stroke color. Templates usually use a light gray so the printed
    /// outline disappears under paint.
    pub line_color: Rgb,

    /// Whether to anti-alias the strokes. Disable for binary
    /// (thresholdable) masks.
    pub anti_alias: bool,
}

impl Default for OutlineOptions {
    fn default() -> Self {
        Self {
            line_width: 1.5,
            line_color: Rgb::new(120, 120, 120),
            anti_alias: true,
        }
    }
}

/// Build a closed tiny-skia path from a contour polygon.
#[allow(clippy::cast_possible_truncation)]
fn contour_path(contour: &[Point]) -> Option<tiny_skia::Path> {
    if contour.len() < 2 {
        return None;
    }
    let (first, rest) = contour.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(first.x as f32, first.y as f32);
    for p in rest {
        pb.line_to(p.x as f32, p.y as f32);
    }
    pb.close();
    pb.finish()
}

/// Render every region's contour as a stroked outline on an opaque
/// white canvas.
///
/// Degenerate contours (fewer than 2 points) are skipped. The result
/// always has the requested dimensions, even when no contour could be
/// stroked.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn render_outline(
    regions: &[Region],
    dimensions: Dimensions,
    options: &OutlineOptions,
) -> RgbaImage {
    let Some(mut pixmap) = Pixmap::new(dimensions.width, dimensions.height) else {
        return RgbaImage::from_pixel(dimensions.width, dimensions.height, Rgba([255; 4]));
    };
    pixmap.fill(tiny_skia::Color::WHITE);

    let stroke = Stroke {
        width: options.line_width as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };

    let mut paint = Paint::default();
    paint.set_color_rgba8(
        options.line_color.r,
        options.line_color.g,
        options.line_color.b,
        255,
    );
    paint.anti_alias = options.anti_alias;

    let mut stroked = 0usize;
    for region in regions {
        let Some(path) = contour_path(&region.contour) else {
            continue;
        };
        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        stroked += 1;
    }
    debug!(
        regions = regions.len(),
        stroked,
        width = dimensions.width,
        height = dimensions.height,
        "rendered region outlines",
    );

    // Convert the pixmap (premultiplied RGBA) to straight RGBA. The
    // canvas is opaque, but keep the alpha guard for safety.
    let pixmap_data = pixmap.data();
    let mut img = RgbaImage::new(dimensions.width, dimensions.height);
    for (i, pixel) in img.pixels_mut().enumerate() {
        let off = i * 4;
        let a = pixmap_data[off + 3];
        if a == 0 {
            *pixel = Rgba([0, 0, 0, 0]);
        } else {
            let r = u16::from(pixmap_data[off]) * 255 / u16::from(a);
            let g = u16::from(pixmap_data[off + 1]) * 255 / u16::from(a);
            let b = u16::from(pixmap_data[off + 2]) * 255 / u16::from(a);
            *pixel = Rgba([r as u8, g as u8, b as u8, a]);
        }
    }
    img
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn square_region(dims: Dimensions) -> Region {
        let mask = GrayImage::from_fn(dims.width, dims.height, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                image::Luma([255])
            } else {
                image::Luma([0])
            }
        });
        Region {
            color_idx: 0,
            mask,
            contour: vec![
                Point::new(10.0, 10.0),
                Point::new(29.0, 10.0),
                Point::new(29.0, 29.0),
                Point::new(10.0, 29.0),
            ],
            center: Point::new(19.0, 19.0),
            area: 400,
            number_position: None,
        }
    }

    #[test]
    fn canvas_has_requested_dimensions() {
        let dims = Dimensions::new(40, 40);
        let img = render_outline(&[square_region(dims)], dims, &OutlineOptions::default());
        assert_eq!(img.dimensions(), (40, 40));
    }

    #[test]
    fn contour_edge_is_darkened_and_interior_stays_white() {
        let dims = Dimensions::new(40, 40);
        let img = render_outline(&[square_region(dims)], dims, &OutlineOptions::default());

        let edge = img.get_pixel(19, 10);
        assert!(
            edge[0] < 230,
            "expected a stroke on the top edge, got {edge:?}",
        );

        let interior = img.get_pixel(19, 19);
        assert_eq!(
            interior,
            &Rgba([255, 255, 255, 255]),
            "region interior must stay white",
        );

        let outside = img.get_pixel(2, 2);
        assert_eq!(outside, &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn closed_path_strokes_the_implicit_last_edge() {
        // The left edge between the last and first contour points only
        // appears if the path is closed.
        let dims = Dimensions::new(40, 40);
        let img = render_outline(&[square_region(dims)], dims, &OutlineOptions::default());
        let left = img.get_pixel(10, 19);
        assert!(
            left[0] < 230,
            "expected a stroke on the closing edge, got {left:?}",
        );
    }

    #[test]
    fn empty_region_list_renders_blank_canvas() {
        let dims = Dimensions::new(16, 12);
        let img = render_outline(&[], dims, &OutlineOptions::default());
        assert!(img.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn degenerate_contour_is_skipped() {
        let dims = Dimensions::new(16, 16);
        let mut region = square_region(dims);
        region.contour = vec![Point::new(5.0, 5.0)];
        let img = render_outline(&[region], dims, &OutlineOptions::default());
        assert!(img.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn custom_line_color_is_used() {
        let dims = Dimensions::new(40, 40);
        let options = OutlineOptions {
            line_color: Rgb::new(200, 40, 40),
            anti_alias: false,
            ..OutlineOptions::default()
        };
        let img = render_outline(&[square_region(dims)], dims, &options);
        let edge = img.get_pixel(19, 10);
        assert!(
            edge[0] > edge[1] && edge[0] > edge[2],
            "expected a reddish stroke, got {edge:?}",
        );
    }
}
