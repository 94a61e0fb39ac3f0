//! Region detection: connected paintable areas per palette color.
//!
//! For each palette index with at least one pixel: build the binary
//! mask, apply morphological close then open (close fills pinholes and
//! hairline gaps, open removes specks — the order matters), then
//! extract external contours and materialize a [`Region`] for every
//! contour enclosing at least the minimum area. Masks are padded by
//! one background pixel before tracing, so regions touching the image
//! border keep their outer contour. Region masks are
//! rasterized from the contour and intersected with the cleaned label
//! map, so the mask/label consistency invariant holds exactly.
//!
//! Morphology moves pixels between colors, so detection also produces
//! a cleaned [`LabelMap`] consistent with the emitted regions. A color
//! whose pixels all evaporate during cleanup or filtering is dropped
//! from the region output with a warning; that is a degraded result,
//! not an error.

use image::GrayImage;
use imageproc::contours::BorderType;
use imageproc::distance_transform::Norm;
use tracing::{debug, warn};

use crate::distance::distance_field;
use crate::types::{Dimensions, LabelMap, Palette, PipelineError, Point, Region};

/// Parameters for region extraction.
#[derive(Debug, Clone, Copy)]
pub struct RegionOptions {
    /// Minimum region area in pixels; smaller regions are dropped.
    pub min_region_size: u32,
    /// Structuring element radius for close/open. 0 disables
    /// morphology.
    pub morphology_kernel_size: u8,
}

/// Extract regions from a label map.
///
/// Returns the regions in detection order (palette indices ascending,
/// contours in trace order — the number placer depends on this order
/// being stable) together with the cleaned label map they are
/// consistent with.
///
/// # Errors
///
/// Returns [`PipelineError::InvariantViolation`] if `labels` and
/// `palette` disagree.
pub fn detect_regions(
    labels: &LabelMap,
    palette: &Palette,
    options: RegionOptions,
) -> Result<(Vec<Region>, LabelMap), PipelineError> {
    labels.validate(palette)?;
    let cleaned = cleaned_label_map(labels, palette, options.morphology_kernel_size)?;

    let dims = cleaned.dimensions();
    let mut regions = Vec::new();
    for color_idx in 0..palette.len() {
        let mask = color_mask(&cleaned, color_idx);
        let pixel_count = mask.pixels().filter(|p| p.0[0] > 0).count();
        if pixel_count == 0 {
            continue;
        }

        let found = regions_from_mask(&mask, color_idx, options.min_region_size, dims);
        if found.is_empty() {
            warn!(
                color_idx,
                pixel_count, "color lost all regions to size filtering",
            );
        }
        regions.extend(found);
    }
    debug!(region_count = regions.len(), "region detection complete");
    Ok((regions, cleaned))
}

/// Join nearby same-color regions.
///
/// Per color: union the masks, dilate by `distance_threshold`, find
/// connected components of the dilated mask, then erode each component
/// back and intersect with the original union. Islands within
/// `2 × distance_threshold` of each other fuse into one region at
/// roughly original size; the intersection guarantees no area is
/// invented (output area ≤ sum of input areas).
///
/// Regions are re-emitted in (color, component) order. Components
/// whose recovered mask falls below `min_region_size` are dropped with
/// a warning.
#[must_use]
pub fn merge_nearby_regions(
    regions: &[Region],
    dims: Dimensions,
    distance_threshold: u8,
    min_region_size: u32,
) -> Vec<Region> {
    if distance_threshold == 0 || regions.is_empty() {
        return regions.to_vec();
    }

    let mut color_indices: Vec<usize> = regions.iter().map(|r| r.color_idx).collect();
    color_indices.sort_unstable();
    color_indices.dedup();

    let mut merged = Vec::new();
    for color_idx in color_indices {
        let members: Vec<&Region> = regions.iter().filter(|r| r.color_idx == color_idx).collect();

        // Union of all member masks.
        let mut union = GrayImage::new(dims.width, dims.height);
        for r in &members {
            for (x, y, p) in r.mask.enumerate_pixels() {
                if p.0[0] > 0 {
                    union.put_pixel(x, y, image::Luma([255]));
                }
            }
        }

        let dilated = imageproc::morphology::dilate(&union, Norm::LInf, distance_threshold);
        let components = imageproc::region_labelling::connected_components(
            &dilated,
            imageproc::region_labelling::Connectivity::Four,
            image::Luma([0u8]),
        );
        let max_component = components.pixels().map(|p| p.0[0]).max().unwrap_or(0);

        for component in 1..=max_component {
            let component_mask = GrayImage::from_fn(dims.width, dims.height, |x, y| {
                if components.get_pixel(x, y).0[0] == component {
                    image::Luma([255])
                } else {
                    image::Luma([0])
                }
            });
            let eroded =
                imageproc::morphology::erode(&component_mask, Norm::LInf, distance_threshold);

            // Recover the cleaned boundary: eroded component ∩ union.
            // Erosion near the image border can shave a few boundary
            // pixels; it can never invent area.
            let recovered = GrayImage::from_fn(dims.width, dims.height, |x, y| {
                let in_union = union.get_pixel(x, y).0[0] > 0;
                let in_component = components.get_pixel(x, y).0[0] == component;
                let in_eroded = eroded.get_pixel(x, y).0[0] > 0;
                if in_eroded && in_union && in_component {
                    image::Luma([255])
                } else {
                    image::Luma([0])
                }
            });

            match materialize_region(&recovered, color_idx) {
                Some(region) if region.area >= min_region_size => merged.push(region),
                Some(region) => {
                    warn!(
                        color_idx,
                        area = region.area,
                        min_region_size,
                        "merged component below minimum size, dropping",
                    );
                }
                None => {
                    warn!(color_idx, component, "merged component recovered no pixels");
                }
            }
        }
    }
    merged
}

/// Drop regions below `min_area`.
///
/// Dropped regions are logged, never partially retained.
#[must_use]
pub fn filter_small_regions(regions: Vec<Region>, min_area: u32) -> Vec<Region> {
    regions
        .into_iter()
        .filter(|r| {
            if r.area < min_area {
                debug!(
                    color_idx = r.color_idx,
                    area = r.area,
                    min_area,
                    "dropping undersized region",
                );
                false
            } else {
                true
            }
        })
        .collect()
}

// ───────────────────────── internals ──────────────────────────

/// Apply close/open per color and resolve the cleaned masks back into
/// a single consistent label map.
///
/// Morphological close can claim a pixel for several colors at once.
/// Resolution: a pixel keeps its original label if that color's
/// cleaned mask still covers it; otherwise the lowest claiming color
/// index wins; pixels no mask claims keep their original label.
fn cleaned_label_map(
    labels: &LabelMap,
    palette: &Palette,
    kernel: u8,
) -> Result<LabelMap, PipelineError> {
    if kernel == 0 {
        return Ok(labels.clone());
    }
    let dims = labels.dimensions();
    let len = dims.width as usize * dims.height as usize;
    let mut resolved: Vec<Option<u8>> = vec![None; len];

    for color_idx in 0..palette.len() {
        let mask = color_mask(labels, color_idx);
        if mask.pixels().all(|p| p.0[0] == 0) {
            continue;
        }
        let closed = imageproc::morphology::close(&mask, Norm::LInf, kernel);
        let cleaned = imageproc::morphology::open(&closed, Norm::LInf, kernel);

        let color_u8 = u8::try_from(color_idx).unwrap_or(u8::MAX);
        for (x, y, p) in cleaned.enumerate_pixels() {
            if p.0[0] == 0 {
                continue;
            }
            let i = y as usize * dims.width as usize + x as usize;
            if labels.get(x, y) == color_u8 {
                resolved[i] = Some(color_u8);
            } else if resolved[i].is_none() {
                resolved[i] = Some(color_u8);
            }
        }
    }

    let data: Vec<u8> = resolved
        .iter()
        .enumerate()
        .map(|(i, &r)| r.unwrap_or(labels.data()[i]))
        .collect();
    LabelMap::from_raw(dims.width, dims.height, data)
}

/// Binary mask of the pixels labeled `color_idx`.
fn color_mask(labels: &LabelMap, color_idx: usize) -> GrayImage {
    let dims = labels.dimensions();
    GrayImage::from_fn(dims.width, dims.height, |x, y| {
        if usize::from(labels.get(x, y)) == color_idx {
            image::Luma([255])
        } else {
            image::Luma([0])
        }
    })
}

/// Extract all sufficiently large regions from one color's cleaned
/// mask.
fn regions_from_mask(
    mask: &GrayImage,
    color_idx: usize,
    min_region_size: u32,
    dims: Dimensions,
) -> Vec<Region> {
    let mut regions = Vec::new();

    for contour in outer_contours(mask) {
        if contour.len() < 3 {
            continue;
        }
        // Rasterize the contour fill, then intersect with the color
        // mask so hole pixels belonging to other colors stay out.
        let filled = fill_contour(&contour, dims);
        let region_mask = GrayImage::from_fn(dims.width, dims.height, |x, y| {
            if filled.get_pixel(x, y).0[0] > 0 && mask.get_pixel(x, y).0[0] > 0 {
                image::Luma([255])
            } else {
                image::Luma([0])
            }
        });

        let Some(mut region) = materialize_region(&region_mask, color_idx) else {
            continue;
        };
        // Keep the traced contour rather than re-deriving it from the
        // intersected mask; external consumers want the outer boundary.
        region.contour = contour
            .iter()
            .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
            .collect();

        if region.area >= min_region_size {
            regions.push(region);
        }
    }
    regions
}

/// Build a [`Region`] from a binary mask: contour, area, and
/// distance-transform center. Returns `None` for an empty mask.
fn materialize_region(mask: &GrayImage, color_idx: usize) -> Option<Region> {
    let area = u32::try_from(mask.pixels().filter(|p| p.0[0] > 0).count()).ok()?;
    if area == 0 {
        return None;
    }
    let field = distance_field(mask);
    let (center, _) = field.interior_maximum()?;

    let contour = outer_contours(mask)
        .into_iter()
        .max_by_key(Vec::len)
        .map(|c| {
            c.iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect()
        })?;

    Some(Region {
        color_idx,
        mask: mask.clone(),
        contour,
        center,
        area,
        number_position: None,
    })
}

/// Trace the external contours of a mask.
///
/// Suzuki-Abe never emits a contour for foreground on the first or
/// last row/column, so the mask is padded with a one-pixel background
/// border first and the traced points translated back. Without the
/// pad, any region touching the image border would vanish.
fn outer_contours(mask: &GrayImage) -> Vec<Vec<imageproc::point::Point<u32>>> {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    for (x, y, p) in mask.enumerate_pixels() {
        if p.0[0] > 0 {
            padded.put_pixel(x + 1, y + 1, image::Luma([255]));
        }
    }
    imageproc::contours::find_contours::<u32>(&padded)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| {
            c.points
                .iter()
                .map(|p| imageproc::point::Point::new(p.x - 1, p.y - 1))
                .collect()
        })
        .collect()
}

/// Rasterize a contour's interior (contour pixels included).
fn fill_contour(points: &[imageproc::point::Point<u32>], dims: Dimensions) -> GrayImage {
    let mut polygon: Vec<imageproc::point::Point<i32>> = points
        .iter()
        .map(|p| {
            imageproc::point::Point::new(
                i32::try_from(p.x).unwrap_or(i32::MAX),
                i32::try_from(p.y).unwrap_or(i32::MAX),
            )
        })
        .collect();
    // draw_polygon_mut requires an open polygon.
    if polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }

    let mut filled = GrayImage::new(dims.width, dims.height);
    if polygon.len() >= 3 {
        imageproc::drawing::draw_polygon_mut(&mut filled, &polygon, image::Luma([255]));
    }
    // Ensure the contour pixels themselves are set; the scanline fill
    // can miss single-pixel spurs.
    for p in points {
        if p.x < dims.width && p.y < dims.height {
            filled.put_pixel(p.x, p.y, image::Luma([255]));
        }
    }
    filled
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Rgb;

    fn options(min: u32, kernel: u8) -> RegionOptions {
        RegionOptions {
            min_region_size: min,
            morphology_kernel_size: kernel,
        }
    }

    fn two_color_palette() -> Palette {
        Palette::new(vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)])
    }

    /// 20x20 map: label 1 square at (4,4)..(14,14), label 0 elsewhere.
    fn square_map() -> LabelMap {
        let data = (0..400)
            .map(|i| {
                let (x, y) = (i % 20, i / 20);
                u8::from((4..14).contains(&x) && (4..14).contains(&y))
            })
            .collect();
        LabelMap::from_raw(20, 20, data).unwrap()
    }

    #[test]
    fn solid_color_produces_single_full_region() {
        let labels = LabelMap::from_raw(100, 100, vec![0; 10_000]).unwrap();
        let palette = Palette::new(vec![Rgb::new(255, 0, 0)]);
        let (regions, cleaned) = detect_regions(&labels, &palette, options(100, 0)).unwrap();
        assert_eq!(regions.len(), 1, "solid image should yield one region");
        assert_eq!(regions[0].area, 10_000);
        assert_eq!(regions[0].color_idx, 0);
        assert_eq!(cleaned, labels);
    }

    #[test]
    fn detects_square_region_with_correct_area() {
        let (regions, cleaned) =
            detect_regions(&square_map(), &two_color_palette(), options(20, 0)).unwrap();
        let white: Vec<&Region> = regions.iter().filter(|r| r.color_idx == 1).collect();
        assert_eq!(white.len(), 1);
        assert_eq!(white[0].area, 100, "10x10 square should have area 100");
        white[0].validate(&cleaned).unwrap();

        // Center lands inside the square.
        let c = white[0].center;
        assert!(
            (4.0..14.0).contains(&c.x) && (4.0..14.0).contains(&c.y),
            "center ({}, {}) outside the square",
            c.x,
            c.y,
        );
    }

    #[test]
    fn regions_consistent_with_cleaned_labels() {
        let (regions, cleaned) =
            detect_regions(&square_map(), &two_color_palette(), options(10, 1)).unwrap();
        assert!(!regions.is_empty());
        for region in &regions {
            region.validate(&cleaned).unwrap();
        }
    }

    #[test]
    fn small_regions_are_dropped_entirely() {
        // A 2x2 white blob (area 4) below min_region_size 10.
        let mut data = vec![0u8; 400];
        for y in 5..7 {
            for x in 5..7 {
                data[y * 20 + x] = 1;
            }
        }
        let labels = LabelMap::from_raw(20, 20, data).unwrap();
        let (regions, _) = detect_regions(&labels, &two_color_palette(), options(10, 0)).unwrap();
        assert!(
            regions.iter().all(|r| r.color_idx == 0),
            "the undersized white blob must be dropped, got {} regions",
            regions.len(),
        );
        assert!(regions.iter().all(|r| r.area >= 10));
    }

    #[test]
    fn morphology_removes_single_pixel_speck() {
        // One isolated white pixel: open() erases it at kernel >= 1.
        let mut data = vec![0u8; 400];
        data[10 * 20 + 10] = 1;
        let labels = LabelMap::from_raw(20, 20, data).unwrap();
        let (regions, cleaned) =
            detect_regions(&labels, &two_color_palette(), options(1, 1)).unwrap();
        assert!(
            regions.iter().all(|r| r.color_idx == 0),
            "speck should be cleaned away",
        );
        assert_eq!(cleaned.get(10, 10), 0, "speck pixel should be relabeled");
    }

    #[test]
    fn detection_order_is_color_ascending() {
        let (regions, _) =
            detect_regions(&square_map(), &two_color_palette(), options(10, 0)).unwrap();
        let order: Vec<usize> = regions.iter().map(|r| r.color_idx).collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted, "regions must be emitted in ascending color order");
    }

    #[test]
    fn disconnected_same_color_areas_become_separate_regions() {
        // Two white squares, far apart.
        let mut data = vec![0u8; 900];
        for y in 2..8 {
            for x in 2..8 {
                data[y * 30 + x] = 1;
            }
        }
        for y in 20..28 {
            for x in 20..28 {
                data[y * 30 + x] = 1;
            }
        }
        let labels = LabelMap::from_raw(30, 30, data).unwrap();
        let (regions, _) = detect_regions(&labels, &two_color_palette(), options(10, 0)).unwrap();
        let white_count = regions.iter().filter(|r| r.color_idx == 1).count();
        assert_eq!(white_count, 2, "expected two disconnected white regions");
    }

    #[test]
    fn border_touching_region_keeps_its_contour() {
        // White band flush with the left edge: columns 0..5.
        let data = (0..20 * 20)
            .map(|i| u8::from(i % 20 < 5))
            .collect();
        let labels = LabelMap::from_raw(20, 20, data).unwrap();
        let (regions, cleaned) =
            detect_regions(&labels, &two_color_palette(), options(10, 0)).unwrap();
        let white: Vec<&Region> = regions.iter().filter(|r| r.color_idx == 1).collect();
        assert_eq!(white.len(), 1, "edge-flush band must survive detection");
        assert_eq!(white[0].area, 100, "5x20 band should have area 100");
        assert!(white[0].contour.len() >= 4);
        assert!(
            white[0].contour.iter().all(|p| p.x < 20.0 && p.y < 20.0),
            "contour points must be in image coordinates",
        );
        white[0].validate(&cleaned).unwrap();
    }

    #[test]
    fn corner_region_is_detected() {
        // 6x6 white square in the top-left corner, touching two edges.
        let data = (0..400)
            .map(|i| u8::from(i % 20 < 6 && i / 20 < 6))
            .collect();
        let labels = LabelMap::from_raw(20, 20, data).unwrap();
        let (regions, _) = detect_regions(&labels, &two_color_palette(), options(10, 0)).unwrap();
        let white: Vec<&Region> = regions.iter().filter(|r| r.color_idx == 1).collect();
        assert_eq!(white.len(), 1);
        assert_eq!(white[0].area, 36);
    }

    // --- merge_nearby_regions ---

    fn detect(labels: &LabelMap, palette: &Palette, min: u32) -> (Vec<Region>, LabelMap) {
        detect_regions(labels, palette, options(min, 0)).unwrap()
    }

    #[test]
    fn merge_joins_close_islands() {
        // Two white 6x6 squares separated by a 3px gap.
        let mut data = vec![0u8; 30 * 12];
        for y in 3..9 {
            for x in 3..9 {
                data[y * 30 + x] = 1;
            }
            for x in 12..18 {
                data[y * 30 + x] = 1;
            }
        }
        let labels = LabelMap::from_raw(30, 12, data).unwrap();
        let palette = two_color_palette();
        let (regions, _) = detect(&labels, &palette, 10);
        let white_before = regions.iter().filter(|r| r.color_idx == 1).count();
        assert_eq!(white_before, 2);

        let dims = labels.dimensions();
        let merged = merge_nearby_regions(&regions, dims, 2, 10);
        let white: Vec<&Region> = merged.iter().filter(|r| r.color_idx == 1).collect();
        assert_eq!(white.len(), 1, "islands 3px apart should fuse at threshold 2");

        // Area conservation: at least the larger input, at most the sum.
        assert!(white[0].area >= 36, "merged area {} below largest input", white[0].area);
        assert!(white[0].area <= 72, "merged area {} exceeds input sum", white[0].area);
    }

    #[test]
    fn merge_handles_border_touching_islands() {
        // Two white squares flush with the top edge, 3px apart; the
        // recovered component still touches row 0.
        let mut data = vec![0u8; 30 * 12];
        for y in 0..6 {
            for x in 2..8 {
                data[y * 30 + x] = 1;
            }
            for x in 11..17 {
                data[y * 30 + x] = 1;
            }
        }
        let labels = LabelMap::from_raw(30, 12, data).unwrap();
        let (regions, _) = detect(&labels, &two_color_palette(), 10);
        assert_eq!(regions.iter().filter(|r| r.color_idx == 1).count(), 2);

        let merged = merge_nearby_regions(&regions, labels.dimensions(), 2, 10);
        let white: Vec<&Region> = merged.iter().filter(|r| r.color_idx == 1).collect();
        assert_eq!(white.len(), 1, "edge-flush islands should still fuse");
        assert!(white[0].area <= 72, "merged area {} exceeds input sum", white[0].area);
        assert!(
            (0..30).any(|x| white[0].mask.get_pixel(x, 0).0[0] > 0),
            "merged mask should keep its top-edge pixels",
        );
    }

    #[test]
    fn merge_leaves_distant_islands_alone() {
        let mut data = vec![0u8; 40 * 10];
        for y in 2..8 {
            for x in 2..8 {
                data[y * 40 + x] = 1;
            }
            for x in 30..36 {
                data[y * 40 + x] = 1;
            }
        }
        let labels = LabelMap::from_raw(40, 10, data).unwrap();
        let (regions, _) = detect(&labels, &two_color_palette(), 10);
        let merged = merge_nearby_regions(&regions, labels.dimensions(), 2, 10);
        let white_count = merged.iter().filter(|r| r.color_idx == 1).count();
        assert_eq!(white_count, 2, "far islands must stay separate");
    }

    #[test]
    fn merge_zero_threshold_is_identity() {
        let (regions, _) = detect(&square_map(), &two_color_palette(), 10);
        let merged = merge_nearby_regions(&regions, square_map().dimensions(), 0, 10);
        assert_eq!(merged.len(), regions.len());
    }

    // --- filter_small_regions ---

    #[test]
    fn filter_enforces_minimum() {
        let (regions, _) = detect(&square_map(), &two_color_palette(), 1);
        let filtered = filter_small_regions(regions, 150);
        assert!(filtered.iter().all(|r| r.area >= 150));
    }
}
