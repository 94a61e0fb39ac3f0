//! Color quantization: reduce the working image to a labeled palette.
//!
//! Two mutually exclusive modes, selected by [`QuantizeMode`]:
//!
//! - **Clustering**: seeded k-means over per-pixel feature vectors in a
//!   configurable color space, with a mini-batch variant above a pixel
//!   threshold. Produces a per-image palette.
//! - **Unified**: projection onto a fixed named palette by nearest
//!   entry in the configured perceptual space. O(pixels × palette
//!   size), acceptable because palettes are capped at 72 entries.
//!
//! Either way the result is a (palette, label map) pair that is
//! internally consistent: every label indexes the returned palette.
//! Follow-up operations (`sort_by_luminance`, `reduce_similar_colors`,
//! `apply_palette`) always produce a **new** pair plus a remap rather
//! than mutating in place.

use std::collections::BTreeMap;

use image::RgbImage;
use petgraph::unionfind::UnionFind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::color::{feature_distance_squared, ColorSpace};
use crate::palettes;
use crate::types::{LabelMap, Palette, PipelineError, Rgb};

/// Lower clamp for the requested cluster count.
pub const MIN_COLORS: u32 = 2;
/// Upper clamp for the requested cluster count, matching the unified
/// palette size cap.
pub const MAX_COLORS: u32 = 72;

/// Above this many samples, k-means switches to the mini-batch update.
const MINI_BATCH_THRESHOLD: usize = 300_000;
/// Mini-batch size per iteration.
const MINI_BATCH_SIZE: usize = 10_240;
/// Full Lloyd iteration cap.
const MAX_ITERATIONS: usize = 50;
/// Mini-batch iteration cap.
const MINI_BATCH_ITERATIONS: usize = 120;
/// Center movement (squared) below which Lloyd iteration stops.
const CONVERGENCE_EPSILON: f32 = 0.05;

/// How the palette is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuantizeMode {
    /// Per-image palette via k-means clustering.
    Clustering {
        /// Requested palette size; clamped to `[MIN_COLORS, MAX_COLORS]`
        /// by design rather than treated as an error.
        n_colors: u32,
        /// Space distances are measured in.
        color_space: ColorSpace,
        /// Fraction of pixels used to fit cluster centers (0.0-1.0;
        /// values outside are clamped, and at least one pixel is always
        /// sampled). Assignment always covers every pixel.
        sample_fraction: f32,
        /// RNG seed for center initialization; fixed seed gives
        /// byte-identical output across runs.
        seed: u64,
        /// Re-sort the finished palette by luminance (remapping every
        /// label consistently).
        sort_by_luminance: bool,
    },
    /// Projection onto a fixed named palette.
    Unified {
        /// Built-in palette name; unknown names are a configuration
        /// error.
        palette_name: String,
        /// Space the nearest-entry search runs in.
        color_space: ColorSpace,
    },
}

impl Default for QuantizeMode {
    fn default() -> Self {
        Self::Clustering {
            n_colors: 16,
            color_space: ColorSpace::Lab,
            sample_fraction: 0.25,
            seed: 42,
            sort_by_luminance: true,
        }
    }
}

/// A palette and its per-pixel assignment, produced together and
/// guaranteed consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantized {
    /// The palette, in paint-number order.
    pub palette: Palette,
    /// Per-pixel palette indices.
    pub labels: LabelMap,
}

impl Quantized {
    /// Render the quantized image: every pixel replaced by its palette
    /// color.
    ///
    /// A label without a palette entry renders as black, but
    /// [`quantize`] never produces an inconsistent pair.
    #[must_use]
    pub fn to_image(&self) -> RgbImage {
        let dims = self.labels.dimensions();
        RgbImage::from_fn(dims.width, dims.height, |x, y| {
            let idx = usize::from(self.labels.get(x, y));
            self.palette.get(idx).unwrap_or(Rgb::new(0, 0, 0)).into()
        })
    }
}

/// Quantize an image per the selected mode.
///
/// # Errors
///
/// Returns [`PipelineError::UnknownPalette`] for an unknown unified
/// palette name, [`PipelineError::InvalidConfig`] for an empty image,
/// and [`PipelineError::InvariantViolation`] only on internal
/// inconsistency.
pub fn quantize(image: &RgbImage, mode: &QuantizeMode) -> Result<Quantized, PipelineError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidConfig(
            "cannot quantize an empty image".to_string(),
        ));
    }
    match mode {
        QuantizeMode::Clustering {
            n_colors,
            color_space,
            sample_fraction,
            seed,
            sort_by_luminance,
        } => {
            let k = (*n_colors).clamp(MIN_COLORS, MAX_COLORS);
            let quantized =
                cluster(image, k, *color_space, *sample_fraction, *seed)?;
            if *sort_by_luminance {
                let (palette, labels) =
                    self::sort_by_luminance(&quantized.palette, &quantized.labels)?;
                Ok(Quantized { palette, labels })
            } else {
                Ok(quantized)
            }
        }
        QuantizeMode::Unified {
            palette_name,
            color_space,
        } => {
            let palette = palettes::unified_palette(palette_name)?.to_palette();
            let labels = apply_palette(image, &palette, *color_space)?;
            Ok(Quantized { palette, labels })
        }
    }
}

/// Re-project an arbitrary image onto an existing palette by nearest
/// color in `space`.
///
/// Used by unified-mode quantization and to re-quantize after other
/// transforms without re-clustering.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the palette is empty or
/// larger than 256 entries (labels are 8-bit).
pub fn apply_palette(
    image: &RgbImage,
    palette: &Palette,
    space: ColorSpace,
) -> Result<LabelMap, PipelineError> {
    if palette.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "cannot project onto an empty palette".to_string(),
        ));
    }
    if palette.len() > 256 {
        return Err(PipelineError::InvalidConfig(format!(
            "palette has {} entries, above the 256 label limit",
            palette.len(),
        )));
    }
    let entries: Vec<[f32; 3]> = palette.colors().iter().map(|&c| space.features(c)).collect();

    let mut data = Vec::with_capacity(image.width() as usize * image.height() as usize);
    for p in image.pixels() {
        let f = space.features(Rgb::from(*p));
        data.push(nearest_center(&entries, f));
    }
    LabelMap::from_raw(image.width(), image.height(), data)
}

/// Sort a palette by ascending luminance, producing a new palette and
/// a consistently remapped label map.
///
/// The sort is stable, so sorting an already-sorted palette is a no-op
/// and sorting twice equals sorting once.
///
/// # Errors
///
/// Returns [`PipelineError::InvariantViolation`] if the label map
/// references an index outside the palette.
pub fn sort_by_luminance(
    palette: &Palette,
    labels: &LabelMap,
) -> Result<(Palette, LabelMap), PipelineError> {
    labels.validate(palette)?;

    let mut order: Vec<usize> = (0..palette.len()).collect();
    order.sort_by(|&a, &b| {
        let (la, lb) = (palette.colors()[a].luminance(), palette.colors()[b].luminance());
        la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
    });

    let sorted = Palette::new(order.iter().map(|&i| palette.colors()[i]).collect());
    let mut remap = vec![0u8; palette.len()];
    for (new_idx, &old_idx) in order.iter().enumerate() {
        remap[old_idx] = u8::try_from(new_idx).unwrap_or(u8::MAX);
    }
    let remapped = labels.remapped(&remap)?;
    Ok((sorted, remapped))
}

/// Merge palette entries closer than `threshold` in RGB Euclidean
/// distance, averaging the colors of each merge group and remapping
/// every affected label.
///
/// Pairs `(i, j)` with `i < j` are examined in increasing index order
/// and chains resolve transitively into the lowest surviving index:
/// if B already merged into A and C is close to B, C joins A's group.
/// This ordering is defined behavior that downstream grouping depends
/// on.
///
/// # Errors
///
/// Returns [`PipelineError::InvariantViolation`] if the label map and
/// palette disagree.
pub fn reduce_similar_colors(
    palette: &Palette,
    labels: &LabelMap,
    threshold: f64,
) -> Result<(Palette, LabelMap), PipelineError> {
    labels.validate(palette)?;
    let n = palette.len();
    let mut groups: UnionFind<usize> = UnionFind::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if palette.colors()[i].distance(palette.colors()[j]) < threshold {
                groups.union(i, j);
            }
        }
    }
    merge_groups(palette, labels, &mut groups)
}

/// Fraction of pixels assigned to each palette index that actually
/// appears in the label map, as percentages keyed by index.
///
/// Unused palette entries are absent from the result, which is how the
/// quality analyzer detects them.
#[must_use]
pub fn color_percentages(labels: &LabelMap) -> BTreeMap<usize, f64> {
    let mut counts: BTreeMap<usize, u64> = BTreeMap::new();
    for &label in labels.data() {
        *counts.entry(usize::from(label)).or_insert(0) += 1;
    }
    #[allow(clippy::cast_precision_loss)]
    let total = labels.data().len() as f64;
    counts
        .into_iter()
        .map(|(idx, count)| {
            #[allow(clippy::cast_precision_loss)]
            let pct = count as f64 / total * 100.0;
            (idx, pct)
        })
        .collect()
}

/// Collapse union-find groups into a new (palette, label map) pair.
///
/// Group representatives are renumbered in ascending order of their
/// smallest member index; each new color is the simple average of its
/// group's members.
pub(crate) fn merge_groups(
    palette: &Palette,
    labels: &LabelMap,
    groups: &mut UnionFind<usize>,
) -> Result<(Palette, LabelMap), PipelineError> {
    let n = palette.len();

    // Smallest member per root, in ascending order, defines the new
    // index assignment.
    let mut root_to_new: BTreeMap<usize, usize> = BTreeMap::new();
    let mut min_member: BTreeMap<usize, usize> = BTreeMap::new();
    for i in 0..n {
        let root = groups.find(i);
        min_member.entry(root).or_insert(i);
    }
    let mut ordered: Vec<(usize, usize)> =
        min_member.iter().map(|(&root, &min)| (min, root)).collect();
    ordered.sort_unstable();
    for (new_idx, (_, root)) in ordered.iter().enumerate() {
        root_to_new.insert(*root, new_idx);
    }

    // Average each group's colors.
    let mut sums = vec![[0.0f64; 3]; root_to_new.len()];
    let mut member_counts = vec![0u32; root_to_new.len()];
    let mut remap = vec![0u8; n];
    for i in 0..n {
        let new_idx = root_to_new[&groups.find(i)];
        remap[i] = u8::try_from(new_idx).unwrap_or(u8::MAX);
        let c = palette.colors()[i];
        sums[new_idx][0] += f64::from(c.r);
        sums[new_idx][1] += f64::from(c.g);
        sums[new_idx][2] += f64::from(c.b);
        member_counts[new_idx] += 1;
    }
    let merged: Vec<Rgb> = sums
        .iter()
        .zip(&member_counts)
        .map(|(sum, &count)| {
            let count = f64::from(count.max(1));
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Rgb::new(
                (sum[0] / count).round().clamp(0.0, 255.0) as u8,
                (sum[1] / count).round().clamp(0.0, 255.0) as u8,
                (sum[2] / count).round().clamp(0.0, 255.0) as u8,
            )
        })
        .collect();

    let remapped = labels.remapped(&remap)?;
    Ok((Palette::new(merged), remapped))
}

// ───────────────────────── k-means internals ──────────────────────────

fn cluster(
    image: &RgbImage,
    k: u32,
    space: ColorSpace,
    sample_fraction: f32,
    seed: u64,
) -> Result<Quantized, PipelineError> {
    let features: Vec<[f32; 3]> = image
        .pixels()
        .map(|p| space.features(Rgb::from(*p)))
        .collect();

    // Deterministic stride subsampling for center fitting; assignment
    // below still covers every pixel.
    let fraction = sample_fraction.clamp(0.01, 1.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let stride = (1.0 / fraction).round().max(1.0) as usize;
    let samples: Vec<[f32; 3]> = features.iter().copied().step_by(stride).collect();

    let k = usize::try_from(k).unwrap_or(usize::from(u8::MAX));
    let centers = kmeans(&samples, k, seed);

    let data: Vec<u8> = features
        .iter()
        .map(|&f| nearest_center(&centers, f))
        .collect();
    let labels = LabelMap::from_raw(image.width(), image.height(), data)?;
    let palette = Palette::new(centers.iter().map(|&c| space.to_rgb(c)).collect());
    labels.validate(&palette)?;
    Ok(Quantized { palette, labels })
}

/// Index of the nearest center, ties broken toward the lower index.
fn nearest_center(centers: &[[f32; 3]], f: [f32; 3]) -> u8 {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (i, &c) in centers.iter().enumerate() {
        let d = feature_distance_squared(c, f);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    u8::try_from(best).unwrap_or(u8::MAX)
}

/// k-means++ initialization followed by Lloyd iteration, or mini-batch
/// updates when the sample set is large. Fully deterministic for a
/// given seed.
fn kmeans(samples: &[[f32; 3]], k: usize, seed: u64) -> Vec<[f32; 3]> {
    if samples.is_empty() {
        return vec![[0.0; 3]; k];
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centers = plus_plus_init(samples, k, &mut rng);

    if samples.len() > MINI_BATCH_THRESHOLD {
        mini_batch_iterate(samples, &mut centers, &mut rng);
    } else {
        lloyd_iterate(samples, &mut centers, &mut rng);
    }
    centers
}

fn plus_plus_init(samples: &[[f32; 3]], k: usize, rng: &mut StdRng) -> Vec<[f32; 3]> {
    let mut centers = Vec::with_capacity(k);
    centers.push(samples[rng.gen_range(0..samples.len())]);

    let mut dist_sq: Vec<f32> = samples
        .iter()
        .map(|&s| feature_distance_squared(s, centers[0]))
        .collect();

    while centers.len() < k {
        let total: f64 = dist_sq.iter().map(|&d| f64::from(d)).sum();
        let next = if total <= f64::EPSILON {
            // All remaining samples coincide with a center; any pick
            // works and keeps the palette at the requested size.
            rng.gen_range(0..samples.len())
        } else {
            let mut target = rng.gen_range(0.0..total);
            let mut picked = samples.len() - 1;
            for (i, &d) in dist_sq.iter().enumerate() {
                target -= f64::from(d);
                if target <= 0.0 {
                    picked = i;
                    break;
                }
            }
            picked
        };
        let center = samples[next];
        centers.push(center);
        for (d, &s) in dist_sq.iter_mut().zip(samples) {
            *d = d.min(feature_distance_squared(s, center));
        }
    }
    centers
}

fn lloyd_iterate(samples: &[[f32; 3]], centers: &mut [[f32; 3]], rng: &mut StdRng) {
    for _ in 0..MAX_ITERATIONS {
        let mut sums = vec![[0.0f64; 3]; centers.len()];
        let mut counts = vec![0u64; centers.len()];
        for &s in samples {
            let idx = usize::from(nearest_center(centers, s));
            for c in 0..3 {
                sums[idx][c] += f64::from(s[c]);
            }
            counts[idx] += 1;
        }

        let mut movement = 0.0f32;
        for (i, center) in centers.iter_mut().enumerate() {
            if counts[i] == 0 {
                // Empty cluster: reseed from a random sample.
                *center = samples[rng.gen_range(0..samples.len())];
                continue;
            }
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let updated: [f32; 3] =
                std::array::from_fn(|c| (sums[i][c] / counts[i] as f64) as f32);
            movement = movement.max(feature_distance_squared(*center, updated));
            *center = updated;
        }
        if movement < CONVERGENCE_EPSILON {
            break;
        }
    }
}

fn mini_batch_iterate(samples: &[[f32; 3]], centers: &mut [[f32; 3]], rng: &mut StdRng) {
    let mut counts = vec![0u64; centers.len()];
    for _ in 0..MINI_BATCH_ITERATIONS {
        for _ in 0..MINI_BATCH_SIZE {
            let s = samples[rng.gen_range(0..samples.len())];
            let idx = usize::from(nearest_center(centers, s));
            counts[idx] += 1;
            // Per-center decaying learning rate (MacQueen update).
            #[allow(clippy::cast_precision_loss)]
            let eta = 1.0 / counts[idx] as f32;
            for c in 0..3 {
                centers[idx][c] += eta * (s[c] - centers[idx][c]);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb(rgb))
    }

    fn half_and_half(w: u32, h: u32, left: [u8; 3], right: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| {
            if x < w / 2 {
                image::Rgb(left)
            } else {
                image::Rgb(right)
            }
        })
    }

    fn clustering(n_colors: u32) -> QuantizeMode {
        QuantizeMode::Clustering {
            n_colors,
            color_space: ColorSpace::Lab,
            sample_fraction: 1.0,
            seed: 7,
            sort_by_luminance: true,
        }
    }

    #[test]
    fn solid_image_uses_one_color() {
        let img = solid(100, 100, [255, 0, 0]);
        let q = quantize(&img, &clustering(5)).unwrap();

        let percentages = color_percentages(&q.labels);
        assert_eq!(
            percentages.len(),
            1,
            "expected exactly one used color, got {percentages:?}",
        );
        let (&idx, &pct) = percentages.iter().next().unwrap();
        assert!((pct - 100.0).abs() < 1e-9, "expected 100%, got {pct}");
        let c = q.palette.get(idx).unwrap();
        assert!(
            c.r > 200 && c.g < 50 && c.b < 50,
            "expected the used color to be red, got {c:?}",
        );
    }

    #[test]
    fn two_color_image_separates_cleanly() {
        let img = half_and_half(20, 10, [0, 0, 0], [255, 255, 255]);
        let q = quantize(&img, &clustering(2)).unwrap();
        assert_eq!(q.palette.len(), 2);

        // Luminance sort puts the dark cluster first.
        assert!(q.palette.colors()[0].luminance() < q.palette.colors()[1].luminance());
        assert_eq!(q.labels.get(0, 0), 0, "left half should use the dark color");
        assert_eq!(q.labels.get(19, 0), 1, "right half should use the light color");
    }

    #[test]
    fn n_colors_clamped_to_minimum() {
        let img = half_and_half(10, 10, [0, 0, 0], [255, 255, 255]);
        let q = quantize(
            &img,
            &QuantizeMode::Clustering {
                n_colors: 0,
                color_space: ColorSpace::Rgb,
                sample_fraction: 1.0,
                seed: 1,
                sort_by_luminance: false,
            },
        )
        .unwrap();
        assert_eq!(q.palette.len(), MIN_COLORS as usize);
    }

    #[test]
    fn quantize_is_deterministic() {
        let img = RgbImage::from_fn(40, 40, |x, y| {
            image::Rgb([
                u8::try_from((x * 6) % 256).unwrap(),
                u8::try_from((y * 6) % 256).unwrap(),
                u8::try_from((x * y) % 256).unwrap(),
            ])
        });
        let mode = clustering(8);
        let a = quantize(&img, &mode).unwrap();
        let b = quantize(&img, &mode).unwrap();
        assert_eq!(a.palette, b.palette, "palette must be byte-identical across runs");
        assert_eq!(a.labels, b.labels, "labels must be byte-identical across runs");
    }

    #[test]
    fn labels_always_valid_for_palette() {
        let img = RgbImage::from_fn(30, 30, |x, y| {
            image::Rgb([
                u8::try_from((x * 8) % 256).unwrap(),
                u8::try_from((y * 8) % 256).unwrap(),
                100,
            ])
        });
        for mode in [
            clustering(4),
            QuantizeMode::Unified {
                palette_name: "classic-24".to_string(),
                color_space: ColorSpace::Lab,
            },
        ] {
            let q = quantize(&img, &mode).unwrap();
            q.labels.validate(&q.palette).unwrap();
        }
    }

    #[test]
    fn unified_unknown_palette_is_config_error() {
        let img = solid(10, 10, [1, 2, 3]);
        let result = quantize(
            &img,
            &QuantizeMode::Unified {
                palette_name: "missing".to_string(),
                color_space: ColorSpace::Lab,
            },
        );
        assert!(matches!(result, Err(PipelineError::UnknownPalette(_))));
    }

    #[test]
    fn unified_bw_maps_halves_to_two_labels() {
        let img = half_and_half(10, 10, [0, 0, 0], [255, 255, 255]);
        let q = quantize(
            &img,
            &QuantizeMode::Unified {
                palette_name: "bw".to_string(),
                color_space: ColorSpace::Lab,
            },
        )
        .unwrap();
        for (x, _, label) in q.labels.enumerate() {
            let expected = u8::from(x >= 5);
            assert_eq!(label, expected, "pixel column {x} mapped to label {label}");
        }
        assert_eq!(color_percentages(&q.labels).len(), 2);
    }

    #[test]
    fn reduce_similar_colors_merges_black_and_white_at_large_threshold() {
        // 450 exceeds the black-white RGB distance (~441.7), so the
        // two entries must collapse into one.
        let img = half_and_half(10, 10, [0, 0, 0], [255, 255, 255]);
        let q = quantize(
            &img,
            &QuantizeMode::Unified {
                palette_name: "bw".to_string(),
                color_space: ColorSpace::Lab,
            },
        )
        .unwrap();
        let (palette, labels) = reduce_similar_colors(&q.palette, &q.labels, 450.0).unwrap();
        assert_eq!(palette.len(), 1, "expected black and white to merge");
        let c = palette.get(0).unwrap();
        assert_eq!(
            (c.r, c.g, c.b),
            (128, 128, 128),
            "merged color should be the simple average of black and white",
        );
        assert!(labels.data().iter().all(|&l| l == 0));
    }

    #[test]
    fn reduce_similar_colors_below_threshold_is_identity() {
        let palette = Palette::new(vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)]);
        let labels = LabelMap::from_raw(2, 1, vec![0, 1]).unwrap();
        let (merged, remapped) = reduce_similar_colors(&palette, &labels, 100.0).unwrap();
        assert_eq!(merged, palette);
        assert_eq!(remapped, labels);
    }

    #[test]
    fn reduce_similar_colors_resolves_chains_to_lowest_index() {
        // 0 and 1 are close; 1 and 2 are close; 0 and 2 are not.
        // All three must land in one group rooted at index 0.
        let palette = Palette::new(vec![
            Rgb::new(0, 0, 0),
            Rgb::new(40, 40, 40),
            Rgb::new(80, 80, 80),
            Rgb::new(255, 0, 0),
        ]);
        let labels = LabelMap::from_raw(4, 1, vec![0, 1, 2, 3]).unwrap();
        let (merged, remapped) = reduce_similar_colors(&palette, &labels, 80.0).unwrap();
        assert_eq!(merged.len(), 2, "expected chain {{0,1,2}} + {{3}}");
        assert_eq!(remapped.data(), &[0, 0, 0, 1]);
        // Group color is the simple average of the three members.
        assert_eq!(merged.get(0), Some(Rgb::new(40, 40, 40)));
        assert_eq!(merged.get(1), Some(Rgb::new(255, 0, 0)));
    }

    #[test]
    fn sort_by_luminance_orders_dark_to_light() {
        let palette = Palette::new(vec![
            Rgb::new(255, 255, 255),
            Rgb::new(0, 0, 0),
            Rgb::new(128, 128, 128),
        ]);
        let labels = LabelMap::from_raw(3, 1, vec![0, 1, 2]).unwrap();
        let (sorted, remapped) = sort_by_luminance(&palette, &labels).unwrap();
        assert_eq!(
            sorted.colors(),
            &[Rgb::new(0, 0, 0), Rgb::new(128, 128, 128), Rgb::new(255, 255, 255)],
        );
        // White pixel now labeled 2, black 0, gray 1.
        assert_eq!(remapped.data(), &[2, 0, 1]);
    }

    #[test]
    fn sort_by_luminance_is_idempotent() {
        let palette = Palette::new(vec![
            Rgb::new(200, 10, 10),
            Rgb::new(10, 200, 10),
            Rgb::new(10, 10, 200),
        ]);
        let labels = LabelMap::from_raw(3, 1, vec![0, 1, 2]).unwrap();
        let (once_p, once_l) = sort_by_luminance(&palette, &labels).unwrap();
        let (twice_p, twice_l) = sort_by_luminance(&once_p, &once_l).unwrap();
        assert_eq!(once_p, twice_p, "second sort must be a no-op");
        assert_eq!(once_l, twice_l, "second sort must not remap labels");
    }

    #[test]
    fn apply_palette_empty_palette_fails() {
        let img = solid(4, 4, [1, 2, 3]);
        let result = apply_palette(&img, &Palette::new(vec![]), ColorSpace::Rgb);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn apply_palette_nearest_in_rgb() {
        let palette = Palette::new(vec![Rgb::new(0, 0, 0), Rgb::new(255, 0, 0)]);
        let img = half_and_half(4, 2, [20, 10, 10], [240, 20, 20]);
        let labels = apply_palette(&img, &palette, ColorSpace::Rgb).unwrap();
        assert_eq!(labels.data(), &[0, 0, 1, 1, 0, 0, 1, 1]);
    }

    #[test]
    fn quantized_to_image_uses_palette_colors() {
        let q = Quantized {
            palette: Palette::new(vec![Rgb::new(10, 20, 30), Rgb::new(200, 100, 50)]),
            labels: LabelMap::from_raw(2, 1, vec![0, 1]).unwrap(),
        };
        let img = q.to_image();
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(img.get_pixel(1, 0).0, [200, 100, 50]);
    }

    #[test]
    fn color_percentages_sum_to_hundred() {
        let labels = LabelMap::from_raw(4, 1, vec![0, 0, 1, 2]).unwrap();
        let percentages = color_percentages(&labels);
        let sum: f64 = percentages.values().sum();
        assert!((sum - 100.0).abs() < 1e-9, "percentages should sum to 100, got {sum}");
        assert!((percentages[&0] - 50.0).abs() < 1e-9);
        assert!((percentages[&1] - 25.0).abs() < 1e-9);
    }
}
