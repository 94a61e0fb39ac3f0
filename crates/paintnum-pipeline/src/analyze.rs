//! Read-only diagnostics over the finished region/palette/label data.
//!
//! Everything here is a pure function of pipeline output; nothing
//! mutates the core entities. A degraded-but-successful run carries
//! its explanation in the report (for example which palette colors
//! ended up with no paintable region) instead of failing.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, LabelMap, Palette, Region};

/// Diagnostic summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Final palette size.
    pub n_colors: usize,

    /// Number of paintable regions.
    pub n_regions: usize,

    /// Palette indices that ended up with zero regions after
    /// filtering. Non-fatal by policy, but worth surfacing.
    pub unused_colors: Vec<usize>,

    /// Fraction of image pixels covered by some region mask, in
    /// `[0, 1]`. Filtering and morphology eat the rest.
    pub coverage: f64,

    /// Mean region area in pixels; 0 when there are no regions.
    pub mean_region_area: f64,

    /// Painting difficulty on a 1-10 scale, driven by region density
    /// and palette size.
    pub difficulty: f64,

    /// Human-readable degradation notes.
    pub warnings: Vec<String>,
}

impl QualityReport {
    /// One-paragraph human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut s = format!(
            "{} regions across {} colors, {:.1}% coverage, difficulty {:.1}/10",
            self.n_regions,
            self.n_colors,
            self.coverage * 100.0,
            self.difficulty,
        );
        for warning in &self.warnings {
            s.push_str("; ");
            s.push_str(warning);
        }
        s
    }
}

/// Coverage below which the report carries a warning.
const LOW_COVERAGE: f64 = 0.85;

/// Analyze a finished run.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn analyze(
    palette: &Palette,
    labels: &LabelMap,
    regions: &[Region],
    dimensions: Dimensions,
) -> QualityReport {
    debug_assert_eq!(labels.dimensions(), dimensions);

    let mut used = vec![false; palette.len()];
    let mut total_area: u64 = 0;
    for region in regions {
        if let Some(flag) = used.get_mut(region.color_idx) {
            *flag = true;
        }
        total_area += u64::from(region.area);
    }
    let unused_colors: Vec<usize> = used
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| (!u).then_some(i))
        .collect();

    let total_pixels = u64::from(dimensions.width) * u64::from(dimensions.height);
    let coverage = if total_pixels == 0 {
        0.0
    } else {
        total_area as f64 / total_pixels as f64
    };
    let mean_region_area = if regions.is_empty() {
        0.0
    } else {
        total_area as f64 / regions.len() as f64
    };

    let mut warnings = Vec::new();
    if !unused_colors.is_empty() {
        warnings.push(format!(
            "{} of {} palette colors unused",
            unused_colors.len(),
            palette.len(),
        ));
    }
    if coverage < LOW_COVERAGE && total_pixels > 0 {
        warnings.push(format!(
            "only {:.1}% of the image is paintable after filtering",
            coverage * 100.0,
        ));
    }

    QualityReport {
        n_colors: palette.len(),
        n_regions: regions.len(),
        unused_colors,
        coverage,
        mean_region_area,
        difficulty: difficulty_score(palette.len(), regions.len(), total_pixels),
        warnings,
    }
}

/// Painting difficulty in `[1, 10]`.
///
/// Region density dominates: many small regions take far longer to
/// paint than a few large ones. Palette size contributes a smaller
/// term because mixing and tracking more paints adds overhead even
/// when regions are big.
#[allow(clippy::cast_precision_loss)]
fn difficulty_score(n_colors: usize, n_regions: usize, total_pixels: u64) -> f64 {
    if total_pixels == 0 || n_regions == 0 {
        return 1.0;
    }
    let kilopixels = total_pixels as f64 / 1000.0;
    let density = n_regions as f64 / kilopixels;
    // ~0.5 regions per kilopixel is already a demanding template.
    let density_term = (density / 0.5).min(1.0) * 7.0;
    let color_term = (n_colors as f64 / 36.0).min(1.0) * 3.0;
    (1.0 + density_term + color_term).min(10.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Point, Rgb};
    use image::GrayImage;

    fn region(color_idx: usize, area: u32) -> Region {
        Region {
            color_idx,
            mask: GrayImage::new(1, 1),
            contour: Vec::new(),
            center: Point::new(0.0, 0.0),
            area,
            number_position: None,
        }
    }

    fn two_color_palette() -> Palette {
        Palette::new(vec![Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)])
    }

    #[test]
    fn unused_colors_are_reported() {
        let palette = Palette::new(vec![
            Rgb::new(0, 0, 0),
            Rgb::new(128, 128, 128),
            Rgb::new(255, 255, 255),
        ]);
        let labels = LabelMap::from_raw(10, 10, vec![0; 100]).unwrap();
        let regions = vec![region(0, 60), region(2, 30)];
        let report = analyze(&palette, &labels, &regions, Dimensions::new(10, 10));
        assert_eq!(report.unused_colors, vec![1]);
        assert!(
            report.warnings.iter().any(|w| w == "1 of 3 palette colors unused"),
            "warnings: {:?}",
            report.warnings,
        );
    }

    #[test]
    fn full_coverage_has_no_coverage_warning() {
        let palette = two_color_palette();
        let labels = LabelMap::from_raw(10, 10, vec![0; 100]).unwrap();
        let regions = vec![region(0, 50), region(1, 50)];
        let report = analyze(&palette, &labels, &regions, Dimensions::new(10, 10));
        assert!((report.coverage - 1.0).abs() < 1e-9);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn low_coverage_warns() {
        let palette = two_color_palette();
        let labels = LabelMap::from_raw(10, 10, vec![0; 100]).unwrap();
        let regions = vec![region(0, 40), region(1, 10)];
        let report = analyze(&palette, &labels, &regions, Dimensions::new(10, 10));
        assert!((report.coverage - 0.5).abs() < 1e-9);
        assert!(
            report.warnings.iter().any(|w| w.contains("paintable")),
            "warnings: {:?}",
            report.warnings,
        );
    }

    #[test]
    fn difficulty_grows_with_region_density() {
        let palette = two_color_palette();
        let labels = LabelMap::from_raw(100, 100, vec![0; 10_000]).unwrap();
        let dims = Dimensions::new(100, 100);
        let sparse: Vec<Region> = (0..2).map(|_| region(0, 5000)).collect();
        let dense: Vec<Region> = (0..40).map(|_| region(0, 250)).collect();
        let a = analyze(&palette, &labels, &sparse, dims).difficulty;
        let b = analyze(&palette, &labels, &dense, dims).difficulty;
        assert!(b > a, "dense {b} should exceed sparse {a}");
        assert!((1.0..=10.0).contains(&a) && (1.0..=10.0).contains(&b));
    }

    #[test]
    fn empty_region_set_is_trivial_difficulty() {
        let palette = two_color_palette();
        let labels = LabelMap::from_raw(4, 4, vec![0; 16]).unwrap();
        let report = analyze(&palette, &labels, &[], Dimensions::new(4, 4));
        assert!((report.difficulty - 1.0).abs() < f64::EPSILON);
        assert!((report.mean_region_area).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_mentions_warnings() {
        let palette = two_color_palette();
        let labels = LabelMap::from_raw(10, 10, vec![0; 100]).unwrap();
        let regions = vec![region(0, 100)];
        let report = analyze(&palette, &labels, &regions, Dimensions::new(10, 10));
        let summary = report.summary();
        assert!(summary.contains("1 regions"));
        assert!(summary.contains("unused"), "summary: {summary}");
    }
}
