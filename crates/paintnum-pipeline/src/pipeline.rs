//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process`] which runs everything in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use paintnum_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let result = Pipeline::new(png, config)
//!     .decode()?
//!     .preprocess()
//!     .quantize()?
//!     .simplify()?
//!     .detect_regions()?
//!     .render_outline()
//!     .place_numbers()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline
//! state (or `Result` for fallible stages), making it a compile-time
//! error to skip stages or run them out of order. Callers treating a
//! run as a cancellable background task get a natural cancellation
//! point at every stage boundary; mid-stage cancellation (stopping
//! k-means halfway) is deliberately not offered.
//!
//! # Memory
//!
//! Every stage retains the preprocessed working image alongside the
//! growing palette/label/region data, so intermediates stay
//! inspectable until [`Numbered::into_result`] consumes the final
//! stage.

use image::{RgbImage, RgbaImage};

use crate::analyze;
use crate::outline::render_outline;
use crate::place::place_numbers;
use crate::preprocess::LoadLimits;
use crate::regions::{RegionOptions, detect_regions, merge_nearby_regions};
use crate::simplify::apply_artistic_simplification;
use crate::types::{
    Dimensions, LabelMap, Palette, PipelineConfig, PipelineError, ProcessResult, Region,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The source image bytes and config are stored but not yet touched.
/// Call [`decode`](Self::decode) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .decode() to continue"]
pub struct Pending {
    config: PipelineConfig,
    limits: LoadLimits,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Decode the source image and advance to the [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] for empty bytes,
    /// [`PipelineError::ImageDecode`] for unrecognized or corrupt data,
    /// and [`PipelineError::ImageTooSmall`] /
    /// [`PipelineError::ImageTooLarge`] for out-of-bounds dimensions.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        let image = crate::preprocess::decode(&self.source, &self.limits)?;
        Ok(Decoded {
            config: self.config,
            image,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state after decoding the source image.
///
/// Call [`preprocess`](Self::preprocess) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .preprocess() to continue"]
pub struct Decoded {
    config: PipelineConfig,
    image: RgbImage,
}

impl Decoded {
    /// The decoded image at original resolution.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.image
    }

    /// Advance to the preprocessing stage: resize to working
    /// resolution, then the enabled color-correction and smoothing
    /// steps in their fixed order.
    pub fn preprocess(self) -> Preprocessed {
        let working = crate::preprocess::preprocess(&self.image, &self.config.preprocess);
        let dimensions = Dimensions::new(working.width(), working.height());
        Preprocessed {
            config: self.config,
            working,
            dimensions,
        }
    }
}

// ───────────────────────── Stage 2: Preprocessed ─────────────────────

/// Pipeline state after preprocessing.
///
/// Call [`quantize`](Self::quantize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .quantize() to continue"]
pub struct Preprocessed {
    config: PipelineConfig,
    working: RgbImage,
    dimensions: Dimensions,
}

impl Preprocessed {
    /// The preprocessed working image.
    #[must_use]
    pub const fn working(&self) -> &RgbImage {
        &self.working
    }

    /// Working-image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Advance to the quantization stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownPalette`] for an unknown unified
    /// palette name and [`PipelineError::InvalidConfig`] for a bad
    /// clustering configuration.
    pub fn quantize(self) -> Result<Labeled, PipelineError> {
        let quantized = crate::quantize::quantize(&self.working, &self.config.quantize)?;
        Ok(Labeled {
            config: self.config,
            working: self.working,
            palette: quantized.palette,
            labels: quantized.labels,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 3: Labeled ──────────────────────────

/// Pipeline state after quantization: a palette and a consistent label
/// map.
///
/// Call [`simplify`](Self::simplify) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .simplify() to continue"]
pub struct Labeled {
    config: PipelineConfig,
    working: RgbImage,
    palette: Palette,
    labels: LabelMap,
    dimensions: Dimensions,
}

impl Labeled {
    /// The quantization palette, in paint-number order.
    #[must_use]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The per-pixel palette assignment.
    #[must_use]
    pub const fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Advance to the artistic simplification stage.
    ///
    /// A pass-through when `config.artistic_threshold` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvariantViolation`] only on internal
    /// palette/label inconsistency.
    pub fn simplify(self) -> Result<Simplified, PipelineError> {
        let (palette, labels) = match self.config.artistic_threshold {
            Some(threshold) => {
                apply_artistic_simplification(&self.palette, &self.labels, threshold)?
            }
            None => (self.palette, self.labels),
        };
        Ok(Simplified {
            config: self.config,
            working: self.working,
            palette,
            labels,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 4: Simplified ───────────────────────

/// Pipeline state after optional artistic simplification.
///
/// Call [`detect_regions`](Self::detect_regions) to advance. This is a
/// fallible step — it returns `Err` if no paintable region survives
/// filtering.
#[must_use = "pipeline stages are consumed by advancing — call .detect_regions() to continue"]
pub struct Simplified {
    config: PipelineConfig,
    working: RgbImage,
    palette: Palette,
    labels: LabelMap,
    dimensions: Dimensions,
}

impl Simplified {
    /// The possibly-reduced palette.
    #[must_use]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The remapped label map.
    #[must_use]
    pub const fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Advance to the region detection stage: morphological cleanup,
    /// contour extraction, the optional nearby-region merge, and size
    /// filtering.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoRegions`] when nothing paintable
    /// survives, [`PipelineError::InvariantViolation`] on internal
    /// inconsistency.
    pub fn detect_regions(self) -> Result<RegionsDetected, PipelineError> {
        let options = RegionOptions {
            min_region_size: self.config.min_region_size,
            morphology_kernel_size: self.config.morphology_kernel_size,
        };
        let (mut regions, cleaned) = detect_regions(&self.labels, &self.palette, options)?;
        if let Some(distance) = self.config.merge_distance {
            regions = merge_nearby_regions(
                &regions,
                self.dimensions,
                distance,
                self.config.min_region_size,
            );
        }
        if regions.is_empty() {
            return Err(PipelineError::NoRegions);
        }
        for region in &regions {
            region.validate(&cleaned)?;
        }
        Ok(RegionsDetected {
            config: self.config,
            working: self.working,
            palette: self.palette,
            labels: cleaned,
            regions,
            dimensions: self.dimensions,
        })
    }
}

// ───────────────────────── Stage 5: RegionsDetected ──────────────────

/// Pipeline state after region detection.
///
/// Call [`render_outline`](Self::render_outline) to advance.
#[must_use = "pipeline stages are consumed by advancing — call .render_outline() to continue"]
pub struct RegionsDetected {
    config: PipelineConfig,
    working: RgbImage,
    palette: Palette,
    labels: LabelMap,
    regions: Vec<Region>,
    dimensions: Dimensions,
}

impl RegionsDetected {
    /// The detected regions, in detection order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The cleaned label map the regions are consistent with.
    #[must_use]
    pub const fn labels(&self) -> &LabelMap {
        &self.labels
    }

    /// Advance to the outline rendering stage.
    pub fn render_outline(self) -> Outlined {
        let outline = render_outline(&self.regions, self.dimensions, &self.config.outline);
        Outlined {
            config: self.config,
            working: self.working,
            palette: self.palette,
            labels: self.labels,
            regions: self.regions,
            outline,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 6: Outlined ─────────────────────────

/// Pipeline state after outline rendering.
///
/// Call [`place_numbers`](Self::place_numbers) to advance to the final
/// stage.
#[must_use = "pipeline stages are consumed by advancing — call .place_numbers() to continue"]
pub struct Outlined {
    config: PipelineConfig,
    working: RgbImage,
    palette: Palette,
    labels: LabelMap,
    regions: Vec<Region>,
    outline: RgbaImage,
    dimensions: Dimensions,
}

impl Outlined {
    /// The anti-aliased outline raster.
    #[must_use]
    pub const fn outline(&self) -> &RgbaImage {
        &self.outline
    }

    /// Advance to the number placement stage — the final pipeline step.
    pub fn place_numbers(mut self) -> Numbered {
        place_numbers(&mut self.regions, &self.config.placement);
        Numbered {
            working: self.working,
            palette: self.palette,
            labels: self.labels,
            regions: self.regions,
            outline: self.outline,
            dimensions: self.dimensions,
        }
    }
}

// ───────────────────────── Stage 7: Numbered ─────────────────────────

/// Pipeline state after number placement — the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`ProcessResult`].
#[must_use = "call .into_result() to extract the ProcessResult"]
pub struct Numbered {
    working: RgbImage,
    palette: Palette,
    labels: LabelMap,
    regions: Vec<Region>,
    outline: RgbaImage,
    dimensions: Dimensions,
}

impl Numbered {
    /// The regions with their assigned number positions.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// The preprocessed working image.
    #[must_use]
    pub const fn working(&self) -> &RgbImage {
        &self.working
    }

    /// Consume the pipeline and return the final [`ProcessResult`],
    /// including the quality report.
    #[must_use]
    pub fn into_result(self) -> ProcessResult {
        let report = analyze::analyze(&self.palette, &self.labels, &self.regions, self.dimensions);
        ProcessResult {
            palette: self.palette,
            labels: self.labels,
            regions: self.regions,
            outline: self.outline,
            dimensions: self.dimensions,
            report,
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental paint-by-numbers pipeline.
///
/// Created via [`Pipeline::new`], which stores the source image and
/// config without doing any processing. The caller then chains stage
/// methods to advance; each consumes the current state and returns the
/// next, so skipping or reordering stages does not compile.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from source image bytes and config.
    ///
    /// No processing is performed — the bytes and config are simply
    /// stored. Call [`.decode()`](Pending::decode) to begin.
    #[allow(clippy::new_ret_no_self)]
    #[must_use]
    pub fn new(image_bytes: Vec<u8>, config: PipelineConfig) -> Pending {
        Self::with_limits(image_bytes, config, LoadLimits::default())
    }

    /// Like [`Pipeline::new`] with explicit input size limits.
    #[must_use]
    pub const fn with_limits(
        image_bytes: Vec<u8>,
        config: PipelineConfig,
        limits: LoadLimits,
    ) -> Pending {
        Pending {
            config,
            limits,
            source: image_bytes,
        }
    }

    /// Start from an already-decoded image, skipping the decode stage
    /// and its size checks.
    #[must_use]
    pub const fn from_image(image: RgbImage, config: PipelineConfig) -> Decoded {
        Decoded { config, image }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::color::ColorSpace;
    use crate::quantize::QuantizeMode;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            quantize: QuantizeMode::Clustering {
                n_colors: 4,
                color_space: ColorSpace::Rgb,
                sample_fraction: 1.0,
                seed: 11,
                sort_by_luminance: true,
            },
            min_region_size: 20,
            merge_distance: None,
            ..PipelineConfig::default()
        }
    }

    /// 40x40, left half dark red, right half light blue.
    fn halves() -> RgbImage {
        RgbImage::from_fn(40, 40, |x, _| {
            if x < 20 {
                image::Rgb([150, 20, 20])
            } else {
                image::Rgb([90, 90, 220])
            }
        })
    }

    #[test]
    fn decode_rejects_empty_input() {
        let result = Pipeline::new(Vec::new(), PipelineConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn decode_rejects_corrupt_input() {
        let result = Pipeline::new(vec![0xFF, 0x00], PipelineConfig::default()).decode();
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn staged_run_produces_complete_result() {
        let result = Pipeline::from_image(halves(), test_config())
            .preprocess()
            .quantize()
            .unwrap()
            .simplify()
            .unwrap()
            .detect_regions()
            .unwrap()
            .render_outline()
            .place_numbers()
            .into_result();

        result.labels.validate(&result.palette).unwrap();
        assert!(!result.regions.is_empty());
        for region in &result.regions {
            region.validate(&result.labels).unwrap();
            assert!(region.number_position.is_some());
        }
        assert_eq!(
            (result.outline.width(), result.outline.height()),
            (result.dimensions.width, result.dimensions.height),
        );
        assert_eq!(result.report.n_regions, result.regions.len());
    }

    #[test]
    fn intermediates_are_inspectable() {
        let preprocessed = Pipeline::from_image(halves(), test_config()).preprocess();
        let dims = preprocessed.dimensions();
        assert_eq!(dims, Dimensions::new(40, 40));

        let labeled = preprocessed.quantize().unwrap();
        assert!(!labeled.palette().is_empty());
        assert_eq!(labeled.labels().dimensions(), dims);
    }

    #[test]
    fn detect_regions_reports_no_regions() {
        let config = PipelineConfig {
            min_region_size: 10_000,
            ..test_config()
        };
        let result = Pipeline::from_image(halves(), config)
            .preprocess()
            .quantize()
            .unwrap()
            .simplify()
            .unwrap()
            .detect_regions();
        assert!(matches!(result, Err(PipelineError::NoRegions)));
    }
}
