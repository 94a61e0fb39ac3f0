//! paintnum-pipeline: Pure paint-by-numbers generation (sans-IO).
//!
//! Converts photographs into paint-by-numbers templates through:
//! preprocess -> quantize -> artistic simplification -> region
//! detection -> outline rendering -> number placement.
//!
//! This crate has **no I/O dependencies** beyond reading the input
//! image — it operates on in-memory images and returns structured
//! data. Template/legend/SVG/PDF rendering and persistence live in
//! external consumers, which serialize the [`ProcessResult`] entities
//! (palette, label map, regions with contours and number positions)
//! without loss.

pub mod analyze;
pub mod color;
pub mod distance;
pub mod outline;
pub mod palettes;
pub mod pipeline;
pub mod place;
pub mod pole;
pub mod preprocess;
pub mod quantize;
pub mod regions;
pub mod simplify;
pub mod subject;
pub mod types;

pub use analyze::QualityReport;
pub use color::ColorSpace;
pub use outline::OutlineOptions;
pub use pipeline::Pipeline;
pub use place::{PlacementMode, PlacementOptions};
pub use preprocess::{LoadLimits, PreprocessOptions};
pub use quantize::{QuantizeMode, Quantized};
pub use subject::{SubjectKind, SubjectOptions, SubjectRegion};
pub use types::{
    Dimensions, LabelMap, Palette, PipelineConfig, PipelineError, Point, ProcessResult, Region,
    Rgb,
};

use image::RgbImage;
use std::path::Path;

/// Run the full pipeline on a decoded image.
///
/// # Pipeline steps
///
/// 1. Preprocess: resize to working resolution, white balance, tone
///    balance, denoise, blur, bilateral smoothing, local contrast,
///    sharpen (each individually toggleable, order fixed)
/// 2. Quantize to a palette (k-means clustering or unified palette)
/// 3. Optional artistic simplification (merge perceptually close
///    colors)
/// 4. Region detection with morphological cleanup, optional
///    nearby-region merge, and minimum-size filtering
/// 5. Outline rendering
/// 6. Number placement with spacing enforcement
///
/// # Errors
///
/// Returns [`PipelineError::UnknownPalette`] or
/// [`PipelineError::InvalidConfig`] for bad configuration,
/// [`PipelineError::NoRegions`] when nothing paintable survives
/// filtering, and [`PipelineError::InvariantViolation`] only on an
/// internal consistency defect.
pub fn process(image: &RgbImage, config: &PipelineConfig) -> Result<ProcessResult, PipelineError> {
    let result = Pipeline::from_image(image.clone(), config.clone())
        .preprocess()
        .quantize()?
        .simplify()?
        .detect_regions()?
        .render_outline()
        .place_numbers()
        .into_result();
    Ok(result)
}

/// Run the full pipeline on encoded image bytes (PNG, JPEG, BMP,
/// WebP).
///
/// # Errors
///
/// Everything [`process`] reports, plus [`PipelineError::EmptyInput`],
/// [`PipelineError::ImageDecode`], [`PipelineError::ImageTooSmall`],
/// and [`PipelineError::ImageTooLarge`] from decoding.
pub fn process_bytes(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<ProcessResult, PipelineError> {
    let image = preprocess::decode(image_bytes, &LoadLimits::default())?;
    process(&image, config)
}

/// Run the full pipeline on an image file.
///
/// # Errors
///
/// Everything [`process_bytes`] reports, plus
/// [`PipelineError::NotFound`], [`PipelineError::Io`], and
/// [`PipelineError::FileTooLarge`] from loading.
pub fn process_path(
    path: &Path,
    config: &PipelineConfig,
) -> Result<ProcessResult, PipelineError> {
    let image = preprocess::load(path, &LoadLimits::default())?;
    process(&image, config)
}

/// Run the multi-region pipeline variant: the subject window gets more
/// of the color budget and a smaller minimum region size, so the
/// subject keeps detail while the background stays simple.
///
/// The subject box is taken at the input image's resolution and
/// follows the preprocessing resize automatically. Only clustering
/// quantization splits the budget; unified-palette mode runs
/// unchanged.
///
/// # Errors
///
/// Everything [`process`] reports, plus
/// [`PipelineError::InvalidConfig`] when the subject box lies outside
/// the image.
pub fn process_with_subject(
    image: &RgbImage,
    subject: &SubjectRegion,
    config: &PipelineConfig,
    subject_options: &SubjectOptions,
) -> Result<ProcessResult, PipelineError> {
    let working = preprocess::preprocess(image, &config.preprocess);
    let dimensions = Dimensions::new(working.width(), working.height());
    let scaled = SubjectRegion {
        bbox: subject.bbox.scaled(
            Dimensions::new(image.width(), image.height()),
            dimensions,
        ),
        ..*subject
    };

    let quantized =
        subject::quantize_with_subject(&working, &scaled, &config.quantize, subject_options)?;
    let (palette, labels) = match config.artistic_threshold {
        Some(threshold) => {
            simplify::apply_artistic_simplification(&quantized.palette, &quantized.labels, threshold)?
        }
        None => (quantized.palette, quantized.labels),
    };

    // Detect at the subject's (smaller) minimum size, then hold
    // background regions to the full threshold. A region counts as
    // subject when its interior center falls inside the window.
    let subject_min = subject_options.subject_min_region_size(config.min_region_size);
    let (mut regions, cleaned) = regions::detect_regions(
        &labels,
        &palette,
        regions::RegionOptions {
            min_region_size: subject_min,
            morphology_kernel_size: config.morphology_kernel_size,
        },
    )?;
    if let Some(distance) = config.merge_distance {
        regions = regions::merge_nearby_regions(&regions, dimensions, distance, subject_min);
    }
    let window = scaled.bbox.clamped(dimensions);
    regions.retain(|r| {
        r.area >= config.min_region_size
            || window.is_some_and(|w| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let (cx, cy) = (
                    r.center.x.round().max(0.0) as u32,
                    r.center.y.round().max(0.0) as u32,
                );
                w.contains(cx, cy)
            })
    });
    if regions.is_empty() {
        return Err(PipelineError::NoRegions);
    }
    for region in &regions {
        region.validate(&cleaned)?;
    }

    let outline = outline::render_outline(&regions, dimensions, &config.outline);
    place::place_numbers(&mut regions, &config.placement);
    let report = analyze::analyze(&palette, &cleaned, &regions, dimensions);
    Ok(ProcessResult {
        palette,
        labels: cleaned,
        regions,
        outline,
        dimensions,
        report,
    })
}
