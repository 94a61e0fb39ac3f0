//! Subject-aware color budgeting.
//!
//! A subject detector (face cascade, saliency model, or a plain
//! center-weighted fallback) supplies a bounding box of emphasis. The
//! multi-region quantization variant spends more of the color budget
//! inside that window and allows smaller paintable regions there, so
//! faces keep their detail while backgrounds stay simple. The detector
//! itself lives outside this crate; only its output is consumed here.

use image::RgbImage;
use image::imageops::crop_imm;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::quantize::{MIN_COLORS, Quantized, QuantizeMode, quantize, reduce_similar_colors, sort_by_luminance};
use crate::types::{Dimensions, LabelMap, Palette, PipelineError};

/// Where the subject window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    /// A face detector hit.
    Face,
    /// A saliency model hit.
    Salient,
    /// No detector fired; a centered window stands in.
    CenterFallback,
}

/// Axis-aligned pixel rectangle, top-left anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Intersect with the image frame. Returns `None` when nothing of
    /// the box lies inside.
    #[must_use]
    pub fn clamped(&self, dims: Dimensions) -> Option<Self> {
        if self.x >= dims.width || self.y >= dims.height {
            return None;
        }
        let width = self.width.min(dims.width - self.x);
        let height = self.height.min(dims.height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            x: self.x,
            y: self.y,
            width,
            height,
        })
    }

    /// Whether the pixel coordinate falls inside the box.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Rescale from one frame to another. Detectors report boxes at
    /// original resolution; preprocessing resizes the frame, so the
    /// box has to follow.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn scaled(&self, from: Dimensions, to: Dimensions) -> Self {
        if from == to || from.width == 0 || from.height == 0 {
            return *self;
        }
        let sx = f64::from(to.width) / f64::from(from.width);
        let sy = f64::from(to.height) / f64::from(from.height);
        Self {
            x: (f64::from(self.x) * sx).round() as u32,
            y: (f64::from(self.y) * sy).round() as u32,
            width: ((f64::from(self.width) * sx).round() as u32).max(1),
            height: ((f64::from(self.height) * sy).round() as u32).max(1),
        }
    }
}

/// A detected region of emphasis, as produced by an external subject
/// detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectRegion {
    pub bbox: BoundingBox,
    /// Detector confidence in `[0, 1]`; 0 for the center fallback.
    pub confidence: f32,
    pub kind: SubjectKind,
}

impl SubjectRegion {
    /// The window used when no detector fired: the centered half of
    /// the frame in each dimension.
    #[must_use]
    pub const fn center_fallback(dims: Dimensions) -> Self {
        let width = dims.width / 2;
        let height = dims.height / 2;
        Self {
            bbox: BoundingBox {
                x: (dims.width - width) / 2,
                y: (dims.height - height) / 2,
                width,
                height,
            },
            confidence: 0.0,
            kind: SubjectKind::CenterFallback,
        }
    }
}

/// Tuning for the subject/background split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectOptions {
    /// Fraction of the color budget spent on the subject window.
    pub emphasis: f32,

    /// The subject window's minimum region size is the base size
    /// divided by this.
    pub min_region_divisor: u32,

    /// RGB distance below which composed subject/background palette
    /// entries collapse into one. `None` keeps both palettes intact.
    pub merge_threshold: Option<f64>,
}

impl Default for SubjectOptions {
    fn default() -> Self {
        Self {
            emphasis: 0.6,
            min_region_divisor: 2,
            merge_threshold: Some(24.0),
        }
    }
}

impl SubjectOptions {
    /// Minimum region size inside the subject window for a given base
    /// size. Never drops below 1.
    #[must_use]
    pub const fn subject_min_region_size(&self, base: u32) -> u32 {
        let divided = base / if self.min_region_divisor == 0 { 1 } else { self.min_region_divisor };
        if divided == 0 { 1 } else { divided }
    }
}

/// Split a total color budget between subject and background.
///
/// Each side gets at least [`MIN_COLORS`], so the two shares can sum
/// to slightly more than the requested total for very small budgets.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn split_color_budget(n_colors: u32, emphasis: f32) -> (u32, u32) {
    let emphasis = emphasis.clamp(0.0, 1.0);
    let subject = ((n_colors as f32 * emphasis).round() as u32).max(MIN_COLORS);
    let background = n_colors.saturating_sub(subject).max(MIN_COLORS);
    (subject, background)
}

/// Quantize with separate color budgets for the subject window and the
/// background, composing one consistent palette and label map.
///
/// Subject colors take the low palette indices, so the subject's
/// paint numbers stay small. In unified-palette mode there is no
/// budget to split and the plain quantization runs unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] when the subject box lies
/// entirely outside the image, plus anything [`quantize`] reports.
pub fn quantize_with_subject(
    image: &RgbImage,
    subject: &SubjectRegion,
    mode: &QuantizeMode,
    options: &SubjectOptions,
) -> Result<Quantized, PipelineError> {
    let QuantizeMode::Clustering {
        n_colors,
        color_space,
        sample_fraction,
        seed,
        sort_by_luminance: sort,
    } = mode
    else {
        return quantize(image, mode);
    };

    let dims = Dimensions::new(image.width(), image.height());
    let bbox = subject.bbox.clamped(dims).ok_or_else(|| {
        PipelineError::InvalidConfig(format!(
            "subject box {:?} lies outside the {}x{} image",
            subject.bbox, dims.width, dims.height,
        ))
    })?;

    let (subject_colors, background_colors) = split_color_budget(*n_colors, options.emphasis);
    debug!(
        kind = ?subject.kind,
        confidence = subject.confidence,
        subject_colors,
        background_colors,
        "splitting color budget around subject window",
    );

    // Sorting happens once, after composition; the sub-quantizations
    // keep raw cluster order.
    let sub_mode = |colors: u32| QuantizeMode::Clustering {
        n_colors: colors,
        color_space: *color_space,
        sample_fraction: *sample_fraction,
        seed: *seed,
        sort_by_luminance: false,
    };

    let crop = crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
    let subject_q = quantize(&crop, &sub_mode(subject_colors))?;
    let background_q = quantize(image, &sub_mode(background_colors))?;

    let composed = compose(&bbox, &subject_q, &background_q)?;

    let (palette, labels) = match options.merge_threshold {
        Some(threshold) => {
            reduce_similar_colors(&composed.palette, &composed.labels, threshold)?
        }
        None => (composed.palette, composed.labels),
    };
    let (palette, labels) = if *sort {
        sort_by_luminance(&palette, &labels)?
    } else {
        (palette, labels)
    };
    Ok(Quantized { palette, labels })
}

/// Stitch the two quantizations: subject labels win inside the box,
/// background labels (shifted past the subject palette) everywhere
/// else.
fn compose(
    bbox: &BoundingBox,
    subject: &Quantized,
    background: &Quantized,
) -> Result<Quantized, PipelineError> {
    let offset = subject.palette.len();
    let total = offset + background.palette.len();
    if total > usize::from(u8::MAX) + 1 {
        return Err(PipelineError::InvalidConfig(format!(
            "composed palette would have {total} colors",
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let offset_u8 = offset as u8;

    let mut colors: Vec<_> = subject.palette.colors().to_vec();
    colors.extend_from_slice(background.palette.colors());
    let palette = Palette::new(colors);

    let dims = background.labels.dimensions();
    let mut data = Vec::with_capacity(dims.width as usize * dims.height as usize);
    for y in 0..dims.height {
        for x in 0..dims.width {
            let label = if bbox.contains(x, y) {
                subject.labels.get(x - bbox.x, y - bbox.y)
            } else {
                background.labels.get(x, y) + offset_u8
            };
            data.push(label);
        }
    }
    let labels = LabelMap::from_raw(dims.width, dims.height, data)?;
    labels.validate(&palette)?;
    Ok(Quantized { palette, labels })
}
