//! Shared types for the paintnum pipeline.

use serde::{Deserialize, Serialize};

use crate::outline::OutlineOptions;
use crate::place::PlacementOptions;
use crate::preprocess::PreprocessOptions;
use crate::quantize::QuantizeMode;

/// Re-export `RgbImage` so downstream crates can reference the working
/// image without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `GrayImage`; region masks and outline rasters use it.
pub use image::GrayImage;

/// Re-export `RgbaImage`; the anti-aliased outline raster uses it.
pub use image::RgbaImage;

/// An 8-bit RGB color.
///
/// The pipeline's own color type: `image::Rgb<u8>` does not implement
/// serde traits, and palettes must serialize losslessly for external
/// renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Create a new color.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Rec. 601 luma, used for palette luminance sorting.
    #[must_use]
    pub fn luminance(self) -> f64 {
        0.299 * f64::from(self.r) + 0.587 * f64::from(self.g) + 0.114 * f64::from(self.b)
    }

    /// Euclidean distance in raw RGB space.
    ///
    /// Used for `reduce_similar_colors`, where the threshold is
    /// specified in RGB units. Perceptual comparisons go through
    /// [`crate::color::ciede2000`] instead.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        dr.mul_add(dr, dg.mul_add(dg, db * db)).sqrt()
    }
}

impl From<image::Rgb<u8>> for Rgb {
    fn from(p: image::Rgb<u8>) -> Self {
        Self::new(p.0[0], p.0[1], p.0[2])
    }
}

impl From<Rgb> for image::Rgb<u8> {
    fn from(c: Rgb) -> Self {
        Self([c.r, c.g, c.b])
    }
}

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create dimensions from a width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// An ordered list of paint colors.
///
/// The index of a color is its paint number minus one, and indices are
/// stable once regions have been derived from the palette: operations
/// that reorder or shrink the palette (luminance sort, color reduction,
/// artistic simplification) produce a **new** `Palette` together with a
/// remapped [`LabelMap`], never mutate one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette(Vec<Rgb>);

impl Palette {
    /// Create a palette from an ordered list of colors.
    #[must_use]
    pub const fn new(colors: Vec<Rgb>) -> Self {
        Self(colors)
    }

    /// Number of colors.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the palette has no colors.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The color at `idx`, if in range.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<Rgb> {
        self.0.get(idx).copied()
    }

    /// All colors, in paint-number order.
    #[must_use]
    pub fn colors(&self) -> &[Rgb] {
        &self.0
    }

    /// Consume the palette and return the underlying colors.
    #[must_use]
    pub fn into_colors(self) -> Vec<Rgb> {
        self.0
    }
}

/// A per-pixel assignment of palette indices.
///
/// Same dimensions as the working image. Every value must be a valid
/// index into the palette it was produced with; [`validate`]
/// (`LabelMap::validate`) checks this at stage boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl LabelMap {
    /// Create a label map from raw data.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvariantViolation`] if `data.len()`
    /// does not equal `width * height`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, PipelineError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(PipelineError::InvariantViolation(format!(
                "label map data length {} does not match {width}x{height}",
                data.len(),
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Map dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// The label at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics (via slice indexing) if the coordinate is out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// The raw label data, row-major.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Check that every label is a valid index into `palette`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvariantViolation`] naming the first
    /// offending label. Intended for stage-boundary checks: a label map
    /// referencing a nonexistent palette entry is a programming defect,
    /// not a degraded result.
    pub fn validate(&self, palette: &Palette) -> Result<(), PipelineError> {
        let n = palette.len();
        match self.data.iter().find(|&&label| usize::from(label) >= n) {
            None => Ok(()),
            Some(&label) => Err(PipelineError::InvariantViolation(format!(
                "label {label} out of range for palette of {n} colors",
            ))),
        }
    }

    /// Apply a label remapping, producing a new map.
    ///
    /// `remap[old_label] = new_label`. Every operation that reorders or
    /// merges palette entries goes through here so the before/after pair
    /// can be checked independently.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvariantViolation`] if any current
    /// label has no entry in `remap`.
    pub fn remapped(&self, remap: &[u8]) -> Result<Self, PipelineError> {
        let data = self
            .data
            .iter()
            .map(|&label| {
                remap.get(usize::from(label)).copied().ok_or_else(|| {
                    PipelineError::InvariantViolation(format!(
                        "label {label} has no remap entry (remap covers {})",
                        remap.len(),
                    ))
                })
            })
            .collect::<Result<Vec<u8>, PipelineError>>()?;
        Ok(Self {
            width: self.width,
            height: self.height,
            data,
        })
    }

    /// Iterate over `(x, y, label)` in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (u32, u32, u8)> + '_ {
        let width = self.width;
        self.data.iter().enumerate().map(move |(i, &label)| {
            let i = u32::try_from(i).unwrap_or(u32::MAX);
            (i % width, i / width, label)
        })
    }
}

/// One connected, paintable area of a single color.
///
/// The mask is rasterized from the region's external contour (not the
/// raw quantization mask), so `area == count(mask > 0)` holds by
/// construction. `number_position` starts as `None` and is assigned
/// exactly once by the number placer.
#[derive(Debug, Clone)]
pub struct Region {
    /// Index into the palette this region was detected against.
    pub color_idx: usize,
    /// Full-size binary membership mask (255 = inside).
    pub mask: GrayImage,
    /// External boundary polygon, in detection order.
    pub contour: Vec<Point>,
    /// Interior anchor: the distance-transform maximum of the mask.
    pub center: Point,
    /// Pixel count of the mask.
    pub area: u32,
    /// Final label placement. May differ from `center` when spacing or
    /// margin constraints push the number elsewhere.
    pub number_position: Option<Point>,
}

impl Region {
    /// Check the region's internal invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvariantViolation`] if the mask is
    /// empty, the stored area disagrees with the mask, or any mask pixel
    /// is labeled differently in `labels`.
    pub fn validate(&self, labels: &LabelMap) -> Result<(), PipelineError> {
        let counted = self.mask.pixels().filter(|p| p.0[0] > 0).count();
        if counted == 0 {
            return Err(PipelineError::InvariantViolation(format!(
                "region for color {} has an empty mask",
                self.color_idx,
            )));
        }
        if counted != self.area as usize {
            return Err(PipelineError::InvariantViolation(format!(
                "region area {} does not match mask pixel count {counted}",
                self.area,
            )));
        }
        for (x, y, p) in self.mask.enumerate_pixels() {
            if p.0[0] > 0 && usize::from(labels.get(x, y)) != self.color_idx {
                return Err(PipelineError::InvariantViolation(format!(
                    "mask pixel ({x}, {y}) labeled {} but region color is {}",
                    labels.get(x, y),
                    self.color_idx,
                )));
            }
        }
        Ok(())
    }

    /// Whether `point` falls on a mask pixel.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        let (x, y) = (point.x.round(), point.y.round());
        if x < 0.0 || y < 0.0 {
            return false;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (x, y) = (x as u32, y as u32);
        x < self.mask.width() && y < self.mask.height() && self.mask.get_pixel(x, y).0[0] > 0
    }
}

/// Configuration for a full pipeline run.
///
/// Passed by value into each stage; stages read no hidden global state.
/// Mode choices are tagged enums dispatched by pattern match, not
/// boolean flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Preprocessing steps (resize, white balance, tone, smoothing).
    pub preprocess: PreprocessOptions,

    /// How to reduce the image to a palette.
    pub quantize: QuantizeMode,

    /// Minimum paintable region area in pixels. Regions below this are
    /// dropped entirely after morphological cleanup.
    pub min_region_size: u32,

    /// Structuring element radius for morphological close/open.
    pub morphology_kernel_size: u8,

    /// Dilation radius for joining nearby same-color regions.
    /// `None` disables the merge pass.
    pub merge_distance: Option<u8>,

    /// CIEDE2000 threshold for artistic simplification.
    /// `None` disables the pass.
    pub artistic_threshold: Option<f32>,

    /// Outline rendering parameters.
    pub outline: OutlineOptions,

    /// Number placement parameters.
    pub placement: PlacementOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessOptions::default(),
            quantize: QuantizeMode::default(),
            min_region_size: 100,
            morphology_kernel_size: 2,
            merge_distance: Some(3),
            artistic_threshold: None,
            outline: OutlineOptions::default(),
            placement: PlacementOptions::default(),
        }
    }
}

/// Result of a full pipeline run.
///
/// Exactly the §-outputs external renderers consume: palette, label
/// map, regions with contours and number positions, the outline raster,
/// and a quality report.
///
/// Note: does not derive `PartialEq` because region masks and the
/// outline raster are `image` buffers. Uses custom serde because those
/// buffers do not implement serde traits; rasters serialize as
/// `(width, height, raw_pixels)` tuples.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Final palette, in paint-number order.
    pub palette: Palette,
    /// Final per-pixel palette assignment.
    pub labels: LabelMap,
    /// All surviving regions, in detection order.
    pub regions: Vec<Region>,
    /// Anti-aliased outline raster for template rendering.
    pub outline: RgbaImage,
    /// Working-image dimensions.
    pub dimensions: Dimensions,
    /// Read-only quality diagnostics for this run.
    pub report: crate::analyze::QualityReport,
}

/// Serde proxy for [`Region`]: the mask serializes as a
/// `(width, height, raw)` tuple.
#[derive(Serialize, Deserialize)]
struct RegionProxy {
    color_idx: usize,
    mask: (u32, u32, Vec<u8>),
    contour: Vec<Point>,
    center: Point,
    area: u32,
    number_position: Option<Point>,
}

impl Serialize for Region {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = RegionProxy {
            color_idx: self.color_idx,
            mask: (self.mask.width(), self.mask.height(), self.mask.as_raw().clone()),
            contour: self.contour.clone(),
            center: self.center,
            area: self.area,
            number_position: self.number_position,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Region {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = RegionProxy::deserialize(deserializer)?;
        let mask = GrayImage::from_raw(proxy.mask.0, proxy.mask.1, proxy.mask.2)
            .ok_or_else(|| serde::de::Error::custom("invalid mask dimensions"))?;
        Ok(Self {
            color_idx: proxy.color_idx,
            mask,
            contour: proxy.contour,
            center: proxy.center,
            area: proxy.area,
            number_position: proxy.number_position,
        })
    }
}

/// Serde proxy for [`ProcessResult`].
#[derive(Serialize, Deserialize)]
struct ProcessResultProxy {
    palette: Palette,
    labels: LabelMap,
    regions: Vec<Region>,
    outline: (u32, u32, Vec<u8>),
    dimensions: Dimensions,
    report: crate::analyze::QualityReport,
}

impl Serialize for ProcessResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = ProcessResultProxy {
            palette: self.palette.clone(),
            labels: self.labels.clone(),
            regions: self.regions.clone(),
            outline: (
                self.outline.width(),
                self.outline.height(),
                self.outline.as_raw().clone(),
            ),
            dimensions: self.dimensions,
            report: self.report.clone(),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProcessResult {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = ProcessResultProxy::deserialize(deserializer)?;
        let outline = RgbaImage::from_raw(proxy.outline.0, proxy.outline.1, proxy.outline.2)
            .ok_or_else(|| serde::de::Error::custom("invalid outline dimensions"))?;
        Ok(Self {
            palette: proxy.palette,
            labels: proxy.labels,
            regions: proxy.regions,
            outline,
            dimensions: proxy.dimensions,
            report: proxy.report,
        })
    }
}

/// Errors that can occur during pipeline processing.
///
/// Input and configuration errors abort the run; degenerate results
/// (a color with no usable regions, a number that needed the spacing
/// fallback) are logged warnings carried in the quality report, never
/// errors. `InvariantViolation` indicates a programming defect and is
/// raised rather than letting corrupt data reach renderers.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input path does not exist.
    #[error("input file not found: {0}")]
    NotFound(std::path::PathBuf),

    /// Reading the input file failed.
    #[error("failed to read input file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The input file exceeds the configured size ceiling.
    #[error("input file is {bytes} bytes, above the {limit} byte limit")]
    FileTooLarge {
        /// Actual file size.
        bytes: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// The decoded image is smaller than the configured minimum.
    #[error("image {width}x{height} is below the {min}px minimum dimension")]
    ImageTooSmall {
        /// Decoded width.
        width: u32,
        /// Decoded height.
        height: u32,
        /// Configured minimum for both dimensions.
        min: u32,
    },

    /// The decoded image is larger than the configured maximum.
    #[error("image {width}x{height} is above the {max}px maximum dimension")]
    ImageTooLarge {
        /// Decoded width.
        width: u32,
        /// Decoded height.
        height: u32,
        /// Configured maximum for both dimensions.
        max: u32,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The requested unified palette name is not known.
    #[error("unknown palette: {0:?}")]
    UnknownPalette(String),

    /// No region survived size filtering for any color.
    #[error("no paintable regions found in the image")]
    NoRegions,

    /// A stage produced internally inconsistent data.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}
