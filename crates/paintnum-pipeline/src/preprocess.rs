//! Image loading, validation, and color correction.
//!
//! [`load`] brings an image file into memory with hard input bounds
//! (file size, decode dimensions, configured min/max). [`preprocess`]
//! then applies a fixed-order chain of corrections:
//!
//! 1. proportional resize-to-fit (never upscales)
//! 2. gray-world white balance with percentile clipping
//! 3. mean-luminance gamma tone balance
//! 4. median denoise
//! 5. Gaussian blur
//! 6. edge-preserving bilateral smoothing
//! 7. tile-based local contrast equalization
//! 8. unsharp-mask sharpening
//!
//! Each step is individually toggleable, but the order is fixed:
//! quantization downstream assumes tone normalization happened before
//! sharpening, so later steps must not be reordered ahead of earlier
//! ones.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Hard ceiling on decoded dimensions, independent of configuration.
/// Guards against decompression bombs before the configurable bounds
/// are consulted.
pub const HARD_DIMENSION_CEILING: u32 = 10_000;

/// Bounds applied when loading an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadLimits {
    /// Maximum input file size in bytes.
    pub max_file_bytes: u64,
    /// Minimum width and height of the decoded image.
    pub min_dimension: u32,
    /// Maximum width and height of the decoded image.
    pub max_dimension: u32,
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 100 * 1024 * 1024,
            min_dimension: 32,
            max_dimension: 8_000,
        }
    }
}

/// Resampling filter used by the resize-to-fit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Lanczos with 3 lobes: slowest, sharpest for photos.
    Lanczos3,
}

impl ResizeFilter {
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// Gray-world white balance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhiteBalanceOptions {
    /// Fraction of extreme values (per tail, 0.0-0.2) excluded when
    /// estimating channel means, so blown highlights and crushed
    /// shadows do not skew the gains.
    pub clip_fraction: f32,
}

impl Default for WhiteBalanceOptions {
    fn default() -> Self {
        Self {
            clip_fraction: 0.01,
        }
    }
}

/// Tone balance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneBalanceOptions {
    /// Target mean luminance (0-255). A gamma correction is solved so
    /// the image's mean luminance lands here.
    pub target_mean: f32,
}

impl Default for ToneBalanceOptions {
    fn default() -> Self {
        Self {
            target_mean: 128.0,
        }
    }
}

/// Edge-preserving bilateral smoothing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BilateralOptions {
    /// Window radius in pixels.
    pub radius: u8,
    /// Range sigma: how different two colors can be and still mix.
    pub sigma_color: f32,
    /// Spatial sigma for the distance falloff.
    pub sigma_space: f32,
}

impl Default for BilateralOptions {
    fn default() -> Self {
        Self {
            radius: 3,
            sigma_color: 25.0,
            sigma_space: 3.0,
        }
    }
}

/// Tile-based local contrast equalization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalContrastOptions {
    /// Number of tiles along each axis.
    pub tiles: u32,
    /// Blend weight of the equalized result (0.0 = off, 1.0 = full).
    pub strength: f32,
}

impl Default for LocalContrastOptions {
    fn default() -> Self {
        Self {
            tiles: 8,
            strength: 0.5,
        }
    }
}

/// Unsharp-mask sharpening parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpenOptions {
    /// Sigma of the Gaussian used to build the mask.
    pub sigma: f32,
    /// Strength of the high-frequency boost.
    pub amount: f32,
}

impl Default for SharpenOptions {
    fn default() -> Self {
        Self {
            sigma: 1.5,
            amount: 0.6,
        }
    }
}

/// The full preprocessing chain configuration.
///
/// `None` disables a step. The application order is fixed regardless
/// of which steps are enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessOptions {
    /// Longest-axis bound for the working image. The image is never
    /// upscaled past its original size.
    pub max_dimension: u32,
    /// Resampling filter for the resize-to-fit step.
    pub resize_filter: ResizeFilter,
    /// Gray-world white balance.
    pub white_balance: Option<WhiteBalanceOptions>,
    /// Mean-luminance gamma correction.
    pub tone_balance: Option<ToneBalanceOptions>,
    /// Median-filter denoise radius. `None` disables.
    pub denoise_radius: Option<u8>,
    /// Gaussian blur sigma. Non-positive values disable the blur.
    pub blur_sigma: f32,
    /// Edge-preserving bilateral smoothing.
    pub bilateral: Option<BilateralOptions>,
    /// Tile-based local contrast enhancement.
    pub local_contrast: Option<LocalContrastOptions>,
    /// Unsharp-mask sharpening.
    pub sharpen: Option<SharpenOptions>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1200,
            resize_filter: ResizeFilter::default(),
            white_balance: Some(WhiteBalanceOptions::default()),
            tone_balance: Some(ToneBalanceOptions::default()),
            denoise_radius: Some(1),
            blur_sigma: 1.0,
            bilateral: Some(BilateralOptions::default()),
            local_contrast: None,
            sharpen: Some(SharpenOptions::default()),
        }
    }
}

/// Load and validate an input image file.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] if the path does not exist,
/// [`PipelineError::FileTooLarge`] if the file exceeds
/// `limits.max_file_bytes`, [`PipelineError::EmptyInput`] for an empty
/// file, [`PipelineError::ImageDecode`] if decoding fails, and
/// [`PipelineError::ImageTooSmall`]/[`PipelineError::ImageTooLarge`]
/// if the decoded dimensions fall outside the configured bounds (or
/// the [`HARD_DIMENSION_CEILING`]).
pub fn load(path: &Path, limits: &LoadLimits) -> Result<RgbImage, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::NotFound(path.to_path_buf()));
    }
    let bytes_len = std::fs::metadata(path)?.len();
    if bytes_len > limits.max_file_bytes {
        return Err(PipelineError::FileTooLarge {
            bytes: bytes_len,
            limit: limits.max_file_bytes,
        });
    }
    let bytes = std::fs::read(path)?;
    decode(&bytes, limits)
}

/// Decode and validate in-memory image bytes.
///
/// # Errors
///
/// Same as [`load`], minus the filesystem cases.
pub fn decode(bytes: &[u8], limits: &LoadLimits) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let decoded = image::load_from_memory(bytes)?;
    let (w, h) = (decoded.width(), decoded.height());
    let hard_max = limits.max_dimension.min(HARD_DIMENSION_CEILING);
    if w > hard_max || h > hard_max {
        return Err(PipelineError::ImageTooLarge {
            width: w,
            height: h,
            max: hard_max,
        });
    }
    if w < limits.min_dimension || h < limits.min_dimension {
        return Err(PipelineError::ImageTooSmall {
            width: w,
            height: h,
            min: limits.min_dimension,
        });
    }
    Ok(decoded.to_rgb8())
}

/// Run the full preprocessing chain.
///
/// Pure function: produces a new image, never mutates the input.
#[must_use]
pub fn preprocess(image: &RgbImage, options: &PreprocessOptions) -> RgbImage {
    let (mut working, _) = resize_to_fit(image, options.max_dimension, options.resize_filter);

    if let Some(wb) = options.white_balance {
        working = gray_world_white_balance(&working, wb.clip_fraction);
    }
    if let Some(tone) = options.tone_balance {
        working = tone_balance(&working, tone.target_mean);
    }
    if let Some(radius) = options.denoise_radius {
        working = denoise(&working, radius);
    }
    working = gaussian_blur_rgb(&working, options.blur_sigma);
    if let Some(b) = options.bilateral {
        working = bilateral_filter(&working, b);
    }
    if let Some(lc) = options.local_contrast {
        working = local_contrast(&working, lc);
    }
    if let Some(s) = options.sharpen {
        working = unsharp_mask(&working, s.sigma, s.amount);
    }
    working
}

/// Resize so the longest axis is at most `max_dimension`, preserving
/// aspect ratio. Never upscales: images already within the bound are
/// returned unchanged.
///
/// Returns the (possibly unchanged) image and whether a resize was
/// actually applied.
#[must_use]
pub fn resize_to_fit(
    image: &RgbImage,
    max_dimension: u32,
    filter: ResizeFilter,
) -> (RgbImage, bool) {
    let (w, h) = image.dimensions();
    if w.max(h) <= max_dimension {
        return (image.clone(), false);
    }
    let resized = DynamicImage::ImageRgb8(image.clone())
        .resize(max_dimension, max_dimension, filter.to_image_filter())
        .to_rgb8();
    (resized, true)
}

/// Per-channel mean of the values between the `clip` and `1 - clip`
/// quantiles, computed from the channel histogram.
fn clipped_channel_means(image: &RgbImage, clip: f32) -> [f64; 3] {
    let mut histograms = [[0u64; 256]; 3];
    for p in image.pixels() {
        for c in 0..3 {
            histograms[c][usize::from(p.0[c])] += 1;
        }
    }
    let total = u64::from(image.width()) * u64::from(image.height());
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cut = (f64::from(clip.clamp(0.0, 0.2)) * total as f64) as u64;

    let mut means = [0.0f64; 3];
    for c in 0..3 {
        let mut seen = 0u64;
        let mut sum = 0.0f64;
        let mut count = 0u64;
        for (value, &n) in histograms[c].iter().enumerate() {
            let lo = seen;
            let hi = seen + n;
            seen = hi;
            // Portion of this bin inside [cut, total - cut].
            let kept = hi.min(total - cut).saturating_sub(lo.max(cut));
            if kept > 0 {
                #[allow(clippy::cast_precision_loss)]
                {
                    sum += value as f64 * kept as f64;
                }
                count += kept;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        {
            means[c] = if count == 0 { 128.0 } else { sum / count as f64 };
        }
    }
    means
}

/// Gray-world white balance: scale each channel so its (clipped) mean
/// matches the overall gray mean.
#[must_use]
pub fn gray_world_white_balance(image: &RgbImage, clip_fraction: f32) -> RgbImage {
    let means = clipped_channel_means(image, clip_fraction);
    let gray = (means[0] + means[1] + means[2]) / 3.0;
    let gains = [
        if means[0] > 0.0 { gray / means[0] } else { 1.0 },
        if means[1] > 0.0 { gray / means[1] } else { 1.0 },
        if means[2] > 0.0 { gray / means[2] } else { 1.0 },
    ];

    map_channels(image, |c, v| f64::from(v) * gains[c])
}

/// Gamma correction targeting a mean luminance.
///
/// Solves `gamma` from `(mean / 255) ^ gamma = target / 255` and
/// applies it to all channels via a lookup table. Images whose mean is
/// already at the target (or degenerate all-black/all-white images)
/// pass through unchanged.
#[must_use]
pub fn tone_balance(image: &RgbImage, target_mean: f32) -> RgbImage {
    let mut sum = 0.0f64;
    for p in image.pixels() {
        sum += crate::types::Rgb::from(*p).luminance();
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / (u64::from(image.width()) * u64::from(image.height())) as f64;
    let target = f64::from(target_mean.clamp(1.0, 254.0));
    if mean <= 0.5 || mean >= 254.5 || (mean - target).abs() < 0.5 {
        return image.clone();
    }

    let gamma = (target / 255.0).ln() / (mean / 255.0).ln();
    let lut: Vec<u8> = (0u16..256)
        .map(|v| {
            let normalized = f64::from(v) / 255.0;
            clamp_u8(normalized.powf(gamma) * 255.0)
        })
        .collect();

    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        image::Rgb([
            lut[usize::from(p.0[0])],
            lut[usize::from(p.0[1])],
            lut[usize::from(p.0[2])],
        ])
    })
}

/// Median-filter denoise. Radius 0 is a no-op.
#[must_use]
pub fn denoise(image: &RgbImage, radius: u8) -> RgbImage {
    if radius == 0 {
        return image.clone();
    }
    imageproc::filter::median_filter(image, u32::from(radius), u32::from(radius))
}

/// Apply Gaussian blur to an RGB image by blurring each channel
/// independently.
///
/// `imageproc::filter::gaussian_blur_f32` operates on a single
/// channel, so the image is split, blurred, and reassembled. Gaussian
/// blur is linear and per-channel, so this equals blurring in color.
/// Non-positive sigma values return the image unchanged.
#[must_use]
pub fn gaussian_blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });
    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));
    RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}

/// Edge-preserving bilateral smoothing.
///
/// Each output pixel is a weighted average over a window, weighting by
/// spatial distance and by color similarity to the center pixel, so
/// smooth areas flatten while edges stay sharp. O(pixels × window²);
/// the default radius keeps this tolerable at working resolution.
#[must_use]
pub fn bilateral_filter(image: &RgbImage, options: BilateralOptions) -> RgbImage {
    if options.radius == 0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let radius = i64::from(options.radius);
    let two_sigma_color_sq = 2.0 * f64::from(options.sigma_color) * f64::from(options.sigma_color);
    let two_sigma_space_sq = 2.0 * f64::from(options.sigma_space) * f64::from(options.sigma_space);

    RgbImage::from_fn(w, h, |x, y| {
        let center = image.get_pixel(x, y);
        let mut sums = [0.0f64; 3];
        let mut weight_sum = 0.0f64;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let nx = i64::from(x) + dx;
                let ny = i64::from(y) + dy;
                if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let neighbor = image.get_pixel(nx as u32, ny as u32);

                #[allow(clippy::cast_precision_loss)]
                let spatial_sq = (dx * dx + dy * dy) as f64;
                let mut color_sq = 0.0f64;
                for c in 0..3 {
                    let d = f64::from(neighbor.0[c]) - f64::from(center.0[c]);
                    color_sq += d * d;
                }
                let weight =
                    (-spatial_sq / two_sigma_space_sq - color_sq / two_sigma_color_sq).exp();
                for c in 0..3 {
                    sums[c] += weight * f64::from(neighbor.0[c]);
                }
                weight_sum += weight;
            }
        }
        image::Rgb(std::array::from_fn(|c| {
            clamp_u8(sums[c] / weight_sum)
        }))
    })
}

/// Tile-based local contrast enhancement.
///
/// Equalizes the luminance histogram per tile, interpolates the tile
/// mappings bilinearly to avoid seams, then rescales RGB by the
/// luminance ratio and blends with the input by `strength`.
#[must_use]
pub fn local_contrast(image: &RgbImage, options: LocalContrastOptions) -> RgbImage {
    let tiles = options.tiles.max(1);
    let strength = f64::from(options.strength.clamp(0.0, 1.0));
    if strength == 0.0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let luma = GrayImage::from_fn(w, h, |x, y| {
        image::Luma([clamp_u8(crate::types::Rgb::from(*image.get_pixel(x, y)).luminance())])
    });

    // Per-tile equalization lookup tables built from tile histograms.
    let tile_w = w.div_ceil(tiles);
    let tile_h = h.div_ceil(tiles);
    let mut luts = vec![[0u8; 256]; (tiles * tiles) as usize];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let mut hist = [0u64; 256];
            let mut count = 0u64;
            for y in (ty * tile_h)..((ty + 1) * tile_h).min(h) {
                for x in (tx * tile_w)..((tx + 1) * tile_w).min(w) {
                    hist[usize::from(luma.get_pixel(x, y).0[0])] += 1;
                    count += 1;
                }
            }
            let lut = &mut luts[(ty * tiles + tx) as usize];
            if count == 0 {
                for (v, entry) in lut.iter_mut().enumerate() {
                    *entry = u8::try_from(v).unwrap_or(u8::MAX);
                }
                continue;
            }
            let mut cumulative = 0u64;
            for v in 0..256 {
                cumulative += hist[v];
                #[allow(clippy::cast_precision_loss)]
                {
                    lut[v] = clamp_u8(cumulative as f64 / count as f64 * 255.0);
                }
            }
        }
    }

    // Bilinear interpolation between the four surrounding tile LUTs.
    let tile_lut = |tx: i64, ty: i64, v: u8| -> f64 {
        let tx = tx.clamp(0, i64::from(tiles) - 1);
        let ty = ty.clamp(0, i64::from(tiles) - 1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        f64::from(luts[(ty as u32 * tiles + tx as u32) as usize][usize::from(v)])
    };

    RgbImage::from_fn(w, h, |x, y| {
        let v = luma.get_pixel(x, y).0[0];
        let fx = (f64::from(x) + 0.5) / f64::from(tile_w) - 0.5;
        let fy = (f64::from(y) + 0.5) / f64::from(tile_h) - 0.5;
        let tx0 = fx.floor();
        let ty0 = fy.floor();
        let wx = fx - tx0;
        let wy = fy - ty0;
        #[allow(clippy::cast_possible_truncation)]
        let (tx0, ty0) = (tx0 as i64, ty0 as i64);

        let equalized = tile_lut(tx0, ty0, v) * (1.0 - wx) * (1.0 - wy)
            + tile_lut(tx0 + 1, ty0, v) * wx * (1.0 - wy)
            + tile_lut(tx0, ty0 + 1, v) * (1.0 - wx) * wy
            + tile_lut(tx0 + 1, ty0 + 1, v) * wx * wy;

        let blended = f64::from(v).mul_add(1.0 - strength, equalized * strength);
        let ratio = if v == 0 { 1.0 } else { blended / f64::from(v) };
        let p = image.get_pixel(x, y);
        image::Rgb(std::array::from_fn(|c| clamp_u8(f64::from(p.0[c]) * ratio)))
    })
}

/// Unsharp-mask sharpening: boost the difference between the image and
/// a Gaussian-blurred copy.
#[must_use]
pub fn unsharp_mask(image: &RgbImage, sigma: f32, amount: f32) -> RgbImage {
    if sigma <= 0.0 || amount <= 0.0 {
        return image.clone();
    }
    let blurred = gaussian_blur_rgb(image, sigma);
    let amount = f64::from(amount);
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let sharp = image.get_pixel(x, y);
        let soft = blurred.get_pixel(x, y);
        image::Rgb(std::array::from_fn(|c| {
            let detail = f64::from(sharp.0[c]) - f64::from(soft.0[c]);
            clamp_u8(detail.mul_add(amount, f64::from(sharp.0[c])))
        }))
    })
}

fn map_channels(image: &RgbImage, f: impl Fn(usize, u8) -> f64) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        image::Rgb(std::array::from_fn(|c| clamp_u8(f(c, p.0[c]))))
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
