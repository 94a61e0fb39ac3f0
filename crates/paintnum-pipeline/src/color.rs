//! Color space plumbing for quantization and simplification.
//!
//! Quantization can run in RGB, CIE Lab, or HSV; this module converts
//! 8-bit RGB pixels into a 3-component feature vector for the selected
//! space and back. Artistic simplification compares palette entries
//! with the CIEDE2000 perceptual difference, which operates on Lab.

use palette::color_difference::Ciede2000;
use palette::{FromColor, Hsv, IntoColor, Lab, LinSrgb, Srgb};
use serde::{Deserialize, Serialize};

use crate::types::Rgb;

/// The color space quantization distances are measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Raw 8-bit RGB. Fast, not perceptually uniform.
    Rgb,
    /// CIE L\*a\*b\*. Euclidean distance approximates perceived
    /// difference; the default for both quantization modes.
    #[default]
    Lab,
    /// Hue/saturation/value. Hue is scaled from degrees into the same
    /// 0-255 magnitude as the other channels so Euclidean distance
    /// weights all three comparably.
    Hsv,
}

impl ColorSpace {
    /// Convert an RGB color into this space's 3-component feature
    /// vector.
    ///
    /// Feature magnitudes are kept roughly comparable across spaces
    /// (0-255 for RGB and HSV, 0-100 / ±128 for Lab) so distance
    /// thresholds behave similarly.
    #[must_use]
    pub fn features(self, c: Rgb) -> [f32; 3] {
        match self {
            Self::Rgb => [f32::from(c.r), f32::from(c.g), f32::from(c.b)],
            Self::Lab => {
                let lab = to_lab(c);
                [lab.l, lab.a, lab.b]
            }
            Self::Hsv => {
                let hsv = Hsv::from_color(to_linear(c));
                [
                    hsv.hue.into_positive_degrees() * (255.0 / 360.0),
                    hsv.saturation * 255.0,
                    hsv.value * 255.0,
                ]
            }
        }
    }

    /// Convert a feature vector in this space back to 8-bit RGB.
    ///
    /// Used to turn cluster centers into palette colors. Out-of-gamut
    /// values are clamped.
    #[must_use]
    pub fn to_rgb(self, f: [f32; 3]) -> Rgb {
        match self {
            Self::Rgb => Rgb::new(
                clamp_channel(f[0]),
                clamp_channel(f[1]),
                clamp_channel(f[2]),
            ),
            Self::Lab => {
                let lin: LinSrgb<f32> = Lab::new(f[0], f[1], f[2]).into_color();
                from_linear(lin)
            }
            Self::Hsv => {
                let hsv = Hsv::new(f[0] * (360.0 / 255.0), f[1] / 255.0, f[2] / 255.0);
                let lin: LinSrgb<f32> = hsv.into_color();
                from_linear(lin)
            }
        }
    }
}

/// Squared Euclidean distance between two feature vectors.
#[must_use]
pub fn feature_distance_squared(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0.mul_add(d0, d1.mul_add(d1, d2 * d2))
}

/// CIEDE2000 perceptual difference between two RGB colors.
///
/// Roughly: < 2 is imperceptible, 2-10 is noticeable, > 10 is a
/// clearly different color. Artistic simplification thresholds are
/// specified on this scale.
#[must_use]
pub fn ciede2000(a: Rgb, b: Rgb) -> f32 {
    to_lab(a).difference(to_lab(b))
}

fn to_linear(c: Rgb) -> LinSrgb<f32> {
    Srgb::new(
        f32::from(c.r) / 255.0,
        f32::from(c.g) / 255.0,
        f32::from(c.b) / 255.0,
    )
    .into_linear()
}

fn to_lab(c: Rgb) -> Lab {
    Lab::from_color(to_linear(c))
}

fn from_linear(lin: LinSrgb<f32>) -> Rgb {
    let srgb: Srgb<f32> = Srgb::from_linear(lin);
    Rgb::new(
        clamp_channel(srgb.red * 255.0),
        clamp_channel(srgb.green * 255.0),
        clamp_channel(srgb.blue * 255.0),
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_space_is_lab() {
        assert_eq!(ColorSpace::default(), ColorSpace::Lab);
    }

    #[test]
    fn rgb_features_are_raw_channels() {
        let f = ColorSpace::Rgb.features(Rgb::new(10, 20, 30));
        assert_eq!(f, [10.0, 20.0, 30.0]);
    }

    #[test]
    fn rgb_round_trip_exact() {
        let c = Rgb::new(12, 200, 97);
        assert_eq!(ColorSpace::Rgb.to_rgb(ColorSpace::Rgb.features(c)), c);
    }

    #[test]
    fn lab_round_trip_close() {
        // Lab conversion loses at most rounding error per channel.
        for c in [
            Rgb::new(0, 0, 0),
            Rgb::new(255, 255, 255),
            Rgb::new(200, 30, 64),
            Rgb::new(17, 120, 230),
        ] {
            let back = ColorSpace::Lab.to_rgb(ColorSpace::Lab.features(c));
            assert!(
                i16::from(back.r).abs_diff(i16::from(c.r)) <= 1
                    && i16::from(back.g).abs_diff(i16::from(c.g)) <= 1
                    && i16::from(back.b).abs_diff(i16::from(c.b)) <= 1,
                "lab round trip drifted: {c:?} -> {back:?}",
            );
        }
    }

    #[test]
    fn hsv_round_trip_close() {
        for c in [Rgb::new(255, 0, 0), Rgb::new(100, 180, 40)] {
            let back = ColorSpace::Hsv.to_rgb(ColorSpace::Hsv.features(c));
            assert!(
                i16::from(back.r).abs_diff(i16::from(c.r)) <= 2
                    && i16::from(back.g).abs_diff(i16::from(c.g)) <= 2
                    && i16::from(back.b).abs_diff(i16::from(c.b)) <= 2,
                "hsv round trip drifted: {c:?} -> {back:?}",
            );
        }
    }

    #[test]
    fn lab_black_lightness_is_zero() {
        let f = ColorSpace::Lab.features(Rgb::new(0, 0, 0));
        assert!(f[0].abs() < 1e-3, "black L* should be ~0, got {}", f[0]);
    }

    #[test]
    fn lab_white_lightness_is_hundred() {
        let f = ColorSpace::Lab.features(Rgb::new(255, 255, 255));
        assert!(
            (f[0] - 100.0).abs() < 0.1,
            "white L* should be ~100, got {}",
            f[0],
        );
    }

    #[test]
    fn feature_distance_squared_basics() {
        let d = feature_distance_squared([0.0, 0.0, 0.0], [1.0, 2.0, 2.0]);
        assert!((d - 9.0).abs() < 1e-6);
    }

    #[test]
    fn ciede2000_identical_colors_is_zero() {
        let c = Rgb::new(120, 45, 200);
        assert!(ciede2000(c, c).abs() < 1e-4);
    }

    #[test]
    fn ciede2000_near_colors_smaller_than_far() {
        let red = Rgb::new(200, 30, 30);
        let near_red = Rgb::new(205, 35, 32);
        let blue = Rgb::new(30, 30, 200);
        let near = ciede2000(red, near_red);
        let far = ciede2000(red, blue);
        assert!(
            near < far,
            "near pair ({near}) should be closer than far pair ({far})",
        );
        assert!(near < 5.0, "visually close reds should score < 5, got {near}");
        assert!(far > 20.0, "red vs blue should score > 20, got {far}");
    }
}
