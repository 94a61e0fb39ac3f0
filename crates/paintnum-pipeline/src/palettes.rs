//! Built-in unified palettes: fixed, named, reusable color sets.
//!
//! Unified-palette quantization projects the image onto one of these
//! tables instead of clustering a per-image palette. Every entry has a
//! human-readable name for legend rendering. Palettes are capped at 72
//! colors so the full pairwise nearest-color search in unified mode
//! stays cheap.

use crate::types::{Palette, PipelineError, Rgb};

/// A single named paint color in a unified palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedColor {
    /// Human-readable paint name, for legends.
    pub name: &'static str,
    /// The paint's RGB value.
    pub rgb: Rgb,
}

const fn named(name: &'static str, r: u8, g: u8, b: u8) -> NamedColor {
    NamedColor {
        name,
        rgb: Rgb::new(r, g, b),
    }
}

/// A fixed, named, reusable color set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnifiedPalette {
    /// Palette identifier used in configuration.
    pub name: &'static str,
    /// The palette's colors, in paint-number order.
    pub colors: &'static [NamedColor],
}

impl UnifiedPalette {
    /// The palette's colors as a pipeline [`Palette`].
    #[must_use]
    pub fn to_palette(&self) -> Palette {
        Palette::new(self.colors.iter().map(|c| c.rgb).collect())
    }
}

/// A starter set of 24 common acrylic paint colors.
static CLASSIC_24: &[NamedColor] = &[
    named("Titanium White", 245, 245, 240),
    named("Ivory", 255, 247, 220),
    named("Lemon Yellow", 250, 230, 80),
    named("Cadmium Yellow", 250, 190, 30),
    named("Yellow Ochre", 200, 155, 60),
    named("Orange", 240, 130, 30),
    named("Vermilion", 220, 70, 45),
    named("Cadmium Red", 195, 35, 40),
    named("Crimson", 150, 25, 55),
    named("Magenta", 190, 55, 130),
    named("Violet", 110, 60, 145),
    named("Ultramarine", 40, 55, 145),
    named("Cobalt Blue", 30, 90, 175),
    named("Cerulean", 50, 140, 200),
    named("Turquoise", 55, 180, 175),
    named("Viridian", 25, 120, 85),
    named("Sap Green", 85, 140, 55),
    named("Olive", 120, 120, 50),
    named("Raw Sienna", 170, 115, 60),
    named("Burnt Sienna", 135, 75, 45),
    named("Burnt Umber", 90, 60, 40),
    named("Payne's Gray", 70, 80, 95),
    named("Neutral Gray", 145, 145, 145),
    named("Ivory Black", 30, 30, 32),
];

/// An 8-step neutral ramp for monochrome templates.
static GRAYSCALE_8: &[NamedColor] = &[
    named("Black", 20, 20, 20),
    named("Gray 1", 55, 55, 55),
    named("Gray 2", 90, 90, 90),
    named("Gray 3", 125, 125, 125),
    named("Gray 4", 160, 160, 160),
    named("Gray 5", 195, 195, 195),
    named("Gray 6", 225, 225, 225),
    named("White", 250, 250, 250),
];

/// Pure black and white, mostly useful for tests and line art.
static BW: &[NamedColor] = &[
    named("Black", 0, 0, 0),
    named("White", 255, 255, 255),
];

static BUILTIN: &[UnifiedPalette] = &[
    UnifiedPalette {
        name: "classic-24",
        colors: CLASSIC_24,
    },
    UnifiedPalette {
        name: "grayscale-8",
        colors: GRAYSCALE_8,
    },
    UnifiedPalette {
        name: "bw",
        colors: BW,
    },
];

/// Look up a built-in unified palette by name.
///
/// # Errors
///
/// Returns [`PipelineError::UnknownPalette`] if no built-in palette
/// has that name. This is a configuration error: it aborts the run at
/// construction time rather than falling back silently.
pub fn unified_palette(name: &str) -> Result<&'static UnifiedPalette, PipelineError> {
    BUILTIN
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| PipelineError::UnknownPalette(name.to_string()))
}

/// Names of all built-in unified palettes.
#[must_use]
pub fn palette_names() -> Vec<&'static str> {
    BUILTIN.iter().map(|p| p.name).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_palette() {
        let p = unified_palette("classic-24").unwrap();
        assert_eq!(p.colors.len(), 24);
        assert_eq!(p.colors[0].name, "Titanium White");
    }

    #[test]
    fn lookup_unknown_palette_fails() {
        let result = unified_palette("neon-dreams");
        assert!(matches!(
            result,
            Err(PipelineError::UnknownPalette(ref name)) if name == "neon-dreams",
        ));
    }

    #[test]
    fn all_builtins_within_size_bound() {
        for p in BUILTIN {
            assert!(
                !p.colors.is_empty() && p.colors.len() <= 72,
                "palette {} has {} colors, outside 1..=72",
                p.name,
                p.colors.len(),
            );
        }
    }

    #[test]
    fn palette_names_listed() {
        let names = palette_names();
        assert!(names.contains(&"classic-24"));
        assert!(names.contains(&"grayscale-8"));
        assert!(names.contains(&"bw"));
    }

    #[test]
    fn to_palette_preserves_order() {
        let p = unified_palette("bw").unwrap().to_palette();
        assert_eq!(p.colors(), &[Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)]);
    }
}
