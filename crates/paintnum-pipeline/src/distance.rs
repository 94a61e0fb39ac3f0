//! Interior distance transform over binary masks.
//!
//! Two-pass 3-4 chamfer transform: each foreground pixel gets its
//! approximate Euclidean distance to the nearest background pixel
//! (image borders count as background). The 3-4 weights divided by 3
//! stay within ~8% of true Euclidean distance, which is enough here —
//! region centers and placement candidates only need a ranking, and
//! the pole-of-inaccessibility search refines geometry when precision
//! matters.

use image::GrayImage;

use crate::types::Point;

/// Per-pixel distance field for a mask.
#[derive(Debug, Clone)]
pub struct DistanceField {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DistanceField {
    /// Distance at `(x, y)` in approximate pixel units. Background
    /// pixels are 0.
    ///
    /// # Panics
    ///
    /// Panics (via slice indexing) if the coordinate is out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        debug_assert!(x < self.width && y < self.height, "({x}, {y}) out of bounds");
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// The most interior point: position of the maximum distance,
    /// with ties broken toward smaller `(y, x)` for determinism.
    ///
    /// Returns `None` if the mask had no foreground pixels.
    #[must_use]
    pub fn interior_maximum(&self) -> Option<(Point, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &d) in self.data.iter().enumerate() {
            if d > 0.0 && best.is_none_or(|(_, bd)| d > bd) {
                best = Some((i, d));
            }
        }
        best.map(|(i, d)| (self.index_to_point(i), d))
    }

    /// Up to `k` high-distance interior points, each at least
    /// `min_separation` pixels from the ones already chosen, ordered
    /// by descending distance.
    ///
    /// Greedy selection over the sorted field; deterministic because
    /// ties sort by index.
    #[must_use]
    pub fn top_maxima(&self, k: usize, min_separation: f64) -> Vec<(Point, f32)> {
        let mut candidates: Vec<(usize, f32)> = self
            .data
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d > 0.0)
            .map(|(i, &d)| (i, d))
            .collect();
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        let mut picked: Vec<(Point, f32)> = Vec::with_capacity(k);
        for (i, d) in candidates {
            if picked.len() >= k {
                break;
            }
            let p = self.index_to_point(i);
            if picked
                .iter()
                .all(|(q, _)| q.distance(p) >= min_separation)
            {
                picked.push((p, d));
            }
        }
        picked
    }

    fn index_to_point(&self, i: usize) -> Point {
        let x = i % self.width as usize;
        let y = i / self.width as usize;
        #[allow(clippy::cast_precision_loss)]
        Point::new(x as f64, y as f64)
    }
}

/// Compute the interior distance field of a binary mask (nonzero =
/// foreground). Pixels beyond the image border are treated as
/// background, so a mask touching the border has distance 1 there.
#[must_use]
pub fn distance_field(mask: &GrayImage) -> DistanceField {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    const FAR: f32 = f32::MAX / 4.0;
    let mut dist: Vec<f32> = mask
        .pixels()
        .map(|p| if p.0[0] > 0 { FAR } else { 0.0 })
        .collect();

    // Neighbor lookup treating out-of-bounds as background (0).
    let at = |dist: &[f32], x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= w as isize || y >= h as isize {
            0.0
        } else {
            #[allow(clippy::cast_sign_loss)]
            dist[y as usize * w + x as usize]
        }
    };

    // Forward pass: west, north-west, north, north-east.
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            if dist[i] == 0.0 {
                continue;
            }
            #[allow(clippy::cast_possible_wrap)]
            let (xi, yi) = (x as isize, y as isize);
            let mut d = dist[i];
            d = d.min(at(&dist, xi - 1, yi) + 3.0);
            d = d.min(at(&dist, xi - 1, yi - 1) + 4.0);
            d = d.min(at(&dist, xi, yi - 1) + 3.0);
            d = d.min(at(&dist, xi + 1, yi - 1) + 4.0);
            dist[i] = d;
        }
    }

    // Backward pass: east, south-east, south, south-west.
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let i = y * w + x;
            if dist[i] == 0.0 {
                continue;
            }
            #[allow(clippy::cast_possible_wrap)]
            let (xi, yi) = (x as isize, y as isize);
            let mut d = dist[i];
            d = d.min(at(&dist, xi + 1, yi) + 3.0);
            d = d.min(at(&dist, xi + 1, yi + 1) + 4.0);
            d = d.min(at(&dist, xi, yi + 1) + 3.0);
            d = d.min(at(&dist, xi - 1, yi + 1) + 4.0);
            dist[i] = d;
        }
    }

    for d in &mut dist {
        *d /= 3.0;
    }

    DistanceField {
        width: mask.width(),
        height: mask.height(),
        data: dist,
    }
}
