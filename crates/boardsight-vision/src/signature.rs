//! Per-cell feature signatures.
//!
//! A cell is warped to a small square patch. Samples close to the square's
//! background tone that are reachable from the patch border form the
//! background; everything else (including piece interiors enclosed by an
//! outline) is the piece silhouette. The signature is built from that
//! silhouette and the tones inside it, so it does not depend on the shade of
//! the square the piece stands on.

use boardsight_core::{homography_from_4pt, sample_bilinear, GrayImageView};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::geometry::CellQuad;
use crate::params::{FeatureWeights, SignatureParams};

pub const SHAPE_GRID: usize = 8;
pub const TONE_BINS: usize = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Silhouette fraction per block, `SHAPE_GRID x SHAPE_GRID` row-major.
    pub shape: Vec<f32>,
    /// Normalized luma histogram of the silhouette interior.
    pub tone: [f32; TONE_BINS],
    /// Mean luma of the silhouette interior (0 when there is none).
    pub mean_tone: f32,
    /// Silhouette fraction of the whole patch.
    pub coverage: f32,
    /// Mean absolute gradient inside the silhouette, scaled to `[0, 1]`.
    pub edge: f32,
}

impl Signature {
    /// Weighted L1 distance between two signatures.
    pub fn distance(&self, other: &Signature, w: &FeatureWeights) -> f32 {
        let n = self.shape.len().min(other.shape.len()).max(1);
        let shape = self
            .shape
            .iter()
            .zip(&other.shape)
            .map(|(a, b)| (a - b).abs())
            .sum::<f32>()
            / n as f32;
        let tone = 0.5
            * self
                .tone
                .iter()
                .zip(&other.tone)
                .map(|(a, b)| (a - b).abs())
                .sum::<f32>();
        w.shape * shape
            + w.tone * tone
            + w.coverage * (self.coverage - other.coverage).abs()
            + w.edge * (self.edge - other.edge).abs()
    }
}

/// Reusable sampler: sample layout and scratch buffers for one patch size.
pub(crate) struct CellSampler {
    n: usize,
    unit: [Point2<f32>; 4],
    points: Vec<Point2<f32>>, // row-major in unit-cell coordinates
    samples: Vec<f32>,
    background: Vec<bool>,
    stack: Vec<usize>,
}

impl CellSampler {
    pub(crate) fn new(params: &SignatureParams) -> Self {
        let n = params.patch_px.max(SHAPE_GRID);
        let inset = params.inset_frac.clamp(0.0, 0.3);
        let step = (1.0 - 2.0 * inset) / n as f32;
        let mut points = Vec::with_capacity(n * n);
        for y in 0..n {
            for x in 0..n {
                points.push(Point2::new(
                    inset + (x as f32 + 0.5) * step,
                    inset + (y as f32 + 0.5) * step,
                ));
            }
        }
        Self {
            n,
            unit: [
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0),
            ],
            points,
            samples: vec![0.0; n * n],
            background: vec![false; n * n],
            stack: Vec::with_capacity(n * n),
        }
    }

    /// Signature of the cell at `quad` (image pixel coordinates).
    ///
    /// `bg` is the expected luma of the bare square and `threshold` the
    /// largest deviation still counted as background.
    pub(crate) fn signature(
        &mut self,
        img: &GrayImageView<'_>,
        quad: &CellQuad,
        bg: f32,
        threshold: f32,
    ) -> Option<Signature> {
        let h = homography_from_4pt(&self.unit, quad)?;
        for (s, p) in self.samples.iter_mut().zip(&self.points) {
            let q = h.apply(*p);
            // pixel (x, y) covers [x, x+1); the sampler treats integer coords as centers
            *s = sample_bilinear(img, q.x - 0.5, q.y - 0.5);
        }
        self.flood_background(bg, threshold);
        Some(self.summarize())
    }

    fn flood_background(&mut self, bg: f32, threshold: f32) {
        let n = self.n;
        let like_bg = |v: f32| (v - bg).abs() <= threshold;
        self.background.iter_mut().for_each(|b| *b = false);
        self.stack.clear();

        for i in 0..n {
            for idx in [i, (n - 1) * n + i, i * n, i * n + n - 1] {
                if !self.background[idx] && like_bg(self.samples[idx]) {
                    self.background[idx] = true;
                    self.stack.push(idx);
                }
            }
        }

        // 4-connected fill: an 8-connected outline is enough to enclose a piece
        while let Some(idx) = self.stack.pop() {
            let (x, y) = (idx % n, idx / n);
            let left = (x > 0).then(|| idx - 1);
            let right = (x + 1 < n).then(|| idx + 1);
            let up = (y > 0).then(|| idx - n);
            let down = (y + 1 < n).then(|| idx + n);
            for j in [left, right, up, down].into_iter().flatten() {
                if !self.background[j] && like_bg(self.samples[j]) {
                    self.background[j] = true;
                    self.stack.push(j);
                }
            }
        }
    }

    #[inline]
    fn is_fg(&self, x: usize, y: usize) -> bool {
        x < self.n && y < self.n && !self.background[y * self.n + x]
    }

    fn summarize(&self) -> Signature {
        let n = self.n;
        let mut shape_fg = [0u32; SHAPE_GRID * SHAPE_GRID];
        let mut shape_total = [0u32; SHAPE_GRID * SHAPE_GRID];
        let mut tone = [0f32; TONE_BINS];
        let mut fg = 0u32;
        let mut interior = 0u32;
        let mut tone_sum = 0f32;
        let mut grad = 0f32;

        for y in 0..n {
            for x in 0..n {
                let idx = y * n + x;
                let block = (y * SHAPE_GRID / n) * SHAPE_GRID + x * SHAPE_GRID / n;
                shape_total[block] += 1;
                if !self.is_fg(x, y) {
                    continue;
                }
                shape_fg[block] += 1;
                fg += 1;

                let v = self.samples[idx];
                // Tones and gradients only from samples away from the background
                // boundary, where bilinear blending mixes in the square's shade.
                let inner = x > 0
                    && y > 0
                    && self.is_fg(x - 1, y)
                    && self.is_fg(x + 1, y)
                    && self.is_fg(x, y - 1)
                    && self.is_fg(x, y + 1);
                if !inner {
                    continue;
                }
                interior += 1;
                tone_sum += v;
                let bin = ((v.clamp(0.0, 255.0) as usize) * TONE_BINS / 256).min(TONE_BINS - 1);
                tone[bin] += 1.0;
                grad += (self.samples[idx + 1] - v).abs() + (self.samples[idx + n] - v).abs();
            }
        }

        if interior > 0 {
            tone.iter_mut().for_each(|t| *t /= interior as f32);
        }
        let shape = shape_fg
            .iter()
            .zip(&shape_total)
            .map(|(&f, &t)| if t == 0 { 0.0 } else { f as f32 / t as f32 })
            .collect();

        Signature {
            shape,
            tone,
            mean_tone: if interior > 0 {
                tone_sum / interior as f32
            } else {
                0.0
            },
            coverage: fg as f32 / (n * n) as f32,
            edge: (grad / (2 * n * n) as f32 / 255.0).clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsight_core::GrayImage;

    fn quad(x: f32, y: f32, s: f32) -> CellQuad {
        [
            Point2::new(x, y),
            Point2::new(x + s, y),
            Point2::new(x + s, y + s),
            Point2::new(x, y + s),
        ]
    }

    /// 40x40 cell of `bg` with a ring of `outline` enclosing `fill`.
    fn ringed_cell(bg: u8, outline: u8, fill: u8) -> GrayImage {
        let mut img = GrayImage::new(40, 40);
        for y in 0..40 {
            for x in 0..40 {
                let d = ((x as f32 + 0.5 - 20.0).powi(2) + (y as f32 + 0.5 - 20.0).powi(2)).sqrt();
                img.data[y * 40 + x] = if d < 9.0 {
                    fill
                } else if d < 12.0 {
                    outline
                } else {
                    bg
                };
            }
        }
        img
    }

    #[test]
    fn bare_square_has_no_silhouette() {
        let img = GrayImage {
            width: 40,
            height: 40,
            data: vec![200; 1600],
        };
        let mut s = CellSampler::new(&SignatureParams::default());
        let sig = s
            .signature(&img.view(), &quad(0.0, 0.0, 40.0), 200.0, 30.0)
            .expect("signature");
        assert_eq!(sig.coverage, 0.0);
        assert_eq!(sig.tone, [0.0; TONE_BINS]);
        assert!(sig.edge < 1e-6);
    }

    #[test]
    fn enclosed_fill_matching_background_counts_as_piece() {
        // white piece on a light square: fill is close to the background
        let img = ringed_cell(235, 0, 245);
        let mut s = CellSampler::new(&SignatureParams::default());
        let sig = s
            .signature(&img.view(), &quad(0.0, 0.0, 40.0), 235.0, 30.0)
            .expect("signature");
        // disk of radius 12 px covers ~0.29 of the 37.6 px inset patch
        assert!(sig.coverage > 0.2, "coverage {}", sig.coverage);
        assert!(sig.tone[TONE_BINS - 1] > 0.3);
    }

    #[test]
    fn silhouettes_match_across_square_shades() {
        let mut s = CellSampler::new(&SignatureParams::default());
        let light = ringed_cell(235, 0, 250);
        let dark = ringed_cell(133, 0, 250);
        let a = s
            .signature(&light.view(), &quad(0.0, 0.0, 40.0), 235.0, 36.0)
            .expect("signature");
        let b = s
            .signature(&dark.view(), &quad(0.0, 0.0, 40.0), 133.0, 36.0)
            .expect("signature");
        let d = a.distance(&b, &FeatureWeights::default());
        assert!(d < 0.08, "distance {d}");
    }

    #[test]
    fn tone_separates_light_and_dark_pieces() {
        let mut s = CellSampler::new(&SignatureParams::default());
        let white = ringed_cell(133, 0, 250);
        let black = ringed_cell(133, 0, 40);
        let a = s
            .signature(&white.view(), &quad(0.0, 0.0, 40.0), 133.0, 36.0)
            .expect("signature");
        let b = s
            .signature(&black.view(), &quad(0.0, 0.0, 40.0), 133.0, 36.0)
            .expect("signature");
        assert!(a.mean_tone > b.mean_tone + 80.0);
        assert!(a.distance(&b, &FeatureWeights::default()) > 0.2);
    }
}
