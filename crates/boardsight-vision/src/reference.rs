//! Learned square palette and reference signatures.

use boardsight_core::Occupancy;
use serde::{Deserialize, Serialize};

use crate::params::{FeatureWeights, SignatureParams};
use crate::signature::Signature;

/// Background luma of the two square shades, indexed by [`crate::shade_of`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub shade: [f32; 2],
}

impl Palette {
    #[inline]
    pub fn background(&self, shade: usize) -> f32 {
        self.shade[shade & 1]
    }

    pub fn contrast(&self) -> f32 {
        (self.shade[0] - self.shade[1]).abs()
    }

    /// Largest deviation from [`Palette::background`] still treated as bare square.
    pub fn threshold(&self, params: &SignatureParams) -> f32 {
        (params.fg_threshold_rel * self.contrast()).max(params.fg_threshold_min)
    }
}

/// One learned example: what a cell showing `occupancy` looks like.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSample {
    pub occupancy: Occupancy,
    pub signature: Signature,
}

/// Best label for one signature with its confidence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub occupancy: Occupancy,
    pub confidence: f32,
    pub distance: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSet {
    pub samples: Vec<ReferenceSample>,
}

impl ReferenceSet {
    pub fn push(&mut self, occupancy: Occupancy, signature: Signature) {
        self.samples.push(ReferenceSample {
            occupancy,
            signature,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nearest-label classification.
    ///
    /// Each label scores the distance of its closest sample. Confidence is
    /// the margin to the runner-up label times how close the best match is
    /// relative to `max_distance`; `Unknown` with zero confidence when there
    /// are no references.
    pub fn classify(
        &self,
        sig: &Signature,
        weights: &FeatureWeights,
        max_distance: f32,
    ) -> Classification {
        let mut per_label: Vec<(Occupancy, f32)> = Vec::with_capacity(13);
        for s in &self.samples {
            let d = s.signature.distance(sig, weights);
            match per_label.iter_mut().find(|(o, _)| *o == s.occupancy) {
                Some((_, best)) => *best = best.min(d),
                None => per_label.push((s.occupancy, d)),
            }
        }

        let mut best: Option<(Occupancy, f32)> = None;
        let mut second = f32::INFINITY;
        for &(o, d) in &per_label {
            match best {
                Some((_, bd)) if d >= bd => second = second.min(d),
                Some((_, bd)) => {
                    second = bd;
                    best = Some((o, d));
                }
                None => best = Some((o, d)),
            }
        }

        let Some((occupancy, d1)) = best else {
            return Classification {
                occupancy: Occupancy::Unknown,
                confidence: 0.0,
                distance: f32::INFINITY,
            };
        };

        let margin = if second.is_finite() && second > 0.0 {
            1.0 - d1 / second
        } else if second.is_finite() {
            0.0
        } else {
            1.0
        };
        let fit = 1.0 - d1 / max_distance.max(f32::EPSILON);
        Classification {
            occupancy,
            confidence: (margin * fit).clamp(0.0, 1.0),
            distance: d1,
        }
    }
}
