use serde::{Deserialize, Serialize};

use crate::geometry::Orientation;

/// How a cell is resampled and split into piece silhouette vs square background.
///
/// Stored inside [`crate::CalibratedGrid`] because the learned references are
/// only comparable with signatures sampled the same way.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureParams {
    /// Side of the square patch each cell is warped to, in samples.
    pub patch_px: usize,
    /// Fraction of the cell side ignored at each edge.
    pub inset_frac: f32,
    /// Foreground threshold relative to the light/dark palette contrast.
    pub fg_threshold_rel: f32,
    /// Lower bound for the foreground threshold in luma levels.
    pub fg_threshold_min: f32,
}

impl Default for SignatureParams {
    fn default() -> Self {
        Self {
            patch_px: 24,
            inset_frac: 0.06,
            fg_threshold_rel: 0.35,
            fg_threshold_min: 16.0,
        }
    }
}

/// Region calibration settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Force the orientation instead of inferring it from piece tones.
    pub orientation_hint: Option<Orientation>,
    /// Smallest accepted square side in pixels.
    pub min_square_px: f32,
    /// Largest accepted `width / height` deviation from a square region.
    pub max_aspect_ratio: f32,
    /// Silhouette coverage above which a cell counts as occupied.
    pub occupied_coverage: f32,
    /// Cells allowed to disagree with the starting occupancy pattern.
    pub max_pattern_mismatches: usize,
    /// Minimum luma gap between the two armies' mean piece tone.
    pub min_tone_separation: f32,
    pub signature: SignatureParams,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            orientation_hint: None,
            min_square_px: 12.0,
            max_aspect_ratio: 1.25,
            occupied_coverage: 0.04,
            max_pattern_mismatches: 0,
            min_tone_separation: 24.0,
            signature: SignatureParams::default(),
        }
    }
}

/// Relative weight of each signature component in the reference distance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureWeights {
    pub shape: f32,
    pub tone: f32,
    pub coverage: f32,
    pub edge: f32,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            shape: 1.0,
            tone: 0.6,
            coverage: 0.5,
            edge: 0.25,
        }
    }
}

/// Per-square classification thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorParams {
    /// Below this confidence a reading is `Unknown`.
    pub tau_low: f32,
    /// At or above this confidence a reading is accepted as-is.
    pub tau_high: f32,
    /// Consecutive mid-band frames tolerated before a square decays to `Unknown`.
    pub decay_frames: u32,
    /// Distance at which a reference match is considered no match at all.
    pub max_distance: f32,
    pub weights: FeatureWeights,
}

impl Default for ExtractorParams {
    fn default() -> Self {
        Self {
            tau_low: 0.25,
            tau_high: 0.6,
            decay_frames: 3,
            max_distance: 0.6,
            weights: FeatureWeights::default(),
        }
    }
}

impl ExtractorParams {
    pub fn with_thresholds(mut self, tau_low: f32, tau_high: f32) -> Self {
        self.tau_low = tau_low;
        self.tau_high = tau_high;
        self
    }
}
