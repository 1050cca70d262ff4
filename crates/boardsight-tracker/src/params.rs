use boardsight_core::Color;
use serde::{Deserialize, Serialize};

/// Where the first committed position comes from when calibration completes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialPosition {
    /// Assume the standard starting position.
    #[default]
    Standard,
    /// Reconstruct it from a full-board read at high confidence.
    BoardRead,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    /// Consecutive identical frames (K) required before a diff is resolved.
    pub confirm_frames: u32,
    /// Failed resolutions tolerated before the tracker turns stale.
    pub desync_threshold: u32,
    /// Fraction of `Unknown` squares above which the tracker turns stale.
    pub max_unknown_fraction: f32,
    pub initial_position: InitialPosition,
    /// Side to move assumed for a board read.
    pub read_side_to_move: Color,
    /// Minimum per-square confidence for a board read.
    pub read_min_confidence: f32,
    /// Minimum per-square confidence for a frame agreeing with the committed
    /// position to end a stale spell.
    pub recover_min_confidence: f32,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            confirm_frames: 3,
            desync_threshold: 4,
            max_unknown_fraction: 0.25,
            initial_position: InitialPosition::Standard,
            read_side_to_move: Color::White,
            read_min_confidence: 0.6,
            recover_min_confidence: 0.6,
        }
    }
}
