//! Session configuration: one JSON document aggregating every stage's parameters.

use std::path::Path;
use std::time::Duration;

use boardsight_engine::{EngineParams, StrengthProfile};
use boardsight_tracker::TrackerParams;
use boardsight_vision::{load_json, write_json, CalibrationParams, ConfigIoError, ExtractorParams};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureParams {
    /// Pause between two grabs of the selected region.
    pub interval_ms: u64,
    /// Frames averaged when calibrating a region.
    pub sample_frames: usize,
    /// Pause between two calibration samples.
    pub sample_gap_ms: u64,
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            sample_frames: 3,
            sample_gap_ms: 30,
        }
    }
}

impl CaptureParams {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn sample_gap(&self) -> Duration {
        Duration::from_millis(self.sample_gap_ms)
    }
}

/// Everything a [`crate::Session`] needs besides its grabber and engine launcher.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub capture: CaptureParams,
    pub calibration: CalibrationParams,
    pub extractor: ExtractorParams,
    pub tracker: TrackerParams,
    pub engine: EngineParams,
    pub strength: StrengthProfile,
}

impl SessionConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        write_json(self, path)
    }
}
