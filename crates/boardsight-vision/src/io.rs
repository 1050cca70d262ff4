//! JSON persistence for calibrations and parameter files.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::calibrator::CalibratedGrid;
use crate::params::{CalibrationParams, ExtractorParams};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Read and deserialize a JSON file.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Serialize `value` to a pretty-printed JSON file.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// A calibration saved for reuse across sessions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredCalibration {
    pub grid: CalibratedGrid,
    #[serde(default)]
    pub calibration: CalibrationParams,
    #[serde(default)]
    pub extractor: ExtractorParams,
}

impl StoredCalibration {
    pub fn new(grid: CalibratedGrid) -> Self {
        Self {
            grid,
            calibration: CalibrationParams::default(),
            extractor: ExtractorParams::default(),
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        write_json(self, path)
    }
}
