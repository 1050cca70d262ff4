//! Board perception for boardsight.
//!
//! ## Quickstart
//!
//! ```
//! use boardsight_core::BoardState;
//! use boardsight_vision::{calibrate, BoardRenderer, CalibrationParams, Extractor, Orientation};
//! use nalgebra::Point2;
//!
//! let renderer = BoardRenderer::default();
//! let start = BoardState::starting_position();
//! let frame = renderer.frame(0, Point2::new(0, 0), start.pieces(), Orientation::WhiteAtBottom);
//! let rect = renderer.board_rect(Point2::new(0, 0));
//!
//! let grid = calibrate(rect, &[frame.clone()], &CalibrationParams::default()).unwrap();
//! let readings = Extractor::default().extract(&frame, &grid);
//! assert_eq!(readings.len(), 64);
//! ```
//!
//! Pipeline:
//! 1. [`calibrate`] partitions the selected rectangle into 64 cells, learns
//!    the square palette and one reference signature per cell from the
//!    starting position, and resolves which army is at the bottom.
//! 2. [`Extractor::extract`] turns one frame into 64 confidence-qualified
//!    readings; it is a pure function of `(frame, grid)`.
//! 3. [`ConfidencePolicy::apply`] adds the temporal rule: confident readings
//!    pass, doubtful ones reuse the committed position for a few frames and
//!    then decay to `Unknown`.

mod calibrator;
mod error;
mod extractor;
mod geometry;
mod io;
mod params;
mod policy;
mod reference;
mod render;
mod signature;

pub use calibrator::{calibrate, regrid, CalibratedGrid};
pub use error::CalibrationError;
pub use extractor::Extractor;
pub use geometry::{partition, shade_of, CellQuad, Orientation};
pub use io::{load_json, write_json, ConfigIoError, StoredCalibration};
pub use params::{CalibrationParams, ExtractorParams, FeatureWeights, SignatureParams};
pub use policy::ConfidencePolicy;
pub use reference::{Classification, Palette, ReferenceSample, ReferenceSet};
pub use render::BoardRenderer;
pub use signature::Signature;
