//! High-level facade for the `boardsight-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of the pipeline crates
//! - the capture stage ([`FrameGrabber`], [`CaptureSource`], [`FrameSlot`])
//! - [`Session`], which wires capture, extraction, tracking and a UCI engine
//!   into one analysis loop with an explicit start/stop lifecycle
//! - (feature `image`) grabbers that read screenshots from disk
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use boardsight::{ImageFileGrabber, ProcessLauncher, Session, SessionConfig, SessionEvent};
//! use boardsight::core::ScreenRect;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::default();
//! let launcher = Arc::new(ProcessLauncher::from_params(&config.engine));
//! let grabber = Arc::new(ImageFileGrabber::new("screen.png"));
//!
//! let mut session = Session::new(config, grabber, launcher)?;
//! session.select_region(ScreenRect::new(100, 100, 480, 480))?;
//! session.start()?;
//! for event in session.events() {
//!     if let SessionEvent::Recommendation(rec) = event {
//!         println!("play {}", rec.mv());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `boardsight::core`: board, move, FEN, frame and image types.
//! - `boardsight::vision`: region calibration and per-square extraction.
//! - `boardsight::tracker`: legal position tracking.
//! - `boardsight::engine`: UCI engine orchestration and strength shaping.

pub use boardsight_core as core;
pub use boardsight_engine as engine;
pub use boardsight_tracker as tracker;
pub use boardsight_vision as vision;

mod capture;
mod config;
mod session;

pub use boardsight_core::{BoardState, Move, ScreenRect};
pub use boardsight_engine::{
    EngineHealth, EngineParams, ProcessLauncher, RecommendationEvent, StrengthProfile,
};
pub use boardsight_tracker::{TrackerParams, TrackerState};
pub use boardsight_vision::{CalibratedGrid, Orientation, StoredCalibration};

pub use capture::{
    crop_region, CaptureError, CaptureNotice, CaptureSource, FrameGrabber, FrameSlot,
    VirtualScreen,
};
pub use config::{CaptureParams, SessionConfig};
pub use session::{Session, SessionError, SessionEvent, SessionStatus};

#[cfg(feature = "image")]
pub use capture::{load_rgb, save_rgb, ImageFileGrabber, ImageSequenceGrabber};

/// Route `log` output to stderr, or to a `tracing` subscriber when the
/// `tracing` feature is enabled.
pub fn init_logging(level: log::LevelFilter) {
    #[cfg(feature = "tracing")]
    {
        let _ = level;
        boardsight_core::init_tracing(false);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = boardsight_core::init_with_level(level);
    }
}
