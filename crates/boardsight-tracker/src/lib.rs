//! Legal-move-constrained position tracking.
//!
//! [`PositionTracker`] consumes per-frame [`boardsight_core::BoardReadings`]
//! and emits a stream of committed positions in which every consecutive
//! pair is related by exactly one legal move. Chess rules come from a
//! [`RulesOracle`]; [`ShakmatyOracle`] is the stock implementation.
//!
//! ```
//! use std::sync::Arc;
//! use boardsight_core::{BoardState, ScreenRect, SquareReading};
//! use boardsight_tracker::{Outcome, PositionTracker, ShakmatyOracle, TrackerParams};
//!
//! let mut tracker = PositionTracker::new(TrackerParams::default(), Arc::new(ShakmatyOracle));
//! tracker.begin_calibration(ScreenRect::new(0, 0, 400, 400));
//! tracker.complete_calibration(BoardState::starting_position()).unwrap();
//!
//! let after = BoardState::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1").unwrap();
//! let readings = after.occupancies().map(|o| SquareReading::new(o, 1.0));
//! let mut last = None;
//! for _ in 0..3 {
//!     last = Some(tracker.observe(&readings).outcome);
//! }
//! assert!(matches!(last, Some(Outcome::Committed(_))));
//! assert_eq!(tracker.committed(), Some(&after));
//! ```

mod oracle;
mod params;
mod shakmaty_oracle;
mod tracker;

pub use oracle::{RulesError, RulesOracle};
pub use params::{InitialPosition, TrackerParams};
pub use shakmaty_oracle::ShakmatyOracle;
pub use tracker::{
    CommittedTransition, Observation, Outcome, PositionTracker, TrackerError, TrackerState,
};
