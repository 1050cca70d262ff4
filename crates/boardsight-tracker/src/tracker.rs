//! Position tracker state machine.
//!
//! ```text
//! Idle -> Calibrating -> Tracking <-> Stale
//! ```
//!
//! While tracking, every extraction cycle is compared against the last
//! committed position. A changed placement must repeat for
//! `confirm_frames` consecutive cycles; it is then matched against the legal
//! successors of the committed position by the squares each colour occupies,
//! with piece-kind disagreements as a tie-breaker. Exactly one best match is
//! committed. No match counts as a desync; a tie is discarded as ambiguous.

use std::sync::Arc;

use boardsight_core::{
    BoardReadings, BoardState, CastlingRights, Color, Move, Occupancy, Piece, PieceKind,
    ScreenRect, Square,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::oracle::{RulesError, RulesOracle};
use crate::params::TrackerParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    Idle,
    Calibrating,
    Tracking,
    /// Tracking with degraded confidence; not terminal.
    Stale,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("tracker is {0:?}, expected Calibrating")]
    NotCalibrating(TrackerState),
    #[error("board read incomplete: {unknown} unknown, {low_confidence} low-confidence squares")]
    InitialReadIncomplete { unknown: usize, low_confidence: usize },
    #[error("board read is not a playable position: {0}")]
    InvalidInitialPosition(String),
}

/// A committed ply: `mv` applied to `previous` yields `new`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommittedTransition {
    pub previous: BoardState,
    pub new: BoardState,
    pub mv: Move,
    /// Sequence number of `new` in the committed stream.
    pub position_seq: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Not tracking; readings were not looked at.
    Ignored,
    /// Some squares are `Unknown`; nothing can be concluded from this frame.
    Incomplete { unknown: usize },
    Unchanged,
    /// A diff is waiting for more confirming frames.
    Pending { streak: u32 },
    Committed(CommittedTransition),
    /// The diff matches no legal successor.
    Desync { count: u32 },
    /// Several successors fit equally well; frame discarded.
    Ambiguous { candidates: usize },
}

/// Result of one [`PositionTracker::observe`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    pub outcome: Outcome,
    /// `(from, to)` if the tracker changed state during this call.
    pub transition: Option<(TrackerState, TrackerState)>,
    /// Set on the call that crossed the desync threshold, whatever the
    /// state beforehand.
    pub recalibration_recommended: bool,
}

#[derive(Clone, Debug)]
struct PendingDiff {
    placement: [Occupancy; 64],
    streak: u32,
}

pub struct PositionTracker {
    params: TrackerParams,
    oracle: Arc<dyn RulesOracle>,
    state: TrackerState,
    region: Option<ScreenRect>,
    committed: Option<BoardState>,
    position_seq: u64,
    pending: Option<PendingDiff>,
    desync: u32,
}

impl PositionTracker {
    pub fn new(params: TrackerParams, oracle: Arc<dyn RulesOracle>) -> Self {
        Self {
            params,
            oracle,
            state: TrackerState::Idle,
            region: None,
            committed: None,
            position_seq: 0,
            pending: None,
            desync: 0,
        }
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Last committed position, if any.
    pub fn committed(&self) -> Option<&BoardState> {
        self.committed.as_ref()
    }

    /// Sequence number of the last committed position (0 before the first).
    pub fn position_seq(&self) -> u64 {
        self.position_seq
    }

    pub fn desync_count(&self) -> u32 {
        self.desync
    }

    /// Region of the calibration in progress or in use.
    pub fn region(&self) -> Option<ScreenRect> {
        self.region
    }

    /// A selection rectangle arrived; calibration is under way.
    pub fn begin_calibration(&mut self, rect: ScreenRect) {
        self.region = Some(rect);
        self.pending = None;
        self.desync = 0;
        self.set_state(TrackerState::Calibrating);
    }

    /// Calibration failed; the tracker keeps waiting for a corrected selection.
    pub fn calibration_failed(&mut self) {
        if self.state != TrackerState::Calibrating {
            log::warn!("calibration failure reported while {:?}", self.state);
        }
    }

    /// Calibration succeeded; `initial` becomes the first committed position.
    pub fn complete_calibration(&mut self, initial: BoardState) -> Result<u64, TrackerError> {
        if self.state != TrackerState::Calibrating {
            return Err(TrackerError::NotCalibrating(self.state));
        }
        self.oracle
            .legal_successors(&initial)
            .map_err(|e| TrackerError::InvalidInitialPosition(e.to_string()))?;
        self.committed = Some(initial);
        self.position_seq += 1;
        self.pending = None;
        self.desync = 0;
        self.set_state(TrackerState::Tracking);
        Ok(self.position_seq)
    }

    /// Calibration succeeded and the initial position is read from the board.
    ///
    /// Every square must be known with at least `read_min_confidence`.
    /// Castling rights are granted where king and rook stand on their home
    /// squares; the side to move comes from the parameters.
    pub fn complete_calibration_from_read(
        &mut self,
        readings: &BoardReadings,
    ) -> Result<u64, TrackerError> {
        if self.state != TrackerState::Calibrating {
            return Err(TrackerError::NotCalibrating(self.state));
        }
        let unknown = readings
            .iter()
            .filter(|r| !r.occupancy.is_known())
            .count();
        let low_confidence = readings
            .iter()
            .filter(|r| r.occupancy.is_known() && r.confidence < self.params.read_min_confidence)
            .count();
        if unknown > 0 || low_confidence > 0 {
            return Err(TrackerError::InitialReadIncomplete {
                unknown,
                low_confidence,
            });
        }

        let pieces = readings.map(|r| r.occupancy.piece());
        let castling = infer_castling(&pieces);
        let state = BoardState::from_parts(
            pieces,
            self.params.read_side_to_move,
            castling,
            None,
            0,
            1,
        )
        .map_err(|e| TrackerError::InvalidInitialPosition(e.to_string()))?;
        self.complete_calibration(state)
    }

    /// The grid was replaced externally; resume tracking from the committed position.
    pub fn recalibrated(&mut self) {
        self.pending = None;
        self.desync = 0;
        if self.state == TrackerState::Stale {
            self.set_state(TrackerState::Tracking);
        }
    }

    /// Feed one extraction cycle.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(state = ?self.state)))]
    pub fn observe(&mut self, readings: &BoardReadings) -> Observation {
        let before = self.state;
        let mut recalibration_recommended = false;
        let outcome = match (&self.committed, self.state) {
            (Some(_), TrackerState::Tracking | TrackerState::Stale) => {
                self.observe_tracking(readings, &mut recalibration_recommended)
            }
            _ => Outcome::Ignored,
        };
        let transition = (before != self.state).then_some((before, self.state));
        Observation {
            outcome,
            transition,
            recalibration_recommended,
        }
    }

    fn observe_tracking(
        &mut self,
        readings: &BoardReadings,
        recalibration_recommended: &mut bool,
    ) -> Outcome {
        let unknown = readings
            .iter()
            .filter(|r| !r.occupancy.is_known())
            .count();
        if unknown > 0 {
            self.pending = None;
            if unknown as f32 / 64.0 > self.params.max_unknown_fraction {
                self.set_state(TrackerState::Stale);
            }
            log::trace!("{unknown} unknown squares, frame skipped");
            return Outcome::Incomplete { unknown };
        }

        let Some(committed) = self.committed.clone() else {
            return Outcome::Ignored;
        };
        let observed = readings.map(|r| r.occupancy);
        if observed == committed.occupancies() {
            self.pending = None;
            self.desync = 0;
            if self.state == TrackerState::Stale {
                let min = self.params.recover_min_confidence;
                if readings.iter().all(|r| r.confidence >= min) {
                    log::info!("extraction agrees with the committed position again");
                    self.set_state(TrackerState::Tracking);
                } else {
                    log::trace!("agreement below {min} confidence, still stale");
                }
            }
            return Outcome::Unchanged;
        }

        let streak = match &mut self.pending {
            Some(p) if p.placement == observed => {
                p.streak += 1;
                p.streak
            }
            _ => {
                self.pending = Some(PendingDiff {
                    placement: observed,
                    streak: 1,
                });
                1
            }
        };
        if streak < self.params.confirm_frames {
            log::trace!("diff pending ({streak}/{})", self.params.confirm_frames);
            return Outcome::Pending { streak };
        }

        match self.resolve(&committed, &observed) {
            Ok(Resolution::Unique(mv, new)) => {
                self.pending = None;
                self.desync = 0;
                self.position_seq += 1;
                self.committed = Some(new.clone());
                if self.state == TrackerState::Stale {
                    self.set_state(TrackerState::Tracking);
                }
                log::info!("commit #{} {mv}: {}", self.position_seq, new.to_fen());
                Outcome::Committed(CommittedTransition {
                    previous: committed,
                    new,
                    mv,
                    position_seq: self.position_seq,
                })
            }
            Ok(Resolution::Tied(candidates)) => {
                log::debug!("ambiguous diff, {candidates} equally close successors");
                Outcome::Ambiguous { candidates }
            }
            Ok(Resolution::NoMatch) | Err(_) => {
                self.desync += 1;
                log::debug!("desync {} of {}", self.desync, self.params.desync_threshold);
                if self.desync == self.params.desync_threshold.saturating_add(1) {
                    log::warn!(
                        "{} unresolvable diffs in a row, recalibration recommended",
                        self.desync
                    );
                    self.set_state(TrackerState::Stale);
                    *recalibration_recommended = true;
                }
                Outcome::Desync { count: self.desync }
            }
        }
    }

    fn resolve(
        &self,
        committed: &BoardState,
        observed: &[Occupancy; 64],
    ) -> Result<Resolution, RulesError> {
        let successors = self.oracle.legal_successors(committed)?;
        let observed_colors = observed.map(Occupancy::color);

        let mut best: Vec<(Move, BoardState)> = Vec::new();
        let mut best_edits = usize::MAX;
        for (mv, next) in successors {
            let placement = next.occupancies();
            if placement.map(Occupancy::color) != observed_colors {
                continue;
            }
            let edits = placement
                .iter()
                .zip(observed.iter())
                .filter(|(a, b)| a != b)
                .count();
            if edits < best_edits {
                best_edits = edits;
                best.clear();
            }
            if edits == best_edits {
                best.push((mv, next));
            }
        }

        Ok(match best.len() {
            0 => Resolution::NoMatch,
            1 => {
                let (mv, next) = best.remove(0);
                Resolution::Unique(mv, next)
            }
            n => Resolution::Tied(n),
        })
    }

    fn set_state(&mut self, next: TrackerState) {
        if self.state != next {
            log::info!("tracker {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

enum Resolution {
    Unique(Move, BoardState),
    Tied(usize),
    NoMatch,
}

fn infer_castling(pieces: &[Option<Piece>; 64]) -> CastlingRights {
    let has = |file: u8, rank: u8, kind: PieceKind, color: Color| {
        pieces[Square::at(file, rank).index()] == Some(Piece::new(kind, color))
    };
    let white_king = has(4, 0, PieceKind::King, Color::White);
    let black_king = has(4, 7, PieceKind::King, Color::Black);
    CastlingRights {
        white_king_side: white_king && has(7, 0, PieceKind::Rook, Color::White),
        white_queen_side: white_king && has(0, 0, PieceKind::Rook, Color::White),
        black_king_side: black_king && has(7, 7, PieceKind::Rook, Color::Black),
        black_queen_side: black_king && has(0, 7, PieceKind::Rook, Color::Black),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn castling_rights_follow_home_squares() {
        let start = BoardState::starting_position();
        assert_eq!(infer_castling(start.pieces()), CastlingRights::ALL);

        let moved = BoardState::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBR1 w - - 0 1")
            .expect("fen");
        let rights = infer_castling(moved.pieces());
        assert!(!rights.white_king_side);
        assert!(rights.white_queen_side);
        assert!(rights.black_king_side && rights.black_queen_side);
    }
}
