//! Confidence hysteresis between raw readings and the tracker.

use boardsight_core::{BoardReadings, BoardState, Occupancy, Square, SquareReading};

use crate::params::ExtractorParams;

/// Applies the high-confidence threshold with per-square decay.
///
/// - `Unknown` stays `Unknown`;
/// - confidence `>= tau_high`: reading accepted, streak cleared;
/// - below it: the square reuses the last committed occupancy while its
///   streak of consecutive low-confidence frames is at most `decay_frames`,
///   then becomes `Unknown` until a confident reading arrives.
///
/// Without a committed position there is nothing to reuse, so low-confidence
/// squares are `Unknown` immediately.
#[derive(Clone, Debug)]
pub struct ConfidencePolicy {
    tau_high: f32,
    decay_frames: u32,
    streak: [u32; 64],
}

impl ConfidencePolicy {
    pub fn new(params: &ExtractorParams) -> Self {
        Self {
            tau_high: params.tau_high,
            decay_frames: params.decay_frames,
            streak: [0; 64],
        }
    }

    pub fn apply(
        &mut self,
        readings: &BoardReadings,
        committed: Option<&BoardState>,
    ) -> BoardReadings {
        let mut out = *readings;
        for (i, (r, o)) in readings.iter().zip(out.iter_mut()).enumerate() {
            if !r.occupancy.is_known() {
                self.streak[i] = self.streak[i].saturating_add(1);
                continue;
            }
            if r.confidence >= self.tau_high {
                self.streak[i] = 0;
                continue;
            }
            self.streak[i] = self.streak[i].saturating_add(1);
            let reused = committed
                .filter(|_| self.streak[i] <= self.decay_frames)
                .and_then(|b| Square::from_index(i).map(|sq| b.occupancy(sq)));
            *o = SquareReading::new(reused.unwrap_or(Occupancy::Unknown), r.confidence);
        }
        out
    }

    /// Forget all streaks (after recalibration).
    pub fn reset(&mut self) {
        self.streak = [0; 64];
    }

    pub fn streak(&self, sq: Square) -> u32 {
        self.streak[sq.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsight_core::{Color, Piece, PieceKind};

    fn e2() -> Square {
        "e2".parse().expect("square")
    }

    fn readings_with(sq: Square, r: SquareReading) -> BoardReadings {
        let mut out = [SquareReading::new(Occupancy::Empty, 1.0); 64];
        out[sq.index()] = r;
        out
    }

    #[test]
    fn confident_readings_pass_through() {
        let mut p = ConfidencePolicy::new(&ExtractorParams::default());
        let r = readings_with(e2(), SquareReading::new(Occupancy::Empty, 0.9));
        let out = p.apply(&r, Some(&BoardState::starting_position()));
        assert_eq!(out[e2().index()].occupancy, Occupancy::Empty);
    }

    #[test]
    fn mid_band_reuses_committed_then_decays_to_unknown() {
        let params = ExtractorParams {
            decay_frames: 2,
            ..ExtractorParams::default()
        };
        let mut p = ConfidencePolicy::new(&params);
        let start = BoardState::starting_position();
        let pawn = Occupancy::Piece(Piece::new(PieceKind::Pawn, Color::White));
        let r = readings_with(e2(), SquareReading::new(Occupancy::Empty, 0.4));

        assert_eq!(p.apply(&r, Some(&start))[e2().index()].occupancy, pawn);
        assert_eq!(p.apply(&r, Some(&start))[e2().index()].occupancy, pawn);
        assert_eq!(
            p.apply(&r, Some(&start))[e2().index()].occupancy,
            Occupancy::Unknown
        );
        assert_eq!(p.streak(e2()), 3);

        let confident = readings_with(e2(), SquareReading::new(Occupancy::Empty, 0.95));
        assert_eq!(
            p.apply(&confident, Some(&start))[e2().index()].occupancy,
            Occupancy::Empty
        );
        assert_eq!(p.streak(e2()), 0);
    }

    #[test]
    fn without_committed_state_low_confidence_is_unknown() {
        let mut p = ConfidencePolicy::new(&ExtractorParams::default());
        let r = readings_with(e2(), SquareReading::new(Occupancy::Empty, 0.4));
        assert_eq!(p.apply(&r, None)[e2().index()].occupancy, Occupancy::Unknown);
    }

    #[test]
    fn unknown_input_is_never_turned_into_empty() {
        let mut p = ConfidencePolicy::new(&ExtractorParams::default());
        let r = readings_with(e2(), SquareReading::UNKNOWN);
        let start = BoardState::starting_position();
        let out = p.apply(&r, Some(&start));
        assert_eq!(out[e2().index()].occupancy, Occupancy::Unknown);
    }
}
