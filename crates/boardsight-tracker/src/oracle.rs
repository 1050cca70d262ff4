use boardsight_core::{BoardState, Move};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("position is not playable: {0}")]
    InvalidPosition(String),
    #[error("{mv} is not legal in {fen}")]
    IllegalMove { mv: Move, fen: String },
}

/// Chess rules consumed by the tracker.
///
/// Implementations must be pure: the same position always yields the same
/// successors, in the same order.
pub trait RulesOracle: Send + Sync {
    /// Every legal move from `state` with the position it produces.
    fn legal_successors(&self, state: &BoardState) -> Result<Vec<(Move, BoardState)>, RulesError>;

    /// Play `mv` on `state`.
    fn apply_move(&self, state: &BoardState, mv: &Move) -> Result<BoardState, RulesError>;
}
