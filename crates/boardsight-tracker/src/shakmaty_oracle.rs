//! [`RulesOracle`] backed by `shakmaty`.
//!
//! Positions cross the boundary as FEN so the rest of the workspace never
//! depends on shakmaty types.

use boardsight_core::{BoardState, Move};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};

use crate::oracle::{RulesError, RulesOracle};

#[derive(Clone, Copy, Debug, Default)]
pub struct ShakmatyOracle;

impl ShakmatyOracle {
    pub fn new() -> Self {
        Self
    }
}

fn to_position(state: &BoardState) -> Result<Chess, RulesError> {
    let fen: Fen = state
        .to_fen()
        .parse()
        .map_err(|e: shakmaty::fen::ParseFenError| RulesError::InvalidPosition(e.to_string()))?;
    fen.into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| RulesError::InvalidPosition(e.to_string()))
}

fn from_position(pos: &Chess) -> Result<BoardState, RulesError> {
    let fen = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();
    BoardState::from_fen(&fen).map_err(|e| RulesError::InvalidPosition(e.to_string()))
}

fn to_move(m: &shakmaty::Move) -> Result<Move, RulesError> {
    let uci = m.to_uci(CastlingMode::Standard).to_string();
    uci.parse()
        .map_err(|_| RulesError::InvalidPosition(format!("unrepresentable move {uci}")))
}

impl RulesOracle for ShakmatyOracle {
    fn legal_successors(&self, state: &BoardState) -> Result<Vec<(Move, BoardState)>, RulesError> {
        let pos = to_position(state)?;
        let moves = pos.legal_moves();
        let mut out = Vec::with_capacity(moves.len());
        for m in &moves {
            let next = pos
                .clone()
                .play(m)
                .map_err(|e| RulesError::InvalidPosition(e.to_string()))?;
            out.push((to_move(m)?, from_position(&next)?));
        }
        Ok(out)
    }

    fn apply_move(&self, state: &BoardState, mv: &Move) -> Result<BoardState, RulesError> {
        let pos = to_position(state)?;
        let illegal = || RulesError::IllegalMove {
            mv: *mv,
            fen: state.to_fen(),
        };
        for m in &pos.legal_moves() {
            if to_move(m)? == *mv {
                let next = pos.clone().play(m).map_err(|_| illegal())?;
                return from_position(&next);
            }
        }
        Err(illegal())
    }
}
