//! The subset of the UCI text protocol used by the orchestrator.

use std::fmt;
use std::time::Duration;

use boardsight_core::{BoardState, Move};
use serde::{Deserialize, Serialize};

/// Centipawn value standing in for a forced mate when scores are compared.
pub const MATE_CP: i32 = 32_000;

/// Engine evaluation from the side to move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Centipawns(i32),
    /// Mate in `n` moves; negative when the side to move is getting mated.
    Mate(i32),
}

impl Score {
    /// Collapse onto a single centipawn scale; nearer mates rank further out.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp,
            Score::Mate(n) if n > 0 => MATE_CP - n,
            Score::Mate(n) => -MATE_CP - n,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawns(cp) => write!(f, "{:+.2}", *cp as f32 / 100.0),
            Score::Mate(n) => write!(f, "#{n}"),
        }
    }
}

/// One `info` line that carried a score and a principal variation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoLine {
    /// 1-based MultiPV rank; 1 when the engine did not say.
    pub multipv: usize,
    pub depth: Option<u32>,
    pub score: Score,
    pub pv: Vec<Move>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UciMessage {
    UciOk,
    ReadyOk,
    Info(InfoLine),
    /// `None` for `bestmove (none)` (no legal move).
    BestMove(Option<Move>),
    /// Anything else (`id`, `option`, bare `info string`, ...).
    Other,
}

impl UciMessage {
    /// Parse one engine output line.
    pub fn parse(line: &str) -> Result<UciMessage, String> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("uciok") => Ok(UciMessage::UciOk),
            Some("readyok") => Ok(UciMessage::ReadyOk),
            Some("bestmove") => match tokens.next() {
                None => Err(format!("bestmove without a move: {line:?}")),
                Some("(none)") | Some("0000") => Ok(UciMessage::BestMove(None)),
                Some(m) => m
                    .parse()
                    .map(|m| UciMessage::BestMove(Some(m)))
                    .map_err(|_| format!("bad bestmove {m:?}")),
            },
            Some("info") => Ok(parse_info(tokens)
                .map(UciMessage::Info)
                .unwrap_or(UciMessage::Other)),
            _ => Ok(UciMessage::Other),
        }
    }
}

fn parse_info<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Option<InfoLine> {
    let mut multipv = 1;
    let mut depth = None;
    let mut score = None;
    let mut pv = Vec::new();

    while let Some(tok) = tokens.next() {
        match tok {
            "depth" => depth = tokens.next().and_then(|v| v.parse().ok()),
            "multipv" => multipv = tokens.next().and_then(|v| v.parse().ok()).unwrap_or(1),
            "score" => {
                let kind = tokens.next();
                let value = tokens.next().and_then(|v| v.parse::<i32>().ok());
                score = match (kind, value) {
                    (Some("cp"), Some(v)) => Some(Score::Centipawns(v)),
                    (Some("mate"), Some(v)) => Some(Score::Mate(v)),
                    _ => None,
                };
            }
            // the remainder of the line is the variation
            "pv" => {
                pv = tokens.by_ref().map_while(|m| m.parse().ok()).collect();
                break;
            }
            "string" => return None,
            _ => {}
        }
    }

    let score = score?;
    if pv.is_empty() {
        return None;
    }
    Some(InfoLine {
        multipv,
        depth,
        score,
        pv,
    })
}

pub fn position_command(state: &BoardState) -> String {
    format!("position fen {}", state.to_fen())
}

pub fn go_command(think_time: Duration, max_depth: Option<u32>) -> String {
    let mut cmd = format!("go movetime {}", think_time.as_millis().max(1));
    if let Some(d) = max_depth {
        cmd.push_str(&format!(" depth {d}"));
    }
    cmd
}

pub fn setoption_command(name: &str, value: impl fmt::Display) -> String {
    format!("setoption name {name} value {value}")
}
