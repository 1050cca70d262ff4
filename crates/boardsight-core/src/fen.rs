//! Forsyth–Edwards notation codec for [`BoardState`].
//!
//! Accepts either a full six-field FEN or just the placement field; missing
//! trailing fields default to `w - - 0 1`.

use crate::board::{BoardError, BoardState, CastlingRights, Color, Piece, Square};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("empty FEN")]
    Empty,
    #[error("placement must have 8 ranks, got {0}")]
    RankCount(usize),
    #[error("rank {rank} describes {files} files")]
    RankWidth { rank: usize, files: usize },
    #[error("invalid piece character {0:?}")]
    BadPiece(char),
    #[error("invalid side to move {0:?}")]
    BadSide(String),
    #[error("invalid castling field {0:?}")]
    BadCastling(String),
    #[error("invalid en passant field {0:?}")]
    BadEnPassant(String),
    #[error("invalid move counter {0:?}")]
    BadCounter(String),
}

pub(crate) fn parse(s: &str) -> Result<BoardState, BoardError> {
    let mut fields = s.split_whitespace();
    let placement = fields.next().ok_or(FenError::Empty)?;
    let pieces = parse_placement(placement)?;

    let side = match fields.next().unwrap_or("w") {
        "w" => Color::White,
        "b" => Color::Black,
        other => return Err(FenError::BadSide(other.to_string()).into()),
    };
    let castling = parse_castling(fields.next().unwrap_or("-"))?;
    let en_passant = match fields.next().unwrap_or("-") {
        "-" => None,
        sq => Some(
            sq.parse::<Square>()
                .map_err(|_| FenError::BadEnPassant(sq.to_string()))?,
        ),
    };
    let halfmove = parse_counter(fields.next().unwrap_or("0"))?;
    let fullmove = parse_counter(fields.next().unwrap_or("1"))?;

    BoardState::from_parts(pieces, side, castling, en_passant, halfmove, fullmove)
}

fn parse_placement(placement: &str) -> Result<[Option<Piece>; 64], FenError> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::RankCount(ranks.len()));
    }
    let mut pieces = [None; 64];
    // FEN lists rank 8 first.
    for (i, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - i;
        let mut file = 0usize;
        for c in rank_str.chars() {
            if let Some(d) = c.to_digit(10) {
                if d == 0 || d > 8 {
                    return Err(FenError::BadPiece(c));
                }
                file += d as usize;
            } else {
                let piece = Piece::from_fen_char(c).ok_or(FenError::BadPiece(c))?;
                if file < 8 {
                    pieces[rank * 8 + file] = Some(piece);
                }
                file += 1;
            }
            if file > 8 {
                return Err(FenError::RankWidth { rank: rank + 1, files: file });
            }
        }
        if file != 8 {
            return Err(FenError::RankWidth { rank: rank + 1, files: file });
        }
    }
    Ok(pieces)
}

fn parse_castling(field: &str) -> Result<CastlingRights, FenError> {
    let mut rights = CastlingRights::NONE;
    if field == "-" {
        return Ok(rights);
    }
    for c in field.chars() {
        match c {
            'K' => rights.white_king_side = true,
            'Q' => rights.white_queen_side = true,
            'k' => rights.black_king_side = true,
            'q' => rights.black_queen_side = true,
            _ => return Err(FenError::BadCastling(field.to_string())),
        }
    }
    Ok(rights)
}

fn parse_counter(field: &str) -> Result<u32, FenError> {
    field
        .parse()
        .map_err(|_| FenError::BadCounter(field.to_string()))
}

/// Placement field only (`rnbqkbnr/pppppppp/8/...`).
pub fn placement(board: &BoardState) -> String {
    let mut out = String::with_capacity(72);
    for rank in (0..8u8).rev() {
        let mut empty = 0;
        for file in 0..8u8 {
            let sq = Square::new(file, rank).map(|s| board.piece_at(s));
            match sq.flatten() {
                Some(p) => {
                    if empty > 0 {
                        out.push(char::from(b'0' + empty));
                        empty = 0;
                    }
                    out.push(p.to_fen_char());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            out.push(char::from(b'0' + empty));
        }
        if rank > 0 {
            out.push('/');
        }
    }
    out
}

pub(crate) fn format(board: &BoardState) -> String {
    let side = match board.side_to_move() {
        Color::White => "w",
        Color::Black => "b",
    };
    let c = board.castling();
    let mut castling = String::new();
    if c.white_king_side {
        castling.push('K');
    }
    if c.white_queen_side {
        castling.push('Q');
    }
    if c.black_king_side {
        castling.push('k');
    }
    if c.black_queen_side {
        castling.push('q');
    }
    if castling.is_empty() {
        castling.push('-');
    }
    let ep = board
        .en_passant()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {} {} {} {} {}",
        placement(board),
        side,
        castling,
        ep,
        board.halfmove_clock(),
        board.fullmove_number()
    )
}
