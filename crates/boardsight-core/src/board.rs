//! Logical board model: squares, pieces, per-square occupancy and full positions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::fen::{self, FenError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub const ALL: [Color; 2] = [Color::White, Color::Black];

    #[inline]
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    pub const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ];

    /// Lowercase FEN/UCI letter.
    pub fn to_char(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    pub fn from_char(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
}

impl Piece {
    pub const fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color }
    }

    /// FEN letter: uppercase for white, lowercase for black.
    pub fn to_fen_char(self) -> char {
        let c = self.kind.to_char();
        match self.color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    pub fn from_fen_char(c: char) -> Option<Piece> {
        let kind = PieceKind::from_char(c)?;
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        Some(Piece { kind, color })
    }
}

/// Board square, indexed `rank * 8 + file` with `a1 = 0` and `h8 = 63`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
    pub fn new(file: u8, rank: u8) -> Option<Square> {
        (file < 8 && rank < 8).then_some(Square(rank * 8 + file))
    }

    /// Square from coordinates taken modulo 8.
    #[inline]
    pub const fn at(file: u8, rank: u8) -> Square {
        Square((rank & 7) * 8 + (file & 7))
    }

    pub fn from_index(index: usize) -> Option<Square> {
        (index < 64).then_some(Square(index as u8))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// File `0..8` (`a..h`).
    #[inline]
    pub fn file(self) -> u8 {
        self.0 % 8
    }

    /// Rank `0..8` (`1..8`).
    #[inline]
    pub fn rank(self) -> u8 {
        self.0 / 8
    }

    pub fn all() -> impl Iterator<Item = Square> {
        (0u8..64).map(Square)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            (b'a' + self.file()) as char,
            (b'1' + self.rank()) as char
        )
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid square {0:?}")]
pub struct SquareParseError(pub String);

impl FromStr for Square {
    type Err = SquareParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        if b.len() != 2 {
            return Err(SquareParseError(s.to_string()));
        }
        let file = b[0].wrapping_sub(b'a');
        let rank = b[1].wrapping_sub(b'1');
        Square::new(file, rank).ok_or_else(|| SquareParseError(s.to_string()))
    }
}

impl Serialize for Square {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Classified content of one square.
///
/// `Unknown` is a first-class value: it is never interchangeable with `Empty`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    Empty,
    Piece(Piece),
    Unknown,
}

impl Occupancy {
    #[inline]
    pub fn is_known(self) -> bool {
        !matches!(self, Occupancy::Unknown)
    }

    #[inline]
    pub fn piece(self) -> Option<Piece> {
        match self {
            Occupancy::Piece(p) => Some(p),
            _ => None,
        }
    }

    /// Color of the occupying piece, if any.
    #[inline]
    pub fn color(self) -> Option<Color> {
        self.piece().map(|p| p.color)
    }
}

impl From<Option<Piece>> for Occupancy {
    fn from(p: Option<Piece>) -> Self {
        match p {
            Some(p) => Occupancy::Piece(p),
            None => Occupancy::Empty,
        }
    }
}

/// Occupancy of one cell in one frame, with the classifier's confidence in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SquareReading {
    pub occupancy: Occupancy,
    pub confidence: f32,
}

impl SquareReading {
    pub const UNKNOWN: SquareReading = SquareReading {
        occupancy: Occupancy::Unknown,
        confidence: 0.0,
    };

    pub fn new(occupancy: Occupancy, confidence: f32) -> Self {
        Self {
            occupancy,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// One extraction cycle worth of readings, indexed by [`Square::index`].
pub type BoardReadings = [SquareReading; 64];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastlingRights {
    pub white_king_side: bool,
    pub white_queen_side: bool,
    pub black_king_side: bool,
    pub black_queen_side: bool,
}

impl CastlingRights {
    pub const ALL: CastlingRights = CastlingRights {
        white_king_side: true,
        white_queen_side: true,
        black_king_side: true,
        black_queen_side: true,
    };

    pub const NONE: CastlingRights = CastlingRights {
        white_king_side: false,
        white_queen_side: false,
        black_king_side: false,
        black_queen_side: false,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("{color:?} has {count} kings")]
    TooManyKings { color: Color, count: usize },
    #[error("{color:?} has {count} pieces (max 16)")]
    TooManyPieces { color: Color, count: usize },
    #[error(transparent)]
    Fen(#[from] FenError),
}

/// A complete chess position as committed by the tracker.
///
/// Invariants (checked by [`BoardState::from_parts`]): at most one king and
/// at most 16 pieces per color. Squares hold `Option<Piece>`, so a committed
/// position can never contain `Unknown`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoardState {
    pieces: [Option<Piece>; 64],
    side_to_move: Color,
    castling: CastlingRights,
    en_passant: Option<Square>,
    halfmove_clock: u32,
    fullmove_number: u32,
}

impl BoardState {
    pub fn from_parts(
        pieces: [Option<Piece>; 64],
        side_to_move: Color,
        castling: CastlingRights,
        en_passant: Option<Square>,
        halfmove_clock: u32,
        fullmove_number: u32,
    ) -> Result<Self, BoardError> {
        for color in Color::ALL {
            let mut count = 0usize;
            let mut kings = 0usize;
            for p in pieces.iter().flatten().filter(|p| p.color == color) {
                count += 1;
                if p.kind == PieceKind::King {
                    kings += 1;
                }
            }
            if kings > 1 {
                return Err(BoardError::TooManyKings {
                    color,
                    count: kings,
                });
            }
            if count > 16 {
                return Err(BoardError::TooManyPieces { color, count });
            }
        }
        Ok(Self {
            pieces,
            side_to_move,
            castling,
            en_passant,
            halfmove_clock,
            fullmove_number: fullmove_number.max(1),
        })
    }

    /// Standard initial position, white to move.
    pub fn starting_position() -> Self {
        const BACK: [PieceKind; 8] = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];
        let mut pieces = [None; 64];
        for file in 0..8usize {
            pieces[file] = Some(Piece::new(BACK[file], Color::White));
            pieces[8 + file] = Some(Piece::new(PieceKind::Pawn, Color::White));
            pieces[48 + file] = Some(Piece::new(PieceKind::Pawn, Color::Black));
            pieces[56 + file] = Some(Piece::new(BACK[file], Color::Black));
        }
        Self {
            pieces,
            side_to_move: Color::White,
            castling: CastlingRights::ALL,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }

    pub fn from_fen(s: &str) -> Result<Self, BoardError> {
        fen::parse(s)
    }

    pub fn to_fen(&self) -> String {
        fen::format(self)
    }

    #[inline]
    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.pieces[sq.index()]
    }

    #[inline]
    pub fn occupancy(&self, sq: Square) -> Occupancy {
        self.pieces[sq.index()].into()
    }

    pub fn pieces(&self) -> &[Option<Piece>; 64] {
        &self.pieces
    }

    /// Per-square occupancy in [`Square::index`] order.
    pub fn occupancies(&self) -> [Occupancy; 64] {
        self.pieces.map(Occupancy::from)
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline]
    pub fn castling(&self) -> CastlingRights {
        self.castling
    }

    #[inline]
    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    #[inline]
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    #[inline]
    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    /// True if both positions place the same pieces on the same squares.
    pub fn same_placement(&self, other: &BoardState) -> bool {
        self.pieces == other.pieces
    }

    /// Copy with a different side to move (used for board reads of unknown turn).
    pub fn with_side_to_move(mut self, side: Color) -> Self {
        self.side_to_move = side;
        self
    }
}

impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_fen())
    }
}

impl FromStr for BoardState {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BoardState::from_fen(s)
    }
}

impl Serialize for BoardState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_fen())
    }
}

impl<'de> Deserialize<'de> for BoardState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BoardState::from_fen(&s).map_err(serde::de::Error::custom)
    }
}
