//! Core types shared by the boardsight pipeline.
//!
//! Board and move model (with FEN/coordinate notation), captured frames,
//! minimal pixel buffers and the projective helpers used to map board
//! coordinates onto the screen. Nothing here touches threads or I/O.

mod board;
mod fen;
mod frame;
mod homography;
mod image;
mod logger;
mod moves;

pub use board::{
    BoardError, BoardReadings, BoardState, CastlingRights, Color, Occupancy, Piece, PieceKind,
    Square, SquareParseError, SquareReading,
};
pub use fen::{placement as fen_placement, FenError};
pub use frame::{Frame, ScreenRect};
pub use homography::{homography_from_4pt, Homography};
pub use image::{luma, sample_bilinear, GrayImage, GrayImageView, RgbImage};
pub use moves::{Move, MoveParseError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
