//! Screen-cell layout of the board and its mapping to logical squares.
//!
//! Screen cells are addressed `(row, col)` with row 0 at the top of the
//! selected region and col 0 at its left edge.

use boardsight_core::{homography_from_4pt, ScreenRect, Square};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Which army is drawn along the bottom edge of the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    WhiteAtBottom,
    BlackAtBottom,
}

impl Orientation {
    /// Logical square shown at screen cell `(row, col)`.
    pub fn square_at(self, row: usize, col: usize) -> Square {
        let (row, col) = ((row & 7) as u8, (col & 7) as u8);
        match self {
            Orientation::WhiteAtBottom => Square::at(col, 7 - row),
            Orientation::BlackAtBottom => Square::at(7 - col, row),
        }
    }

    /// Screen cell `(row, col)` showing `sq`.
    pub fn cell_of(self, sq: Square) -> (usize, usize) {
        let file = sq.file() as usize;
        let rank = sq.rank() as usize;
        match self {
            Orientation::WhiteAtBottom => (7 - rank, file),
            Orientation::BlackAtBottom => (rank, 7 - file),
        }
    }
}

/// Shade parity of a screen cell: `0` for the top-left shade, `1` for the other.
#[inline]
pub fn shade_of(row: usize, col: usize) -> usize {
    (row + col) % 2
}

/// Corners (TL, TR, BR, BL) of one screen cell in screen coordinates.
pub type CellQuad = [Point2<f32>; 4];

/// Partition `rect` into 64 cell quads, row-major in screen order.
///
/// Returns `None` for a rectangle the projective solver rejects.
pub fn partition(rect: &ScreenRect) -> Option<Vec<CellQuad>> {
    let board = [
        Point2::new(0.0_f32, 0.0),
        Point2::new(8.0, 0.0),
        Point2::new(8.0, 8.0),
        Point2::new(0.0, 8.0),
    ];
    let h = homography_from_4pt(&board, &rect.corners())?;

    let mut cells = Vec::with_capacity(64);
    for row in 0..8 {
        for col in 0..8 {
            let (x0, y0) = (col as f32, row as f32);
            cells.push([
                h.apply(Point2::new(x0, y0)),
                h.apply(Point2::new(x0 + 1.0, y0)),
                h.apply(Point2::new(x0 + 1.0, y0 + 1.0)),
                h.apply(Point2::new(x0, y0 + 1.0)),
            ]);
        }
    }
    Some(cells)
}
