//! Deterministic synthetic board renderer.
//!
//! Draws flat squares and one outlined geometric glyph per piece kind
//! (pawn: small disk, knight: L, bishop: diamond, rook: square, queen:
//! triangle, king: cross). Used to exercise calibration and extraction
//! without a screen, and by the CLI to produce demo screenshots.

use boardsight_core::{BoardState, Color, Frame, Piece, PieceKind, RgbImage, ScreenRect};
use nalgebra::Point2;

use crate::geometry::{shade_of, Orientation};

#[derive(Clone, Debug, PartialEq)]
pub struct BoardRenderer {
    pub square_px: usize,
    /// Border drawn around the board, in pixels.
    pub margin: usize,
    pub light: [u8; 3],
    pub dark: [u8; 3],
    pub border: [u8; 3],
    pub white_fill: [u8; 3],
    pub black_fill: [u8; 3],
    pub outline: [u8; 3],
    pub outline_px: usize,
}

impl Default for BoardRenderer {
    fn default() -> Self {
        Self {
            square_px: 48,
            margin: 16,
            light: [238, 238, 210],
            dark: [118, 150, 86],
            border: [48, 46, 43],
            white_fill: [248, 248, 248],
            black_fill: [40, 40, 40],
            outline: [0, 0, 0],
            outline_px: 2,
        }
    }
}

impl BoardRenderer {
    /// Width and height of the rendered image.
    pub fn canvas_px(&self) -> usize {
        8 * self.square_px + 2 * self.margin
    }

    /// Screen rectangle covered by the board when the image is placed at `origin`.
    pub fn board_rect(&self, origin: Point2<i32>) -> ScreenRect {
        let side = (8 * self.square_px) as u32;
        ScreenRect::new(
            origin.x + self.margin as i32,
            origin.y + self.margin as i32,
            side,
            side,
        )
    }

    pub fn render(&self, board: &BoardState, orientation: Orientation) -> RgbImage {
        self.render_pieces(board.pieces(), orientation)
    }

    /// Render an arbitrary placement, including ones no legal game reaches.
    pub fn render_pieces(&self, pieces: &[Option<Piece>; 64], orientation: Orientation) -> RgbImage {
        let size = self.canvas_px();
        let mut img = RgbImage::filled(size, size, self.border);
        for row in 0..8 {
            for col in 0..8 {
                let sq = orientation.square_at(row, col);
                self.draw_cell(&mut img, row, col, pieces[sq.index()]);
            }
        }
        img
    }

    /// Render into a [`Frame`] captured at `origin`.
    pub fn frame(
        &self,
        seq: u64,
        origin: Point2<i32>,
        pieces: &[Option<Piece>; 64],
        orientation: Orientation,
    ) -> Frame {
        Frame::new(seq, origin, self.render_pieces(pieces, orientation))
    }

    fn draw_cell(&self, img: &mut RgbImage, row: usize, col: usize, piece: Option<Piece>) {
        let s = self.square_px;
        let x0 = self.margin + col * s;
        let y0 = self.margin + row * s;
        let bg = if shade_of(row, col) == 0 {
            self.light
        } else {
            self.dark
        };
        let t = self.outline_px as f32 / s as f32;

        for y in 0..s {
            for x in 0..s {
                let u = (x as f32 + 0.5) / s as f32;
                let v = (y as f32 + 0.5) / s as f32;
                let rgb = match piece {
                    Some(p) if glyph_contains(p.kind, u, v) => {
                        let edge = !glyph_contains(p.kind, u - t, v)
                            || !glyph_contains(p.kind, u + t, v)
                            || !glyph_contains(p.kind, u, v - t)
                            || !glyph_contains(p.kind, u, v + t);
                        if edge {
                            self.outline
                        } else {
                            match p.color {
                                Color::White => self.white_fill,
                                Color::Black => self.black_fill,
                            }
                        }
                    }
                    _ => bg,
                };
                img.put_pixel(x0 + x, y0 + y, rgb);
            }
        }
    }
}

/// Glyph membership in unit cell coordinates (`u` right, `v` down).
fn glyph_contains(kind: PieceKind, u: f32, v: f32) -> bool {
    let dx = u - 0.5;
    let dy = v - 0.5;
    match kind {
        PieceKind::Pawn => dx * dx + (v - 0.56) * (v - 0.56) <= 0.17 * 0.17,
        PieceKind::Knight => {
            ((0.30..=0.52).contains(&u) && (0.20..=0.80).contains(&v))
                || ((0.30..=0.74).contains(&u) && (0.58..=0.80).contains(&v))
        }
        PieceKind::Bishop => dx.abs() + dy.abs() <= 0.31,
        PieceKind::Rook => dx.abs() <= 0.24 && dy.abs() <= 0.24,
        PieceKind::Queen => {
            (0.18..=0.82).contains(&v) && dx.abs() <= 0.34 * (v - 0.18) / 0.64
        }
        PieceKind::King => {
            (dx.abs() <= 0.11 && dy.abs() <= 0.34) || (dy.abs() <= 0.11 && dx.abs() <= 0.34)
        }
    }
}
