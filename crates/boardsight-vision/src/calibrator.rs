//! Region calibration: grid partition, orientation and reference learning.
//!
//! Calibration assumes the board shows the standard starting position. The
//! sample frames are averaged to suppress capture noise, the square palette
//! is taken from the four empty middle rows, the back-rank occupancy pattern
//! is validated, the orientation is decided from the tone of the pieces on
//! the bottom two rows, and finally every cell contributes one reference
//! signature labelled with what the starting position says it shows.

use boardsight_core::{
    sample_bilinear, BoardState, Frame, GrayImage, GrayImageView, ScreenRect, Square,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CalibrationError;
use crate::geometry::{partition, shade_of, CellQuad, Orientation};
use crate::params::{CalibrationParams, SignatureParams};
use crate::reference::{Palette, ReferenceSet};
use crate::signature::{CellSampler, Signature};

/// Everything extraction needs to read the board inside one screen region.
///
/// Replaced wholesale on recalibration; never patched in place. Deserializing
/// runs [`CalibratedGrid::validate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCalibratedGrid")]
pub struct CalibratedGrid {
    pub region: ScreenRect,
    pub orientation: Orientation,
    /// 64 cell quads in screen coordinates, screen row-major.
    pub cells: Vec<CellQuad>,
    pub palette: Palette,
    pub references: ReferenceSet,
    pub signature: SignatureParams,
}

impl CalibratedGrid {
    /// Quad of the cell at screen `(row, col)`; `None` when the cell list is short.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> Option<&CellQuad> {
        self.cells.get((row & 7) * 8 + (col & 7))
    }

    /// Screen quad of the cell showing `sq`.
    pub fn quad_of(&self, sq: Square) -> Option<&CellQuad> {
        let (row, col) = self.orientation.cell_of(sq);
        self.cell(row, col)
    }

    /// Check a grid that did not come out of [`calibrate`] or [`regrid`].
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let invalid = |msg: String| Err(CalibrationError::InvalidGrid(msg));
        if self.region.is_empty() {
            return invalid(format!("region {:?} has zero area", self.region));
        }
        if self.cells.len() != 64 {
            return invalid(format!("{} cells, expected 64", self.cells.len()));
        }
        if let Some(i) = self
            .cells
            .iter()
            .position(|q| q.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()))
        {
            return invalid(format!("cell {i} has a non-finite corner"));
        }
        if !self.palette.shade.iter().all(|v| v.is_finite()) {
            return invalid("palette is not finite".into());
        }
        if self.references.is_empty() {
            return invalid("no reference signatures".into());
        }
        let sig = &self.signature;
        if sig.patch_px == 0
            || !(0.0..0.5).contains(&sig.inset_frac)
            || !sig.fg_threshold_rel.is_finite()
            || !sig.fg_threshold_min.is_finite()
        {
            return invalid(format!("signature parameters out of range: {sig:?}"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawCalibratedGrid {
    region: ScreenRect,
    orientation: Orientation,
    cells: Vec<CellQuad>,
    palette: Palette,
    references: ReferenceSet,
    signature: SignatureParams,
}

impl TryFrom<RawCalibratedGrid> for CalibratedGrid {
    type Error = CalibrationError;

    fn try_from(raw: RawCalibratedGrid) -> Result<Self, Self::Error> {
        let grid = Self {
            region: raw.region,
            orientation: raw.orientation,
            cells: raw.cells,
            palette: raw.palette,
            references: raw.references,
            signature: raw.signature,
        };
        grid.validate()?;
        Ok(grid)
    }
}

/// Build a [`CalibratedGrid`] for `rect` from frames showing the starting position.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(frames, params), fields(frames = frames.len()))
)]
pub fn calibrate(
    rect: ScreenRect,
    frames: &[Frame],
    params: &CalibrationParams,
) -> Result<CalibratedGrid, CalibrationError> {
    validate_region(&rect, params)?;
    let (origin, gray) = average_frames(frames, &rect)?;
    let cells = partition(&rect).ok_or(CalibrationError::DegenerateRegion(
        rect,
        "corners do not span a plane",
    ))?;
    let local: Vec<CellQuad> = cells.iter().map(|q| to_local(q, origin)).collect();
    let view = gray.view();

    let palette = estimate_palette(&view, &local);
    let threshold = palette.threshold(&params.signature);
    log::debug!(
        "palette light/dark {:.1}/{:.1}, background threshold {:.1}",
        palette.shade[0],
        palette.shade[1],
        threshold
    );

    let mut sampler = CellSampler::new(&params.signature);
    let mut signatures: Vec<Signature> = Vec::with_capacity(64);
    for (i, quad) in local.iter().enumerate() {
        let bg = palette.background(shade_of(i / 8, i % 8));
        let sig = sampler
            .signature(&view, quad, bg, threshold)
            .ok_or(CalibrationError::DegenerateRegion(rect, "cell quad is degenerate"))?;
        signatures.push(sig);
    }

    let expected_occupied = |row: usize| row < 2 || row > 5;
    let agrees: Vec<bool> = signatures
        .iter()
        .enumerate()
        .map(|(i, s)| (s.coverage > params.occupied_coverage) == expected_occupied(i / 8))
        .collect();
    let mismatches = agrees.iter().filter(|ok| !**ok).count();
    if mismatches > params.max_pattern_mismatches {
        return Err(CalibrationError::OrientationUnresolved {
            reason: format!(
                "{mismatches} cells disagree with the starting occupancy pattern (tolerance {})",
                params.max_pattern_mismatches
            ),
        });
    }

    let orientation = match params.orientation_hint {
        Some(o) => o,
        None => infer_orientation(&signatures, &agrees, params.min_tone_separation)?,
    };

    let start = BoardState::starting_position();
    let mut references = ReferenceSet::default();
    for (i, sig) in signatures.into_iter().enumerate() {
        if !agrees[i] {
            continue;
        }
        let sq = orientation.square_at(i / 8, i % 8);
        references.push(start.occupancy(sq), sig);
    }

    log::info!(
        "calibrated {}x{} region at ({}, {}): {:?}, {} references",
        rect.width,
        rect.height,
        rect.x,
        rect.y,
        orientation,
        references.samples.len()
    );

    Ok(CalibratedGrid {
        region: rect,
        orientation,
        cells,
        palette,
        references,
        signature: params.signature.clone(),
    })
}

/// Re-partition a new region while keeping the learned references and orientation.
///
/// Used when the board moved or was resized mid-game, where the starting
/// position can no longer be assumed.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(frames, previous, params), fields(frames = frames.len()))
)]
pub fn regrid(
    rect: ScreenRect,
    frames: &[Frame],
    previous: &CalibratedGrid,
    params: &CalibrationParams,
) -> Result<CalibratedGrid, CalibrationError> {
    validate_region(&rect, params)?;
    average_frames(frames, &rect)?;
    let cells = partition(&rect).ok_or(CalibrationError::DegenerateRegion(
        rect,
        "corners do not span a plane",
    ))?;
    log::info!(
        "regrid {}x{} at ({}, {}), keeping {:?}",
        rect.width,
        rect.height,
        rect.x,
        rect.y,
        previous.orientation
    );
    Ok(CalibratedGrid {
        region: rect,
        cells,
        ..previous.clone()
    })
}

fn validate_region(rect: &ScreenRect, params: &CalibrationParams) -> Result<(), CalibrationError> {
    if rect.is_empty() {
        return Err(CalibrationError::DegenerateRegion(*rect, "zero area"));
    }
    let (w, h) = (rect.width as f32, rect.height as f32);
    if w.min(h) / 8.0 < params.min_square_px {
        return Err(CalibrationError::DegenerateRegion(*rect, "squares too small"));
    }
    if w.max(h) / w.min(h) > params.max_aspect_ratio {
        return Err(CalibrationError::DegenerateRegion(*rect, "region is not square"));
    }
    Ok(())
}

/// Average the luma of all frames; they must cover the same screen area
/// and that area must contain `rect`.
fn average_frames(
    frames: &[Frame],
    rect: &ScreenRect,
) -> Result<(Point2<i32>, GrayImage), CalibrationError> {
    let first = frames.first().ok_or(CalibrationError::NoSampleFrames)?;
    let bounds = first.bounds();
    if frames.iter().any(|f| f.bounds() != bounds) {
        return Err(CalibrationError::FrameSizeMismatch);
    }
    if !bounds.contains(rect) {
        return Err(CalibrationError::RegionOutsideFrame {
            region: *rect,
            frame: bounds,
        });
    }
    if frames.len() == 1 {
        return Ok((first.origin, first.gray.as_ref().clone()));
    }

    let mut acc = vec![0u32; first.gray.data.len()];
    for f in frames {
        for (a, &v) in acc.iter_mut().zip(&f.gray.data) {
            *a += v as u32;
        }
    }
    let n = frames.len() as u32;
    let data = acc.into_iter().map(|a| ((a + n / 2) / n) as u8).collect();
    Ok((
        first.origin,
        GrayImage {
            width: first.gray.width,
            height: first.gray.height,
            data,
        },
    ))
}

pub(crate) fn to_local(q: &CellQuad, origin: Point2<i32>) -> CellQuad {
    q.map(|p| Point2::new(p.x - origin.x as f32, p.y - origin.y as f32))
}

/// Median luma of the centre of each middle-row cell, per shade.
fn estimate_palette(img: &GrayImageView<'_>, local: &[CellQuad]) -> Palette {
    let mut shade: [Vec<f32>; 2] = [Vec::new(), Vec::new()];
    for row in 2..6 {
        for col in 0..8 {
            let q = &local[row * 8 + col];
            for fy in [0.3_f32, 0.4, 0.5, 0.6, 0.7] {
                for fx in [0.3_f32, 0.4, 0.5, 0.6, 0.7] {
                    let p = bilerp_quad(q, fx, fy);
                    shade[shade_of(row, col)].push(sample_bilinear(img, p.x - 0.5, p.y - 0.5));
                }
            }
        }
    }
    Palette {
        shade: [median(&mut shade[0]), median(&mut shade[1])],
    }
}

fn bilerp_quad(q: &CellQuad, fx: f32, fy: f32) -> Point2<f32> {
    let top = q[0].coords.lerp(&q[1].coords, fx);
    let bottom = q[3].coords.lerp(&q[2].coords, fx);
    Point2::from(top.lerp(&bottom, fy))
}

fn median(v: &mut [f32]) -> f32 {
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    v[v.len() / 2]
}

/// White pieces are the lighter army; whichever pair of edge rows shows
/// the lighter pieces is the white side.
fn infer_orientation(
    signatures: &[Signature],
    agrees: &[bool],
    min_separation: f32,
) -> Result<Orientation, CalibrationError> {
    let mean_tone = |rows: std::ops::Range<usize>| {
        let (sum, n) = rows
            .flat_map(|r| (0..8).map(move |c| r * 8 + c))
            .filter(|&i| agrees[i])
            .fold((0.0_f32, 0usize), |(s, n), i| (s + signatures[i].mean_tone, n + 1));
        if n == 0 {
            None
        } else {
            Some(sum / n as f32)
        }
    };
    let (Some(top), Some(bottom)) = (mean_tone(0..2), mean_tone(6..8)) else {
        return Err(CalibrationError::OrientationUnresolved {
            reason: "no usable back-rank cells".to_string(),
        });
    };
    let diff = bottom - top;
    log::debug!("piece tone top {top:.1}, bottom {bottom:.1}");
    if diff >= min_separation {
        Ok(Orientation::WhiteAtBottom)
    } else if -diff >= min_separation {
        Ok(Orientation::BlackAtBottom)
    } else {
        Err(CalibrationError::OrientationUnresolved {
            reason: format!(
                "piece tones of the two armies differ by {:.1} (need {min_separation:.1})",
                diff.abs()
            ),
        })
    }
}
