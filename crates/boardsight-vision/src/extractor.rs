use boardsight_core::{BoardReadings, Frame, Occupancy, SquareReading};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::calibrator::{to_local, CalibratedGrid};
use crate::geometry::shade_of;
use crate::params::ExtractorParams;
use crate::signature::CellSampler;

/// Per-frame board reader.
///
/// Output depends only on `(frame, grid)` and the extractor parameters:
/// readings below `tau_low` become `Unknown`, everything else keeps the best
/// reference label together with its confidence.
#[derive(Clone, Debug, Default)]
pub struct Extractor {
    params: ExtractorParams,
}

impl Extractor {
    pub fn new(params: ExtractorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ExtractorParams {
        &self.params
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame, grid), fields(seq = frame.seq))
    )]
    pub fn extract(&self, frame: &Frame, grid: &CalibratedGrid) -> BoardReadings {
        let mut out = [SquareReading::UNKNOWN; 64];
        if !frame.bounds().contains(&grid.region) {
            log::debug!(
                "frame {} does not cover region {:?}; all squares unknown",
                frame.seq,
                grid.region
            );
            return out;
        }

        let view = frame.gray.view();
        let threshold = grid.palette.threshold(&grid.signature);
        let mut sampler = CellSampler::new(&grid.signature);

        for row in 0..8 {
            for col in 0..8 {
                let Some(cell) = grid.cell(row, col) else {
                    continue;
                };
                let quad = to_local(cell, frame.origin);
                let bg = grid.palette.background(shade_of(row, col));
                let sq = grid.orientation.square_at(row, col);
                let Some(sig) = sampler.signature(&view, &quad, bg, threshold) else {
                    continue;
                };
                let c = grid.references.classify(
                    &sig,
                    &self.params.weights,
                    self.params.max_distance,
                );
                let occupancy = if c.confidence < self.params.tau_low {
                    Occupancy::Unknown
                } else {
                    c.occupancy
                };
                out[sq.index()] = SquareReading::new(occupancy, c.confidence);
            }
        }

        log::trace!(
            "frame {}: {} unknown squares",
            frame.seq,
            out.iter().filter(|r| !r.occupancy.is_known()).count()
        );
        out
    }
}
