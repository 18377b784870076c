use fairreel_types::slot::{Grid, ReelStripSet, Symbol, REEL_COUNT};

use super::EngineError;
use crate::rng::{RngError, SpinRng};

/// Draws reel stops and cuts the visible window out of a strip set.
pub struct ReelGridGenerator<'a> {
    strips: &'a ReelStripSet,
    rows: usize,
}

impl<'a> ReelGridGenerator<'a> {
    pub fn new(strips: &'a ReelStripSet, rows: usize) -> Self {
        Self { strips, rows }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// One stop per reel, strictly in reel order.
    pub fn draw_positions<R: SpinRng>(&self, rng: &mut R) -> Result<[usize; REEL_COUNT], RngError> {
        let mut positions = [0; REEL_COUNT];
        for (reel, position) in positions.iter_mut().enumerate() {
            *position = rng.int(self.strips.strip(reel).len())?;
        }
        Ok(positions)
    }

    /// Rows `strip[(stop + r) % len]` for `r in 0..rows`, wrapping around the strip.
    pub fn window(&self, positions: &[usize; REEL_COUNT]) -> Result<Grid, EngineError> {
        let mut columns = Vec::with_capacity(REEL_COUNT);
        for (reel, &position) in positions.iter().enumerate() {
            let strip = self.strips.strip(reel);
            if position >= strip.len() {
                return Err(EngineError::PositionOutOfRange {
                    reel,
                    position,
                    len: strip.len(),
                });
            }
            columns.push(
                (0..self.rows)
                    .map(|row| strip[(position + row) % strip.len()])
                    .collect(),
            );
        }
        Grid::from_columns(columns).ok_or(EngineError::InvalidGrid { rows: self.rows })
    }

    pub fn generate<R: SpinRng>(
        &self,
        rng: &mut R,
    ) -> Result<([usize; REEL_COUNT], Grid), EngineError> {
        let positions = self.draw_positions(rng)?;
        let grid = self.window(&positions)?;
        Ok((positions, grid))
    }

    /// A replacement symbol for an emptied cell on `reel`.
    pub fn refill_symbol<R: SpinRng>(&self, reel: usize, rng: &mut R) -> Result<Symbol, RngError> {
        let strip = self.strips.strip(reel);
        Ok(strip[rng.int(strip.len())?])
    }
}
