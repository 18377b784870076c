use fairreel_types::{
    slot::{CascadeOutcome, CascadeResult, GameMode, Grid, ReelStripSet, WaysWin, REEL_COUNT},
    Money,
};

use super::{highlight, EngineError, ReelGridGenerator, WinEvaluator};
use crate::{config::ValidatedGameConfig, rng::SpinRng};

/// Runs one spin: initial grid, then evaluate → remove → collapse → refill until no wins
/// remain or the configured cascade limit is reached.
///
/// `strips` must have passed [`ReelStripSet::verify`].
pub struct CascadeEngine<'a> {
    config: &'a ValidatedGameConfig,
    mode: GameMode,
    reels: ReelGridGenerator<'a>,
}

impl<'a> CascadeEngine<'a> {
    pub fn new(config: &'a ValidatedGameConfig, strips: &'a ReelStripSet, mode: GameMode) -> Self {
        Self {
            config,
            mode,
            reels: ReelGridGenerator::new(strips, config.rows),
        }
    }

    pub fn run<R: SpinRng>(&self, rng: &mut R, bet: Money) -> Result<CascadeOutcome, EngineError> {
        let (positions, grid) = self.reels.generate(rng)?;
        self.resolve(rng, positions, grid, bet)
    }

    /// Resolve cascades starting from an already drawn grid.
    pub fn resolve<R: SpinRng>(
        &self,
        rng: &mut R,
        reel_positions: [usize; REEL_COUNT],
        initial_grid: Grid,
        bet: Money,
    ) -> Result<CascadeOutcome, EngineError> {
        let evaluator = WinEvaluator::new(self.config);
        let scatter_count = initial_grid.scatter_count();
        let mut grid = initial_grid.clone();
        let mut cascades: Vec<CascadeResult> = Vec::new();
        let mut total_win = Money::ZERO;
        let mut unpaid_wins = Vec::new();

        loop {
            let step = cascades.len();
            let multiplier = self.config.multiplier_at(self.mode, step);
            let wins = evaluator.evaluate(&grid, bet, multiplier)?;
            if wins.is_empty() {
                break;
            }
            if step >= self.config.max_cascades as usize {
                unpaid_wins = wins;
                break;
            }

            let cascade_win =
                Money::sum(wins.iter().map(|win| win.win_amount)).map_err(|_| EngineError::Overflow)?;
            total_win = total_win
                .checked_add(cascade_win)
                .ok_or(EngineError::Overflow)?;
            grid = self.collapse_and_refill(&grid, &wins, rng)?;
            cascades.push(CascadeResult {
                cascade: step as u32 + 1,
                multiplier,
                wins,
                cascade_win,
                grid: grid.clone(),
            });
        }

        let highlight = highlight(
            &self.config.priority,
            cascades.iter().flat_map(|cascade| cascade.wins.iter()),
        );
        Ok(CascadeOutcome {
            reel_positions,
            initial_grid,
            cascades,
            final_grid: grid,
            total_win,
            scatter_count,
            free_spins_awarded: self.config.free_spins_award(scatter_count),
            highlight,
            capped: !unpaid_wins.is_empty(),
            unpaid_wins,
        })
    }

    /// Free spins for an explicit trigger attempt; fails below the scatter threshold.
    pub fn trigger_free_spins(&self, scatter_count: u32) -> Result<u32, EngineError> {
        if scatter_count < self.config.scatter_trigger {
            return Err(EngineError::NotEnoughScatters {
                count: scatter_count,
                required: self.config.scatter_trigger,
            });
        }
        Ok(self.config.free_spins_award(scatter_count))
    }

    fn collapse_and_refill<R: SpinRng>(
        &self,
        grid: &Grid,
        wins: &[WaysWin],
        rng: &mut R,
    ) -> Result<Grid, EngineError> {
        let rows = grid.rows();
        let mut removed = vec![vec![false; rows]; grid.reel_count()];
        for &(reel, row) in wins.iter().flat_map(|win| win.positions.iter()) {
            removed[reel as usize][row as usize] = true;
        }

        let mut columns = Vec::with_capacity(grid.reel_count());
        for (reel, column) in grid.columns().iter().enumerate() {
            // Survivors keep their order and fall to the bottom.
            let survivors: Vec<_> = column
                .iter()
                .enumerate()
                .filter(|(row, _)| !removed[reel][*row])
                .map(|(_, symbol)| *symbol)
                .collect();
            let mut next = Vec::with_capacity(rows);
            for _ in survivors.len()..rows {
                next.push(self.reels.refill_symbol(reel, rng)?);
            }
            next.extend(survivors);
            columns.push(next);
        }
        Grid::from_columns(columns).ok_or(EngineError::InvalidGrid { rows })
    }
}
