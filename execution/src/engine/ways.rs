use fairreel_types::{
    slot::{Grid, Position, Tile, WaysWin, MIN_WIN_COUNT},
    Money,
};

use super::EngineError;
use crate::config::ValidatedGameConfig;

/// Ways-to-win evaluation.
///
/// A tile wins when it (or a wild) occupies at least one cell on each of a run of
/// consecutive reels starting at reel 0. The run must contain at least one real tile, so a
/// run made only of wilds pays nothing on its own.
pub struct WinEvaluator<'a> {
    config: &'a ValidatedGameConfig,
}

impl<'a> WinEvaluator<'a> {
    pub fn new(config: &'a ValidatedGameConfig) -> Self {
        Self { config }
    }

    /// All wins on `grid`, in paytable order.
    pub fn evaluate(
        &self,
        grid: &Grid,
        bet: Money,
        multiplier: u32,
    ) -> Result<Vec<WaysWin>, EngineError> {
        let mut wins = Vec::new();
        for tile in Tile::ALL {
            let Some((count, ways, positions)) = run_for(grid, tile) else {
                continue;
            };
            let pay = self.config.pay(tile, count);
            if pay == 0 {
                continue;
            }
            let win_amount = bet
                .scaled_win(pay, ways, multiplier)
                .ok_or(EngineError::Overflow)?;
            wins.push(WaysWin {
                symbol: tile,
                count,
                ways,
                pay,
                multiplier,
                win_amount,
                positions,
            });
        }
        Ok(wins)
    }
}

fn run_for(grid: &Grid, tile: Tile) -> Option<(u8, u32, Vec<Position>)> {
    let mut count = 0u8;
    let mut ways = 1u32;
    let mut positions = Vec::new();
    let mut has_tile = false;
    for (reel, column) in grid.columns().iter().enumerate() {
        let before = positions.len();
        for (row, symbol) in column.iter().enumerate() {
            if symbol.matches(tile) {
                has_tile |= !symbol.is_wild();
                positions.push((reel as u8, row as u8));
            }
        }
        let matched = positions.len() - before;
        if matched == 0 {
            break;
        }
        count += 1;
        ways = ways.saturating_mul(matched as u32);
    }
    (count >= MIN_WIN_COUNT && has_tile).then_some((count, ways, positions))
}

/// The winning tile to feature, by `priority`; wilds never qualify.
pub fn highlight<'w>(
    priority: &[Tile],
    wins: impl IntoIterator<Item = &'w WaysWin>,
) -> Option<Tile> {
    let won: Vec<Tile> = wins.into_iter().map(|win| win.symbol).collect();
    priority.iter().copied().find(|tile| won.contains(tile))
}
