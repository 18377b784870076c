use serde::{Deserialize, Serialize};

use super::{Symbol, Tile, REEL_COUNT};
use crate::Money;

/// Visible symbol window, indexed `[reel][row]` with row 0 at the top.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    reels: Vec<Vec<Symbol>>,
}

impl Grid {
    /// Build a grid from reel columns. Returns `None` unless there are exactly
    /// [`REEL_COUNT`] non-empty columns of equal height.
    pub fn from_columns(reels: Vec<Vec<Symbol>>) -> Option<Self> {
        let rows = reels.first().map(Vec::len)?;
        if reels.len() != REEL_COUNT || rows == 0 || reels.iter().any(|c| c.len() != rows) {
            return None;
        }
        Some(Self { reels })
    }

    pub fn rows(&self) -> usize {
        self.reels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn reel_count(&self) -> usize {
        self.reels.len()
    }

    pub fn column(&self, reel: usize) -> &[Symbol] {
        &self.reels[reel]
    }

    pub fn columns(&self) -> &[Vec<Symbol>] {
        &self.reels
    }

    pub fn get(&self, reel: usize, row: usize) -> Option<Symbol> {
        self.reels.get(reel).and_then(|c| c.get(row)).copied()
    }

    pub fn set(&mut self, reel: usize, row: usize, symbol: Symbol) {
        self.reels[reel][row] = symbol;
    }

    pub fn scatter_count(&self) -> u32 {
        self.reels
            .iter()
            .flatten()
            .filter(|symbol| symbol.is_scatter())
            .count() as u32
    }
}

/// A cell coordinate `(reel, row)`.
pub type Position = (u8, u8);

/// One ways win for a single paying tile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaysWin {
    pub symbol: Tile,
    /// Length of the contiguous run of reels starting at reel 0.
    pub count: u8,
    /// Product of per-reel matching cell counts across the run.
    pub ways: u32,
    /// Paytable value in hundredths of the bet.
    pub pay: u32,
    pub multiplier: u32,
    pub win_amount: Money,
    /// Every cell (wilds included) that contributed to the win.
    pub positions: Vec<Position>,
}

/// Snapshot of one cascade step: the wins evaluated at `multiplier`, and the grid after the
/// winning cells were removed, collapsed and refilled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeResult {
    /// 1-based cascade number within the spin.
    pub cascade: u32,
    pub multiplier: u32,
    pub wins: Vec<WaysWin>,
    pub cascade_win: Money,
    pub grid: Grid,
}

/// Complete result of running the cascade engine for one spin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    pub reel_positions: [usize; REEL_COUNT],
    pub initial_grid: Grid,
    pub cascades: Vec<CascadeResult>,
    /// The grid the engine stopped on.
    pub final_grid: Grid,
    pub total_win: Money,
    /// Scatters on the initial grid only.
    pub scatter_count: u32,
    pub free_spins_awarded: u32,
    /// Highest-priority winning tile across the spin, for presentation.
    pub highlight: Option<Tile>,
    /// True if the engine stopped because it hit the configured cascade limit.
    pub capped: bool,
    /// Wins still standing on `final_grid` when the limit was hit. Never paid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unpaid_wins: Vec<WaysWin>,
}

impl CascadeOutcome {
    pub fn is_win(&self) -> bool {
        !self.total_win.is_zero()
    }

    pub fn triggers_free_spins(&self) -> bool {
        self.free_spins_awarded > 0
    }
}
