/// Number of reels. Reel positions and strip sets always have this length.
pub const REEL_COUNT: usize = 5;

/// Default visible rows per reel.
pub const DEFAULT_ROWS: usize = 4;

/// Minimum run length (reels) that can pay.
pub const MIN_WIN_COUNT: u8 = 3;

/// Scatters on the initial grid needed to trigger free spins.
pub const SCATTER_TRIGGER_COUNT: u32 = 3;

/// Free spins awarded for exactly [`SCATTER_TRIGGER_COUNT`] scatters.
pub const FREE_SPINS_BASE_AWARD: u32 = 12;

/// Extra free spins for each scatter beyond the trigger count.
pub const FREE_SPINS_PER_EXTRA_SCATTER: u32 = 2;

/// Upper bound on cascades evaluated within one spin.
pub const DEFAULT_MAX_CASCADES: u32 = 64;

/// Cascade multipliers for paid spins; the last value repeats.
pub const BASE_MULTIPLIERS: [u32; 4] = [1, 2, 3, 5];

/// Cascade multipliers during free spins; the last value repeats.
pub const FREE_SPINS_MULTIPLIERS: [u32; 4] = [2, 4, 6, 10];

/// Cost of a bonus-buy spin, in bets.
pub const BONUS_BUY_COST_MULTIPLIER: u64 = 50;
