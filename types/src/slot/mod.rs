//! Slot domain types.
//!
//! Defines symbols, reel strip sets, grids, win/cascade results and free-spins state used by the
//! execution layer and verifiers.

mod constants;
mod free_spins;
mod grid;
mod reels;
mod symbol;

pub use constants::*;
pub use free_spins::*;
pub use grid::*;
pub use reels::*;
pub use symbol::*;
