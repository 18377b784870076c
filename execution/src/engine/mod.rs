//! Slot math: reel stops, ways evaluation and cascades.
//!
//! Everything here is synchronous and pure given an RNG. The order in which the engine
//! consumes the RNG is part of the verifiable contract:
//!
//! 1. one draw per reel for the stop position, reels `0..5`;
//! 2. per cascade, one draw per emptied cell, reel-major, top to bottom.

mod cascade;
mod reels;
mod ways;

pub use cascade::CascadeEngine;
pub use reels::ReelGridGenerator;
pub use ways::{highlight, WinEvaluator};

use crate::rng::RngError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Rng(#[from] RngError),
    #[error("reel {reel} stop {position} is outside a strip of length {len}")]
    PositionOutOfRange {
        reel: usize,
        position: usize,
        len: usize,
    },
    #[error("grid must have 5 reels of {rows} rows")]
    InvalidGrid { rows: usize },
    #[error("win amount overflow")]
    Overflow,
    #[error("{count} scatters cannot trigger free spins (need {required})")]
    NotEnoughScatters { count: u32, required: u32 },
}
