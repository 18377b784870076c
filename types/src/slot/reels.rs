use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{Symbol, REEL_COUNT};

/// Which reel set and pricing rules a spin is played under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Regular paid spin; deducts the bet.
    Base,
    /// Paid spin on the bonus-buy reel set; deducts `bet × buy_cost_multiplier`.
    BonusBuy,
    /// Awarded spin; no deduction, bet locked by the free-spins session.
    FreeSpins,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Base => "base",
            GameMode::BonusBuy => "bonus_buy",
            GameMode::FreeSpins => "free_spins",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ReelStripError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(GameMode::Base),
            "bonus_buy" => Ok(GameMode::BonusBuy),
            "free_spins" => Ok(GameMode::FreeSpins),
            other => Err(ReelStripError::UnknownGameMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReelStripError {
    #[error("expected {expected} reel strips, got {got}")]
    WrongReelCount { expected: usize, got: usize },
    #[error("reel {reel} strip is empty")]
    EmptyStrip { reel: usize },
    #[error("reel strip checksum mismatch for config {config_id} (expected {expected}, computed {computed})")]
    ChecksumMismatch {
        config_id: String,
        expected: String,
        computed: String,
    },
    #[error("unknown game mode: {0}")]
    UnknownGameMode(String),
}

/// The five ordered reel strips for one `(game mode, config id)` plus their integrity checksum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReelStripSet {
    pub config_id: String,
    pub game_mode: GameMode,
    pub strips: Vec<Vec<Symbol>>,
    pub checksum: String,
}

impl ReelStripSet {
    /// Build a set and stamp it with its computed checksum.
    pub fn new(
        config_id: impl Into<String>,
        game_mode: GameMode,
        strips: Vec<Vec<Symbol>>,
    ) -> Result<Self, ReelStripError> {
        validate_shape(&strips)?;
        let checksum = compute_checksum(&strips);
        Ok(Self {
            config_id: config_id.into(),
            game_mode,
            strips,
            checksum,
        })
    }

    /// Check shape and checksum. Any failure is an integrity error.
    pub fn verify(&self) -> Result<(), ReelStripError> {
        validate_shape(&self.strips)?;
        let computed = compute_checksum(&self.strips);
        if !computed.eq_ignore_ascii_case(&self.checksum) {
            return Err(ReelStripError::ChecksumMismatch {
                config_id: self.config_id.clone(),
                expected: self.checksum.clone(),
                computed,
            });
        }
        Ok(())
    }

    pub fn strip(&self, reel: usize) -> &[Symbol] {
        &self.strips[reel]
    }

    pub fn lengths(&self) -> [usize; REEL_COUNT] {
        let mut lengths = [0; REEL_COUNT];
        for (reel, strip) in self.strips.iter().enumerate().take(REEL_COUNT) {
            lengths[reel] = strip.len();
        }
        lengths
    }
}

fn validate_shape(strips: &[Vec<Symbol>]) -> Result<(), ReelStripError> {
    if strips.len() != REEL_COUNT {
        return Err(ReelStripError::WrongReelCount {
            expected: REEL_COUNT,
            got: strips.len(),
        });
    }
    if let Some(reel) = strips.iter().position(|strip| strip.is_empty()) {
        return Err(ReelStripError::EmptyStrip { reel });
    }
    Ok(())
}

/// SHA-256 (hex) over the canonical encoding `s,s,s|s,s|...` of the strips.
pub fn compute_checksum(strips: &[Vec<Symbol>]) -> String {
    let mut hasher = Sha256::new();
    for (reel, strip) in strips.iter().enumerate() {
        if reel > 0 {
            hasher.update(b"|");
        }
        for (idx, symbol) in strip.iter().enumerate() {
            if idx > 0 {
                hasher.update(b",");
            }
            hasher.update(symbol.to_string().as_bytes());
        }
    }
    hex::encode(hasher.finalize())
}
