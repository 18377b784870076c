//! Player-facing records the spin pipeline reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    pf::ClientSeedSource,
    slot::{CascadeOutcome, FreeSpinsSession, GameMode},
    Money,
};

/// A player's balance. Writes are compare-and-swap on `lock_version`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAccount {
    pub player_id: Uuid,
    pub balance: Money,
    pub lock_version: u64,
}

/// The game session a PF session is attached to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: Uuid,
    pub player_id: Uuid,
    pub is_active: bool,
}

/// Everything the caller needs to present and audit one executed spin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinOutcome {
    pub spin_id: Uuid,
    pub player_id: Uuid,
    pub game_session_id: Uuid,
    pub pf_session_id: Uuid,
    pub nonce: u64,
    pub spin_hash: String,
    pub prev_spin_hash: String,
    pub client_seed: String,
    pub client_seed_source: ClientSeedSource,
    pub reel_strip_config_id: String,
    pub game_mode: GameMode,
    pub is_free_spin: bool,
    pub bet: Money,
    /// Amount deducted from the balance (zero for free spins).
    pub cost: Money,
    pub result: CascadeOutcome,
    pub balance_after: Money,
    /// Free-spins state after this spin, when one was created, advanced or retriggered.
    pub free_spins: Option<FreeSpinsSession>,
    pub created_at: DateTime<Utc>,
}

impl SpinOutcome {
    pub fn total_win(&self) -> Money {
        self.result.total_win
    }
}

/// Running totals per player and game mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinStats {
    pub spins: u64,
    pub wagered: Money,
    pub won: Money,
    pub free_spins_triggered: u64,
}

impl SpinStats {
    /// Fold one spin into the totals. Saturates instead of failing: stats are advisory.
    pub fn record(&mut self, outcome: &SpinOutcome) {
        self.spins += 1;
        self.wagered = self
            .wagered
            .checked_add(outcome.cost)
            .unwrap_or(Money::from_minor(u64::MAX));
        self.won = self
            .won
            .checked_add(outcome.total_win())
            .unwrap_or(Money::from_minor(u64::MAX));
        if outcome.result.triggers_free_spins() {
            self.free_spins_triggered += 1;
        }
    }
}
