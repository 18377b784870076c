//! Third-party verification wire format.
//!
//! ```json
//! {
//!   "session_id": "...",
//!   "server_seed": "<hex64, after reveal>",
//!   "server_seed_hash": "<hex64>",
//!   "spins": [{
//!     "spin_index": 0, "nonce": 1, "client_seed": "...",
//!     "spin_hash": "<hex64>", "prev_spin_hash": "<hex64>",
//!     "reel_positions": [0, 0, 0, 0, 0],
//!     "reel_strip_config_id": "...", "game_mode": "base", "is_free_spin": false,
//!     "voided": false
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ClientSeedSource, SessionAudit, SpinLog};
use crate::slot::{GameMode, REEL_COUNT};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPayload {
    pub session_id: Uuid,
    pub server_seed: String,
    pub server_seed_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta_commitment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theta_seed: Option<String>,
    pub spins: Vec<PayloadSpin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSpin {
    pub spin_index: u64,
    pub nonce: u64,
    pub client_seed: String,
    #[serde(default)]
    pub client_seed_source: ClientSeedSource,
    pub spin_hash: String,
    pub prev_spin_hash: String,
    pub reel_positions: [usize; REEL_COUNT],
    pub reel_strip_config_id: String,
    pub game_mode: GameMode,
    pub is_free_spin: bool,
    #[serde(default)]
    pub voided: bool,
}

impl From<&SpinLog> for PayloadSpin {
    fn from(log: &SpinLog) -> Self {
        Self {
            spin_index: log.spin_index,
            nonce: log.nonce,
            client_seed: log.client_seed.clone(),
            client_seed_source: log.client_seed_source,
            spin_hash: log.spin_hash.clone(),
            prev_spin_hash: log.prev_spin_hash.clone(),
            reel_positions: log.reel_positions,
            reel_strip_config_id: log.reel_strip_config_id.clone(),
            game_mode: log.game_mode,
            is_free_spin: log.is_free_spin,
            voided: log.voided,
        }
    }
}

impl VerificationPayload {
    /// Assemble the payload for an ended session from its audit record and spin log.
    pub fn from_audit(audit: &SessionAudit, spins: &[SpinLog]) -> Self {
        Self {
            session_id: audit.pf_session_id,
            server_seed: audit.server_seed.to_hex(),
            server_seed_hash: audit.server_seed_hash.clone(),
            theta_commitment: audit.theta_commitment.clone(),
            theta_seed: audit.theta_seed.clone(),
            spins: spins.iter().map(PayloadSpin::from).collect(),
        }
    }
}

/// Outcome of checking one spin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinCheck {
    pub spin_index: u64,
    pub nonce: u64,
    pub hash_valid: bool,
    /// `None` when reel positions were not checked (no reel strips available).
    pub positions_valid: Option<bool>,
    pub expected_spin_hash: String,
    pub expected_reel_positions: Option<[usize; REEL_COUNT]>,
}

impl SpinCheck {
    pub fn is_valid(&self) -> bool {
        self.hash_valid && self.positions_valid.unwrap_or(true)
    }
}

/// Verification result. Legitimate mismatches are reported here with `valid: false`,
/// never as errors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub commitment_valid: Option<bool>,
    pub theta_valid: Option<bool>,
    pub spins: Vec<SpinCheck>,
    pub first_invalid_spin: Option<u64>,
    pub diagnostics: Vec<String>,
}

impl VerificationReport {
    /// Recompute `valid` and `first_invalid_spin` from the collected checks.
    pub fn finish(mut self) -> Self {
        self.first_invalid_spin = self
            .spins
            .iter()
            .find(|check| !check.is_valid())
            .map(|check| check.spin_index);
        self.valid = self.commitment_valid.unwrap_or(true)
            && self.theta_valid.unwrap_or(true)
            && self.first_invalid_spin.is_none()
            && self.diagnostics.is_empty();
        self
    }

    pub fn diagnostic(&mut self, message: impl Into<String>) {
        self.diagnostics.push(message.into());
    }
}
