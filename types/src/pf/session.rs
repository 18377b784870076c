use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::slot::{GameMode, REEL_COUNT};

/// Length of a hex-encoded SHA-256 digest or 256-bit seed.
pub const HEX64_LEN: usize = 64;

/// First nonce of every PF session.
pub const NONCE_START: u64 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    #[error("server seed must be {HEX64_LEN} hex characters (got {0})")]
    InvalidLength(usize),
    #[error("server seed is not valid hex")]
    InvalidHex,
}

/// Returns true for a lowercase or uppercase 64-character hex string.
pub fn is_hex64(value: &str) -> bool {
    value.len() == HEX64_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// The secret 256-bit server seed.
///
/// Hex encoded on the wire. `Debug` is redacted so the seed cannot leak through logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerSeed([u8; 32]);

impl ServerSeed {
    pub fn parse(value: &str) -> Result<Self, SeedError> {
        if value.len() != HEX64_LEN {
            return Err(SeedError::InvalidLength(value.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| SeedError::InvalidHex)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Lowercase hex text; the commitment and spin hashes are computed over this.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ServerSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServerSeed(<redacted>)")
    }
}

impl TryFrom<String> for ServerSeed {
    type Error = SeedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServerSeed> for String {
    fn from(seed: ServerSeed) -> Self {
        seed.to_hex()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PfSessionStatus {
    Active,
    Ended,
}

/// Dual-commitment progress: `Unset → Committed → Verified`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThetaState {
    Unset,
    Committed,
    Verified,
}

/// Where a spin's client seed came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSeedSource {
    #[default]
    Player,
    /// Substituted by the server because the caller supplied none.
    Server,
}

/// Public PF session state. Never carries the server seed itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfSession {
    pub id: Uuid,
    pub player_id: Uuid,
    pub game_session_id: Uuid,
    pub server_seed_hash: String,
    pub theta_commitment: Option<String>,
    pub theta_seed: Option<String>,
    pub theta_verified: bool,
    pub nonce_start: u64,
    /// Nonce of the last recorded spin; `nonce_start - 1` before the first spin.
    pub last_nonce: u64,
    pub last_spin_hash: String,
    pub status: PfSessionStatus,
    pub lock_version: u64,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl PfSession {
    pub fn is_active(&self) -> bool {
        self.status == PfSessionStatus::Active
    }

    pub fn next_nonce(&self) -> u64 {
        self.last_nonce + 1
    }

    pub fn total_spins(&self) -> u64 {
        (self.last_nonce + 1).saturating_sub(self.nonce_start)
    }

    pub fn theta_state(&self) -> ThetaState {
        match (&self.theta_commitment, self.theta_verified) {
            (Some(c), false) if !c.is_empty() => ThetaState::Committed,
            (Some(c), true) if !c.is_empty() => ThetaState::Verified,
            _ => ThetaState::Unset,
        }
    }

    /// True when the next spin must reveal and verify the theta seed first.
    pub fn requires_theta_reveal(&self) -> bool {
        self.next_nonce() == self.nonce_start && self.theta_state() == ThetaState::Committed
    }
}

/// Durable form of a session: public state plus the AES-GCM encrypted server seed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfSessionRecord {
    #[serde(flatten)]
    pub session: PfSession,
    #[serde(with = "hex_bytes")]
    pub encrypted_server_seed: Vec<u8>,
}

/// Fast-cache form of a session: public state plus the plaintext server seed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PfSessionState {
    #[serde(flatten)]
    pub session: PfSession,
    pub server_seed: ServerSeed,
}

/// Append-only record of one spin in the hash chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinLog {
    pub pf_session_id: Uuid,
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
    /// The spin was aborted after its randomness was derived and paid nothing. The link
    /// still holds so the nonce is never played twice; its reel positions are not checked.
    #[serde(default)]
    pub voided: bool,
    pub created_at: DateTime<Utc>,
}

/// Immutable proof artifact created once, when a session ends and its seed is revealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAudit {
    pub pf_session_id: Uuid,
    pub server_seed: ServerSeed,
    pub server_seed_hash: String,
    pub theta_commitment: Option<String>,
    pub theta_seed: Option<String>,
    pub total_spins: u64,
    pub revealed_at: DateTime<Utc>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        hex::decode(value).map_err(|_| serde::de::Error::custom("expected a hex string"))
    }
}
