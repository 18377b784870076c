use fairreel_types::{
    slot::{GameMode, ReelStripError},
    Money, MoneyError,
};
use thiserror::Error;
use uuid::Uuid;

use crate::{cipher::CipherError, engine::EngineError, rng::RngError};

/// How a failure should be handled by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Request was invalid for the current state; nothing was mutated.
    Protocol,
    /// Contention or funds; a *fresh* attempt (new nonce) may succeed.
    Resource,
    /// Possible tampering or corruption; investigate.
    Integrity,
    /// A collaborator failed.
    Infra,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("pf session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("player {player_id} already has an active pf session {session_id}")]
    SessionAlreadyActive { player_id: Uuid, session_id: Uuid },
    #[error("pf session already ended: {0}")]
    SessionAlreadyEnded(Uuid),
    #[error("pf session is not active: {0}")]
    SessionInactive(Uuid),
    #[error("spin {spin_index} not found in pf session {session_id}")]
    SpinNotFound { session_id: Uuid, spin_index: u64 },
    #[error("pf session {0} has not revealed its server seed")]
    SeedNotRevealed(Uuid),
    #[error("theta seed required for the first spin of pf session {0}")]
    ThetaSeedRequired(Uuid),
    #[error("theta seed does not match the commitment of pf session {0}")]
    ThetaVerificationFailed(Uuid),
    #[error("theta commitment must be 64 hex characters")]
    InvalidThetaCommitment,
    #[error("no active pf session for game session {0}")]
    PfSessionRequired(Uuid),
    #[error("game session not found: {0}")]
    GameSessionNotFound(Uuid),
    #[error("game session {0} is not owned by the player")]
    GameSessionNotOwned(Uuid),
    #[error("game session is not active: {0}")]
    GameSessionInactive(Uuid),
    #[error("bet {bet} outside [{min}, {max}]")]
    InvalidBet { bet: Money, min: Money, max: Money },
    #[error("{0} spins cannot be requested directly")]
    InvalidGameMode(GameMode),
    #[error("no reel strips configured for {0}")]
    ReelStripsNotFound(GameMode),
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("optimistic lock conflict on {entity} {id}")]
    OptimisticLockConflict { entity: &'static str, id: Uuid },
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: Money, available: Money },
    #[error("free spins session not found: {0}")]
    FreeSpinsNotFound(Uuid),
    #[error("no free spins remaining in session {0}")]
    NoFreeSpinsRemaining(Uuid),
    #[error("server seed of pf session {0} does not match its commitment")]
    CommitmentMismatch(Uuid),
    #[error("hash chain mismatch in pf session {session_id} at spin {spin_index}")]
    HashChainMismatch { session_id: Uuid, spin_index: u64 },
    #[error(transparent)]
    ReelStrip(#[from] ReelStripError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Rng(#[from] RngError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error("store: {0:#}")]
    Store(#[source] anyhow::Error),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::SessionNotFound(_)
            | Error::SessionAlreadyActive { .. }
            | Error::SessionAlreadyEnded(_)
            | Error::SessionInactive(_)
            | Error::SpinNotFound { .. }
            | Error::SeedNotRevealed(_)
            | Error::ThetaSeedRequired(_)
            | Error::ThetaVerificationFailed(_)
            | Error::InvalidThetaCommitment
            | Error::PfSessionRequired(_)
            | Error::GameSessionNotFound(_)
            | Error::GameSessionNotOwned(_)
            | Error::GameSessionInactive(_)
            | Error::InvalidBet { .. }
            | Error::InvalidGameMode(_)
            | Error::NonceMismatch { .. }
            | Error::FreeSpinsNotFound(_)
            | Error::NoFreeSpinsRemaining(_) => ErrorClass::Protocol,
            Error::OptimisticLockConflict { .. }
            | Error::InsufficientBalance { .. }
            | Error::Rng(_) => ErrorClass::Resource,
            Error::Engine(EngineError::Rng(_)) => ErrorClass::Resource,
            Error::Engine(EngineError::NotEnoughScatters { .. }) => ErrorClass::Protocol,
            Error::Engine(_)
            | Error::CommitmentMismatch(_)
            | Error::HashChainMismatch { .. }
            | Error::ReelStrip(_)
            | Error::Cipher(_)
            | Error::Money(_) => ErrorClass::Integrity,
            Error::ReelStripsNotFound(_) | Error::Store(_) => ErrorClass::Infra,
        }
    }

    /// Whether a fresh attempt (never a replay of the same nonce) may succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Resource
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
