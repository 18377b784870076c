//! PF session lifecycle over a durable store and an advisory fast cache.
//!
//! The store holds the server seed sealed with AES-256-GCM and is the only source of a
//! session's head. The cache holds the plaintext seed; a miss, a stale entry or an outage
//! only costs a decrypt, and the commitment is re-checked before the seed is used.

use chrono::Utc;
use fairreel_types::{
    pf::{
        is_hex64, ClientSeedSource, PfSession, PfSessionRecord, PfSessionState, PfSessionStatus,
        ServerSeed, SessionAudit, SpinLog, VerificationPayload, NONCE_START,
    },
    slot::{GameMode, REEL_COUNT},
};
use rand::rngs::OsRng;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    cipher::SeedCipher,
    error::{Error, Result},
    hash_chain::{
        generate_initial_prev_spin_hash, generate_server_seed, hash_server_seed,
        verify_commitment, verify_theta,
    },
    rng::HkdfStreamRng,
    state::{FastCache, PfStore},
};

/// A spin whose randomness is derived but which is not yet part of the chain.
pub struct PreparedSpin {
    pub session: PfSession,
    pub nonce: u64,
    pub prev_spin_hash: String,
    pub client_seed: String,
    pub client_seed_source: ClientSeedSource,
    pub rng: HkdfStreamRng,
    /// Theta seed verified for this spin; persisted when the spin is recorded.
    verified_theta: Option<String>,
    server_seed: ServerSeed,
}

impl PreparedSpin {
    pub fn spin_hash(&self) -> &str {
        self.rng.spin_hash()
    }

    pub fn spin_index(&self) -> u64 {
        self.nonce - self.session.nonce_start
    }
}

pub struct SessionManager<S, C> {
    store: Arc<S>,
    cache: Arc<C>,
    cipher: SeedCipher,
}

impl<S: PfStore, C: FastCache> SessionManager<S, C> {
    pub fn new(store: Arc<S>, cache: Arc<C>, cipher: SeedCipher) -> Self {
        Self {
            store,
            cache,
            cipher,
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Open a PF session. The server seed is generated only after the optional theta
    /// commitment has been accepted.
    pub async fn start_session(
        &self,
        player_id: Uuid,
        game_session_id: Uuid,
        theta_commitment: Option<&str>,
    ) -> Result<PfSession> {
        let theta_commitment = match theta_commitment.map(str::trim).filter(|c| !c.is_empty()) {
            Some(commitment) if is_hex64(commitment) => Some(commitment.to_ascii_lowercase()),
            Some(_) => return Err(Error::InvalidThetaCommitment),
            None => None,
        };
        if let Some(existing) = self
            .store
            .active_session_for_player(player_id)
            .await
            .map_err(Error::Store)?
        {
            return Err(Error::SessionAlreadyActive {
                player_id,
                session_id: existing.session.id,
            });
        }

        let server_seed = generate_server_seed(&mut OsRng);
        let server_seed_hash = hash_server_seed(&server_seed);
        let initial_hash =
            generate_initial_prev_spin_hash(&server_seed_hash, theta_commitment.as_deref());
        let id = Uuid::new_v4();
        let session = PfSession {
            id,
            player_id,
            game_session_id,
            server_seed_hash,
            theta_commitment,
            theta_seed: None,
            theta_verified: false,
            nonce_start: NONCE_START,
            last_nonce: NONCE_START - 1,
            last_spin_hash: initial_hash,
            status: PfSessionStatus::Active,
            lock_version: 0,
            created_at: Utc::now(),
            ended_at: None,
        };
        let record = PfSessionRecord {
            session: session.clone(),
            encrypted_server_seed: self.cipher.seal(id, &server_seed)?,
        };
        self.store
            .create_session(record)
            .await
            .map_err(Error::Store)?;
        self.cache_put(&PfSessionState {
            session: session.clone(),
            server_seed,
        })
        .await;

        info!(
            pf_session = %id,
            player = %player_id,
            game_session = %game_session_id,
            theta = session.theta_commitment.is_some(),
            "pf session started"
        );
        Ok(session)
    }

    /// Public state of a session. Never includes the server seed.
    pub async fn get_session_state(&self, id: Uuid) -> Result<PfSession> {
        Ok(self.load_state(id).await?.session)
    }

    pub async fn active_session_for_player(&self, player_id: Uuid) -> Result<Option<PfSession>> {
        match self.cache.get_player_session(player_id).await {
            Ok(Some(state)) if state.session.is_active() => return Ok(Some(state.session)),
            Ok(_) => {}
            Err(err) => warn!(player = %player_id, ?err, "session cache read failed, using store"),
        }
        Ok(self
            .store
            .active_session_for_player(player_id)
            .await
            .map_err(Error::Store)?
            .map(|record| record.session))
    }

    pub async fn active_session_for_game(&self, game_session_id: Uuid) -> Result<Option<PfSession>> {
        Ok(self
            .store
            .active_session_for_game(game_session_id)
            .await
            .map_err(Error::Store)?
            .map(|record| record.session))
    }

    /// Full state with the head (nonce, last hash, status) read from the store.
    ///
    /// The cache only saves the decrypt: a cached seed is used when it matches the stored
    /// commitment, and an entry whose head disagrees with the store is overwritten.
    pub(crate) async fn load_state(&self, id: Uuid) -> Result<PfSessionState> {
        let record = self
            .store
            .load_session(id)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::SessionNotFound(id))?;
        let cached = match self.cache.get_session(id).await {
            Ok(cached) => cached,
            Err(err) => {
                warn!(pf_session = %id, ?err, "session cache read failed, using store");
                None
            }
        };

        let state = match cached {
            Some(state) if state.session == record.session => return Ok(state),
            Some(state) if verify_commitment(&state.server_seed, &record.session.server_seed_hash) => {
                warn!(
                    pf_session = %id,
                    cached_nonce = state.session.last_nonce,
                    stored_nonce = record.session.last_nonce,
                    "stale session cache entry"
                );
                PfSessionState {
                    session: record.session,
                    server_seed: state.server_seed,
                }
            }
            _ => self.recover(record)?,
        };
        if state.session.is_active() {
            self.cache_put(&state).await;
        }
        Ok(state)
    }

    /// Rebuild full state from a durable record.
    pub(crate) fn recover(&self, record: PfSessionRecord) -> Result<PfSessionState> {
        let id = record.session.id;
        let server_seed = self
            .cipher
            .open(id, &record.encrypted_server_seed)
            .inspect_err(|err| error!(pf_session = %id, %err, "failed to open sealed server seed"))?;
        if !verify_commitment(&server_seed, &record.session.server_seed_hash) {
            error!(pf_session = %id, "sealed server seed does not match its commitment");
            return Err(Error::CommitmentMismatch(id));
        }
        Ok(PfSessionState {
            session: record.session,
            server_seed,
        })
    }

    /// Derive the random stream for the session's next nonce.
    ///
    /// On the first spin of a session with a theta commitment, `theta_seed` is verified
    /// before any randomness is derived; a mismatch leaves the session untouched.
    pub async fn prepare_spin(
        &self,
        session_id: Uuid,
        client_seed: &str,
        client_seed_source: ClientSeedSource,
        theta_seed: Option<&str>,
    ) -> Result<PreparedSpin> {
        let PfSessionState {
            session,
            server_seed,
        } = self.load_state(session_id).await?;
        if !session.is_active() {
            return Err(Error::SessionInactive(session_id));
        }

        let mut verified_theta = None;
        if session.requires_theta_reveal() {
            let theta = theta_seed
                .filter(|theta| !theta.is_empty())
                .ok_or(Error::ThetaSeedRequired(session_id))?;
            let commitment = session.theta_commitment.as_deref().unwrap_or_default();
            if !verify_theta(theta, commitment) {
                warn!(pf_session = %session_id, "theta seed does not match commitment");
                return Err(Error::ThetaVerificationFailed(session_id));
            }
            verified_theta = Some(theta.to_string());
        }

        let nonce = session.next_nonce();
        let rng = HkdfStreamRng::new(&server_seed, client_seed, nonce, &session.last_spin_hash)?;
        Ok(PreparedSpin {
            prev_spin_hash: session.last_spin_hash.clone(),
            nonce,
            client_seed: client_seed.to_string(),
            client_seed_source,
            rng,
            verified_theta,
            server_seed,
            session,
        })
    }

    /// Append a prepared spin to the chain and advance the session.
    pub async fn record_spin(
        &self,
        prepared: &PreparedSpin,
        reel_positions: [usize; REEL_COUNT],
        reel_strip_config_id: &str,
        game_mode: GameMode,
        is_free_spin: bool,
    ) -> Result<SpinLog> {
        self.append_spin(
            prepared,
            reel_positions,
            reel_strip_config_id,
            game_mode,
            is_free_spin,
            false,
        )
        .await
    }

    /// Burn a prepared spin that failed after its randomness was derived.
    ///
    /// The link is appended with `voided` set and no payout, so the next spin draws the
    /// following nonce instead of replaying this one. `reel_positions` are whatever the
    /// engine produced before failing, or zeros when it produced none.
    pub async fn void_spin(
        &self,
        prepared: &PreparedSpin,
        reel_positions: [usize; REEL_COUNT],
        reel_strip_config_id: &str,
        game_mode: GameMode,
        is_free_spin: bool,
    ) -> Result<SpinLog> {
        self.append_spin(
            prepared,
            reel_positions,
            reel_strip_config_id,
            game_mode,
            is_free_spin,
            true,
        )
        .await
    }

    async fn append_spin(
        &self,
        prepared: &PreparedSpin,
        reel_positions: [usize; REEL_COUNT],
        reel_strip_config_id: &str,
        game_mode: GameMode,
        is_free_spin: bool,
        voided: bool,
    ) -> Result<SpinLog> {
        let id = prepared.session.id;
        let record = self
            .store
            .load_session(id)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::SessionNotFound(id))?;
        let current = &record.session;
        if !current.is_active() {
            return Err(Error::SessionAlreadyEnded(id));
        }
        if prepared.nonce != current.next_nonce() {
            return Err(Error::NonceMismatch {
                expected: current.next_nonce(),
                got: prepared.nonce,
            });
        }
        if !prepared
            .prev_spin_hash
            .eq_ignore_ascii_case(&current.last_spin_hash)
        {
            error!(
                pf_session = %id,
                nonce = prepared.nonce,
                "prepared spin does not extend the stored chain"
            );
            return Err(Error::HashChainMismatch {
                session_id: id,
                spin_index: prepared.spin_index(),
            });
        }

        let expected_version = current.lock_version;
        let mut next = record.clone();
        if let Some(theta) = &prepared.verified_theta {
            next.session.theta_seed = Some(theta.clone());
            next.session.theta_verified = true;
        }
        next.session.last_nonce = prepared.nonce;
        next.session.last_spin_hash = prepared.spin_hash().to_string();
        next.session.lock_version += 1;

        let spin = SpinLog {
            pf_session_id: id,
            spin_index: prepared.spin_index(),
            nonce: prepared.nonce,
            client_seed: prepared.client_seed.clone(),
            client_seed_source: prepared.client_seed_source,
            spin_hash: prepared.spin_hash().to_string(),
            prev_spin_hash: prepared.prev_spin_hash.clone(),
            reel_positions,
            reel_strip_config_id: reel_strip_config_id.to_string(),
            game_mode,
            is_free_spin,
            voided,
            created_at: Utc::now(),
        };
        let committed = self
            .store
            .commit_spin(next.clone(), expected_version, spin.clone())
            .await
            .map_err(Error::Store)?;
        if !committed {
            return Err(Error::OptimisticLockConflict {
                entity: "pf_session",
                id,
            });
        }
        self.cache_put(&PfSessionState {
            session: next.session,
            server_seed: prepared.server_seed.clone(),
        })
        .await;

        debug!(
            pf_session = %id,
            nonce = spin.nonce,
            spin_hash = %spin.spin_hash,
            voided,
            "spin recorded"
        );
        Ok(spin)
    }

    /// End the session, reveal its seed and write the audit record.
    pub async fn end_session(&self, id: Uuid) -> Result<SessionAudit> {
        let record = self
            .store
            .load_session(id)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::SessionNotFound(id))?;
        if !record.session.is_active() {
            return Err(Error::SessionAlreadyEnded(id));
        }
        let expected_version = record.session.lock_version;
        let state = self.recover(record.clone())?;

        let now = Utc::now();
        let mut next = record;
        next.session.status = PfSessionStatus::Ended;
        next.session.ended_at = Some(now);
        next.session.lock_version += 1;
        let audit = SessionAudit {
            pf_session_id: id,
            server_seed: state.server_seed,
            server_seed_hash: next.session.server_seed_hash.clone(),
            theta_commitment: next.session.theta_commitment.clone(),
            theta_seed: next.session.theta_seed.clone(),
            total_spins: next.session.total_spins(),
            revealed_at: now,
        };
        let ended = self
            .store
            .end_session(next.clone(), expected_version, audit.clone())
            .await
            .map_err(Error::Store)?;
        if !ended {
            return Err(Error::OptimisticLockConflict {
                entity: "pf_session",
                id,
            });
        }
        if let Err(err) = self.cache.evict_session(&next.session).await {
            warn!(pf_session = %id, ?err, "session cache eviction failed");
        }

        info!(
            pf_session = %id,
            total_spins = audit.total_spins,
            "pf session ended, server seed revealed"
        );
        Ok(audit)
    }

    /// Third-party verification payload of an ended session.
    pub async fn verification_payload(&self, id: Uuid) -> Result<VerificationPayload> {
        let Some(audit) = self.store.audit(id).await.map_err(Error::Store)? else {
            let exists = self
                .store
                .load_session(id)
                .await
                .map_err(Error::Store)?
                .is_some();
            return Err(if exists {
                Error::SeedNotRevealed(id)
            } else {
                Error::SessionNotFound(id)
            });
        };
        let spins = self.store.spins(id).await.map_err(Error::Store)?;
        Ok(VerificationPayload::from_audit(&audit, &spins))
    }

    async fn cache_put(&self, state: &PfSessionState) {
        if let Err(err) = self.cache.put_session(state).await {
            warn!(pf_session = %state.session.id, ?err, "session cache write failed");
        }
    }
}
