//! Spin execution: validation, balance settlement and bookkeeping around the engine.
//!
//! ## Atomicity
//!
//! Everything up to and including the balance write either happens completely or moves no
//! money: the engine runs on a prepared RNG and the only balance mutation is a single
//! compare-and-swap (`balance - cost + win`). Free spins additionally claim their spin up
//! front and release the claim if anything before the balance write fails.
//!
//! Rejections before the RNG is derived (theta, balance, strips) leave the PF session
//! untouched. A failure after it (engine error, balance conflict) appends a voided link
//! with no payout, so the retry draws the next nonce and a seen outcome is never replayed.
//!
//! Once the balance is committed the spin has happened. Recording it in the hash chain,
//! creating or settling free spins, history and stats are retried with backoff and then
//! logged and dropped; none of them can fail the spin.
//!
//! Spins on one PF session are serialized by [`SessionLocks`], so the nonce sequence has a
//! single writer per process. Conflicting writers elsewhere surface as
//! [`Error::OptimisticLockConflict`].

use chrono::Utc;
use fairreel_types::{
    ledger::{PlayerAccount, SpinOutcome},
    pf::{ClientSeedSource, PfSession, SessionAudit},
    slot::{CascadeOutcome, FreeSpinsSession, GameMode, ReelStripSet, REEL_COUNT},
    Money, MoneyError,
};
use rand::rngs::OsRng;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    backoff::{retry, retry_if},
    cipher::SeedCipher,
    config::{RetryPolicy, ValidatedGameConfig, ValidatedServiceConfig},
    engine::CascadeEngine,
    error::{Error, Result},
    hash_chain::generate_client_seed,
    session::{PreparedSpin, SessionManager},
    state::{FastCache, Store},
};

/// Entries kept before idle session locks are pruned.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// A paid spin.
#[derive(Clone, Debug)]
pub struct SpinRequest {
    pub player_id: Uuid,
    pub game_session_id: Uuid,
    pub bet: Money,
    /// [`GameMode::Base`] or [`GameMode::BonusBuy`].
    pub game_mode: GameMode,
    /// Player entropy for this spin; the server substitutes its own when absent.
    pub client_seed: Option<String>,
    /// Required on the first spin of a session created with a theta commitment.
    pub theta_seed: Option<String>,
}

/// One spin of an awarded free-spins session.
#[derive(Clone, Debug)]
pub struct FreeSpinRequest {
    pub player_id: Uuid,
    pub game_session_id: Uuid,
    pub free_spins_id: Uuid,
    pub client_seed: Option<String>,
    pub theta_seed: Option<String>,
}

/// Per-PF-session async locks.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= LOCK_PRUNE_THRESHOLD {
                // Only the map holds an idle lock.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(session_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A spin whose balance write has been committed.
struct Played {
    pf_session_id: Uuid,
    prepared: PreparedSpin,
    reel_strip_config_id: String,
    game_mode: GameMode,
    bet: Money,
    cost: Money,
    result: CascadeOutcome,
    balance_after: Money,
}

impl Played {
    fn into_outcome(
        self,
        player_id: Uuid,
        game_session_id: Uuid,
        free_spins: Option<FreeSpinsSession>,
    ) -> SpinOutcome {
        SpinOutcome {
            spin_id: Uuid::new_v4(),
            player_id,
            game_session_id,
            pf_session_id: self.pf_session_id,
            nonce: self.prepared.nonce,
            spin_hash: self.prepared.spin_hash().to_string(),
            prev_spin_hash: self.prepared.prev_spin_hash.clone(),
            client_seed: self.prepared.client_seed.clone(),
            client_seed_source: self.prepared.client_seed_source,
            reel_strip_config_id: self.reel_strip_config_id,
            game_mode: self.game_mode,
            is_free_spin: self.game_mode == GameMode::FreeSpins,
            bet: self.bet,
            cost: self.cost,
            result: self.result,
            balance_after: self.balance_after,
            free_spins,
            created_at: Utc::now(),
        }
    }
}

pub struct SpinOrchestrator<S, C> {
    store: Arc<S>,
    cache: Arc<C>,
    sessions: SessionManager<S, C>,
    game: ValidatedGameConfig,
    retry: RetryPolicy,
    locks: SessionLocks,
}

impl<S: Store, C: FastCache> SpinOrchestrator<S, C> {
    pub fn new(
        store: Arc<S>,
        cache: Arc<C>,
        game: ValidatedGameConfig,
        service: &ValidatedServiceConfig,
    ) -> Self {
        let cipher = SeedCipher::new(&service.seed_encryption_key);
        Self {
            sessions: SessionManager::new(store.clone(), cache.clone(), cipher),
            store,
            cache,
            game,
            retry: service.retry,
            locks: SessionLocks::default(),
        }
    }

    pub fn sessions(&self) -> &SessionManager<S, C> {
        &self.sessions
    }

    pub fn game_config(&self) -> &ValidatedGameConfig {
        &self.game
    }

    /// End a PF session once no spin on it is in flight.
    pub async fn end_session(&self, pf_session_id: Uuid) -> Result<SessionAudit> {
        let _guard = self.locks.acquire(pf_session_id).await;
        self.sessions.end_session(pf_session_id).await
    }

    /// Current free-spins state, served from the cache when possible.
    pub async fn free_spins(&self, id: Uuid) -> Result<FreeSpinsSession> {
        match self.cache.get_free_spins(id).await {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => {}
            Err(err) => warn!(free_spins = %id, ?err, "free spins cache read failed, using store"),
        }
        let session = self
            .store
            .load_free_spins(id)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::FreeSpinsNotFound(id))?;
        self.cache_free_spins(&session).await;
        Ok(session)
    }

    pub async fn execute_base_spin(&self, request: SpinRequest) -> Result<SpinOutcome> {
        let mode = request.game_mode;
        if mode == GameMode::FreeSpins {
            return Err(Error::InvalidGameMode(mode));
        }
        if !self.game.bet_in_range(request.bet) {
            return Err(Error::InvalidBet {
                bet: request.bet,
                min: self.game.min_bet,
                max: self.game.max_bet,
            });
        }
        let cost = self
            .game
            .cost(mode, request.bet)
            .ok_or(MoneyError::Overflow)?;

        let pf = self
            .authorize(request.player_id, request.game_session_id)
            .await?;
        let _guard = self.locks.acquire(pf.id).await;

        let played = self
            .play(
                &pf,
                mode,
                request.bet,
                cost,
                request.client_seed,
                request.theta_seed.as_deref(),
            )
            .await?;
        self.record(&played).await;

        let free_spins = if played.result.triggers_free_spins() {
            self.award_free_spins(&pf, &played).await
        } else {
            None
        };
        let outcome = played.into_outcome(request.player_id, request.game_session_id, free_spins);
        self.bookkeeping(&outcome).await;

        debug!(
            player = %outcome.player_id,
            pf_session = %outcome.pf_session_id,
            nonce = outcome.nonce,
            mode = %mode,
            cost = %outcome.cost,
            win = %outcome.total_win(),
            cascades = outcome.result.cascades.len(),
            "spin executed"
        );
        Ok(outcome)
    }

    pub async fn execute_free_spin(&self, request: FreeSpinRequest) -> Result<SpinOutcome> {
        let pf = self
            .authorize(request.player_id, request.game_session_id)
            .await?;
        let _guard = self.locks.acquire(pf.id).await;

        let id = request.free_spins_id;
        let current = self
            .store
            .load_free_spins(id)
            .await
            .map_err(Error::Store)?
            .filter(|fs| {
                fs.player_id == request.player_id && fs.game_session_id == request.game_session_id
            })
            .ok_or(Error::FreeSpinsNotFound(id))?;
        let claimed = current
            .claim_spin()
            .ok_or(Error::NoFreeSpinsRemaining(id))?;
        let stored = self
            .store
            .update_free_spins(claimed.clone(), current.lock_version)
            .await
            .map_err(Error::Store)?;
        if !stored {
            return Err(Error::OptimisticLockConflict {
                entity: "free_spins",
                id,
            });
        }

        // Until the balance write lands, every failure must hand the spin back.
        let played = match self
            .play(
                &pf,
                GameMode::FreeSpins,
                claimed.locked_bet,
                Money::ZERO,
                request.client_seed,
                request.theta_seed.as_deref(),
            )
            .await
        {
            Ok(played) => played,
            Err(err) => {
                self.release_free_spin(&claimed).await;
                return Err(err);
            }
        };
        self.record(&played).await;

        let settled = self.settle_free_spin(&claimed, &played.result).await;
        let outcome = played.into_outcome(request.player_id, request.game_session_id, Some(settled));
        self.bookkeeping(&outcome).await;

        debug!(
            player = %outcome.player_id,
            pf_session = %outcome.pf_session_id,
            free_spins = %id,
            nonce = outcome.nonce,
            win = %outcome.total_win(),
            "free spin executed"
        );
        Ok(outcome)
    }

    /// The active PF session the player may spin on in `game_session_id`.
    async fn authorize(&self, player_id: Uuid, game_session_id: Uuid) -> Result<PfSession> {
        let game = self
            .store
            .game_session(game_session_id)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::GameSessionNotFound(game_session_id))?;
        if game.player_id != player_id {
            return Err(Error::GameSessionNotOwned(game_session_id));
        }
        if !game.is_active {
            return Err(Error::GameSessionInactive(game_session_id));
        }
        self.sessions
            .active_session_for_game(game_session_id)
            .await?
            .filter(|pf| pf.player_id == player_id)
            .ok_or(Error::PfSessionRequired(game_session_id))
    }

    async fn active_strips(&self, mode: GameMode) -> Result<ReelStripSet> {
        let set = self
            .store
            .active_strips(mode)
            .await
            .map_err(Error::Store)?
            .ok_or(Error::ReelStripsNotFound(mode))?;
        if let Err(err) = set.verify() {
            error!(%mode, config_id = %set.config_id, %err, "reel strip integrity check failed");
            return Err(err.into());
        }
        Ok(set)
    }

    async fn account(&self, player_id: Uuid) -> Result<PlayerAccount> {
        Ok(self
            .store
            .account(player_id)
            .await
            .map_err(Error::Store)?
            .unwrap_or(PlayerAccount {
                player_id,
                balance: Money::ZERO,
                lock_version: 0,
            }))
    }

    /// Everything up to and including the balance write.
    async fn play(
        &self,
        pf: &PfSession,
        mode: GameMode,
        bet: Money,
        cost: Money,
        client_seed: Option<String>,
        theta_seed: Option<&str>,
    ) -> Result<Played> {
        let strips = self.active_strips(mode).await?;
        let account = self.account(pf.player_id).await?;
        if account.balance < cost {
            return Err(Error::InsufficientBalance {
                required: cost,
                available: account.balance,
            });
        }

        let (client_seed, source) = match client_seed.filter(|seed| !seed.is_empty()) {
            Some(seed) => (seed, ClientSeedSource::Player),
            None => (generate_client_seed(&mut OsRng), ClientSeedSource::Server),
        };
        let mut prepared = self
            .sessions
            .prepare_spin(pf.id, &client_seed, source, theta_seed)
            .await?;
        // From here on the nonce has been drawn: a failure burns it instead of leaving it
        // to be replayed.
        let result = match CascadeEngine::new(&self.game, &strips, mode).run(&mut prepared.rng, bet) {
            Ok(result) => result,
            Err(err) => {
                let err = Error::from(err);
                self.void(&prepared, [0; REEL_COUNT], &strips.config_id, mode, &err)
                    .await;
                return Err(err);
            }
        };
        let balance_after = match self.commit_balance(&account, cost, &result).await {
            Ok(balance_after) => balance_after,
            Err(err) => {
                self.void(&prepared, result.reel_positions, &strips.config_id, mode, &err)
                    .await;
                return Err(err);
            }
        };

        Ok(Played {
            pf_session_id: pf.id,
            prepared,
            reel_strip_config_id: strips.config_id,
            game_mode: mode,
            bet,
            cost,
            result,
            balance_after,
        })
    }

    /// Settle `cost` and `result.total_win` against the account in one compare-and-swap.
    async fn commit_balance(
        &self,
        account: &PlayerAccount,
        cost: Money,
        result: &CascadeOutcome,
    ) -> Result<Money> {
        let balance_after = account
            .balance
            .checked_sub(cost)
            .and_then(|balance| balance.checked_add(result.total_win))
            .ok_or(MoneyError::Overflow)?;
        let committed = self
            .store
            .commit_balance(account.player_id, account.lock_version, balance_after)
            .await
            .map_err(Error::Store)?;
        if !committed {
            return Err(Error::OptimisticLockConflict {
                entity: "account",
                id: account.player_id,
            });
        }
        Ok(balance_after)
    }

    /// Burn the nonce of a spin that failed before its balance write.
    async fn void(
        &self,
        prepared: &PreparedSpin,
        positions: [usize; REEL_COUNT],
        config_id: &str,
        mode: GameMode,
        cause: &Error,
    ) {
        let sessions = &self.sessions;
        let is_free_spin = mode == GameMode::FreeSpins;
        let voided = retry_if(
            &self.retry,
            "void_spin",
            |err: &Error| matches!(err, Error::Store(_)),
            move || sessions.void_spin(prepared, positions, config_id, mode, is_free_spin),
        )
        .await;
        match voided {
            Ok(_) => warn!(
                pf_session = %prepared.session.id,
                nonce = prepared.nonce,
                %cause,
                "spin voided"
            ),
            Err(err) => error!(
                pf_session = %prepared.session.id,
                nonce = prepared.nonce,
                %cause,
                %err,
                "failed to void spin, nonce may be replayed"
            ),
        }
    }

    /// Append the spin to the hash chain. Only store failures are worth retrying.
    async fn record(&self, played: &Played) {
        let sessions = &self.sessions;
        let prepared = &played.prepared;
        let positions = played.result.reel_positions;
        let config_id = played.reel_strip_config_id.as_str();
        let mode = played.game_mode;
        let is_free_spin = mode == GameMode::FreeSpins;
        let recorded = retry_if(
            &self.retry,
            "record_spin",
            |err: &Error| matches!(err, Error::Store(_)),
            move || sessions.record_spin(prepared, positions, config_id, mode, is_free_spin),
        )
        .await;
        if let Err(err) = recorded {
            error!(
                pf_session = %played.pf_session_id,
                nonce = prepared.nonce,
                spin_hash = %prepared.spin_hash(),
                %err,
                "spin settled but not recorded in the hash chain"
            );
        }
    }

    async fn award_free_spins(&self, pf: &PfSession, played: &Played) -> Option<FreeSpinsSession> {
        let session = FreeSpinsSession::new(
            pf.player_id,
            pf.game_session_id,
            pf.id,
            played.result.free_spins_awarded,
            played.bet,
            Utc::now(),
        );
        let store = self.store.as_ref();
        let pending = &session;
        let created = retry(&self.retry, "create_free_spins", move || {
            store.create_free_spins(pending.clone())
        })
        .await;
        match created {
            Ok(()) => {
                self.cache_free_spins(&session).await;
                info!(
                    player = %pf.player_id,
                    free_spins = %session.id,
                    awarded = session.total_awarded,
                    scatters = played.result.scatter_count,
                    "free spins awarded"
                );
                Some(session)
            }
            Err(err) => {
                warn!(player = %pf.player_id, ?err, "failed to create free spins session");
                None
            }
        }
    }

    async fn settle_free_spin(
        &self,
        claimed: &FreeSpinsSession,
        result: &CascadeOutcome,
    ) -> FreeSpinsSession {
        let Some(settled) = claimed.settle_spin(result.total_win, result.free_spins_awarded) else {
            error!(free_spins = %claimed.id, "free spins totals overflowed");
            return claimed.clone();
        };
        let store = self.store.as_ref();
        let expected = claimed.lock_version;
        let next = &settled;
        let written = retry(&self.retry, "update_free_spins", move || {
            store.update_free_spins(next.clone(), expected)
        })
        .await;
        match written {
            Ok(true) => {
                self.cache_free_spins(&settled).await;
                if result.free_spins_awarded > 0 {
                    info!(
                        free_spins = %settled.id,
                        retriggered = result.free_spins_awarded,
                        remaining = settled.remaining,
                        "free spins retriggered"
                    );
                }
                settled
            }
            Ok(false) => {
                warn!(free_spins = %claimed.id, "free spins changed concurrently, settlement dropped");
                claimed.clone()
            }
            Err(err) => {
                warn!(free_spins = %claimed.id, ?err, "failed to settle free spin");
                claimed.clone()
            }
        }
    }

    async fn release_free_spin(&self, claimed: &FreeSpinsSession) {
        let released = claimed.release_spin();
        let store = self.store.as_ref();
        let expected = claimed.lock_version;
        let next = &released;
        let written = retry(&self.retry, "release_free_spin", move || {
            store.update_free_spins(next.clone(), expected)
        })
        .await;
        match written {
            Ok(true) => {
                self.cache_free_spins(&released).await;
                debug!(free_spins = %claimed.id, "free spin claim released");
            }
            Ok(false) => error!(free_spins = %claimed.id, "free spin claim could not be released: conflict"),
            Err(err) => error!(free_spins = %claimed.id, ?err, "free spin claim could not be released"),
        }
    }

    async fn bookkeeping(&self, outcome: &SpinOutcome) {
        let store = self.store.as_ref();
        if let Err(err) = retry(&self.retry, "spin_history", move || store.record_outcome(outcome)).await {
            warn!(spin = %outcome.spin_id, ?err, "failed to record spin history");
        }
        if let Err(err) = retry(&self.retry, "spin_stats", move || store.record_stats(outcome)).await {
            warn!(spin = %outcome.spin_id, ?err, "failed to record spin stats");
        }
    }

    async fn cache_free_spins(&self, session: &FreeSpinsSession) {
        if let Err(err) = self.cache.put_free_spins(session).await {
            warn!(free_spins = %session.id, ?err, "free spins cache write failed");
        }
    }
}
