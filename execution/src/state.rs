//! Collaborator seams.
//!
//! The execution layer never owns a database or cache connection. Callers inject
//! implementations of these traits; writes to shared records are compare-and-swap on the
//! record's `lock_version` and report a conflict as `Ok(false)`.

use anyhow::Result;
use fairreel_types::{
    ledger::{GameSession, PlayerAccount, SpinOutcome},
    pf::{PfSession, PfSessionRecord, PfSessionState, SessionAudit, SpinLog},
    slot::{FreeSpinsSession, GameMode, ReelStripSet},
    Money,
};
use std::future::Future;
use uuid::Uuid;

#[cfg(any(test, feature = "mocks"))]
use {
    anyhow::{anyhow, bail},
    fairreel_types::ledger::SpinStats,
    std::{
        collections::{HashMap, HashSet},
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Mutex, MutexGuard, PoisonError,
        },
    },
};

/// Authoritative PF session storage.
pub trait PfStore: Send + Sync {
    fn create_session(&self, record: PfSessionRecord) -> impl Future<Output = Result<()>> + Send;
    fn load_session(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<PfSessionRecord>>> + Send;
    fn active_session_for_player(
        &self,
        player_id: Uuid,
    ) -> impl Future<Output = Result<Option<PfSessionRecord>>> + Send;
    fn active_session_for_game(
        &self,
        game_session_id: Uuid,
    ) -> impl Future<Output = Result<Option<PfSessionRecord>>> + Send;

    /// Append `spin` and replace the session record in one transaction.
    fn commit_spin(
        &self,
        record: PfSessionRecord,
        expected_version: u64,
        spin: SpinLog,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Mark the session ended and write its audit record in one transaction.
    fn end_session(
        &self,
        record: PfSessionRecord,
        expected_version: u64,
        audit: SessionAudit,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn spin(
        &self,
        session_id: Uuid,
        spin_index: u64,
    ) -> impl Future<Output = Result<Option<SpinLog>>> + Send;
    fn spins(&self, session_id: Uuid) -> impl Future<Output = Result<Vec<SpinLog>>> + Send;
    fn audit(&self, session_id: Uuid)
        -> impl Future<Output = Result<Option<SessionAudit>>> + Send;
}

/// Low-latency session state. Purely advisory: every error is treated as a miss.
pub trait FastCache: Send + Sync {
    fn get_session(&self, id: Uuid)
        -> impl Future<Output = Result<Option<PfSessionState>>> + Send;
    fn get_player_session(
        &self,
        player_id: Uuid,
    ) -> impl Future<Output = Result<Option<PfSessionState>>> + Send;
    fn put_session(&self, state: &PfSessionState) -> impl Future<Output = Result<()>> + Send;
    fn evict_session(&self, session: &PfSession) -> impl Future<Output = Result<()>> + Send;
    fn get_free_spins(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<FreeSpinsSession>>> + Send;
    fn put_free_spins(
        &self,
        session: &FreeSpinsSession,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub trait Wallet: Send + Sync {
    fn account(
        &self,
        player_id: Uuid,
    ) -> impl Future<Output = Result<Option<PlayerAccount>>> + Send;
    fn commit_balance(
        &self,
        player_id: Uuid,
        expected_version: u64,
        balance: Money,
    ) -> impl Future<Output = Result<bool>> + Send;
}

pub trait GameSessions: Send + Sync {
    fn game_session(&self, id: Uuid)
        -> impl Future<Output = Result<Option<GameSession>>> + Send;
}

/// Reel strip sets by game mode. Callers verify checksums before use.
pub trait ReelStripRepository: Send + Sync {
    fn active_strips(
        &self,
        mode: GameMode,
    ) -> impl Future<Output = Result<Option<ReelStripSet>>> + Send;
    fn strips(
        &self,
        mode: GameMode,
        config_id: &str,
    ) -> impl Future<Output = Result<Option<ReelStripSet>>> + Send;
}

pub trait FreeSpinsStore: Send + Sync {
    fn load_free_spins(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<FreeSpinsSession>>> + Send;
    fn create_free_spins(
        &self,
        session: FreeSpinsSession,
    ) -> impl Future<Output = Result<()>> + Send;
    fn update_free_spins(
        &self,
        session: FreeSpinsSession,
        expected_version: u64,
    ) -> impl Future<Output = Result<bool>> + Send;
}

pub trait SpinHistory: Send + Sync {
    fn record_outcome(&self, outcome: &SpinOutcome) -> impl Future<Output = Result<()>> + Send;
}

pub trait StatsSink: Send + Sync {
    fn record_stats(&self, outcome: &SpinOutcome) -> impl Future<Output = Result<()>> + Send;
}

/// Everything the spin pipeline persists to.
pub trait Store:
    PfStore + Wallet + GameSessions + ReelStripRepository + FreeSpinsStore + SpinHistory + StatsSink
{
}

impl<T> Store for T where
    T: PfStore
        + Wallet
        + GameSessions
        + ReelStripRepository
        + FreeSpinsStore
        + SpinHistory
        + StatsSink
{
}

/// Operations [`Memory`] can be told to fail.
#[cfg(any(test, feature = "mocks"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateSession,
    CommitSpin,
    EndSession,
    CommitBalance,
    CreateFreeSpins,
    UpdateFreeSpins,
    History,
    Stats,
}

#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
struct Tables {
    sessions: HashMap<Uuid, PfSessionRecord>,
    spins: HashMap<Uuid, Vec<SpinLog>>,
    audits: HashMap<Uuid, SessionAudit>,
    accounts: HashMap<Uuid, PlayerAccount>,
    games: HashMap<Uuid, GameSession>,
    strips: HashMap<(GameMode, String), ReelStripSet>,
    active_strips: HashMap<GameMode, String>,
    free_spins: HashMap<Uuid, FreeSpinsSession>,
    history: Vec<SpinOutcome>,
    stats: HashMap<(Uuid, GameMode), SpinStats>,
}

/// In-memory [`Store`].
#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct Memory {
    tables: Mutex<Tables>,
    failing: Mutex<HashSet<FailPoint>>,
    balance_conflicts: AtomicUsize,
}

#[cfg(any(test, feature = "mocks"))]
impl Memory {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(&point) {
            bail!("injected failure: {point:?}");
        }
        Ok(())
    }

    pub fn fail(&self, point: FailPoint) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(point);
    }

    pub fn heal(&self, point: FailPoint) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&point);
    }

    /// Make the next `n` balance commits lose their compare-and-swap.
    pub fn force_balance_conflicts(&self, n: usize) {
        self.balance_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn insert_account(&self, player_id: Uuid, balance: Money) {
        self.tables().accounts.insert(
            player_id,
            PlayerAccount {
                player_id,
                balance,
                lock_version: 0,
            },
        );
    }

    pub fn balance(&self, player_id: Uuid) -> Option<Money> {
        self.tables()
            .accounts
            .get(&player_id)
            .map(|account| account.balance)
    }

    /// Simulate a concurrent writer touching the account.
    pub fn bump_account_version(&self, player_id: Uuid) {
        if let Some(account) = self.tables().accounts.get_mut(&player_id) {
            account.lock_version += 1;
        }
    }

    pub fn insert_game_session(&self, session: GameSession) {
        self.tables().games.insert(session.id, session);
    }

    /// Store a strip set; `active` makes it the set used for new spins in its mode.
    pub fn insert_strips(&self, set: ReelStripSet, active: bool) {
        let mut tables = self.tables();
        if active {
            tables
                .active_strips
                .insert(set.game_mode, set.config_id.clone());
        }
        tables
            .strips
            .insert((set.game_mode, set.config_id.clone()), set);
    }

    /// Apply `f` to a stored strip set without refreshing its checksum.
    pub fn tamper_strips(&self, mode: GameMode, config_id: &str, f: impl FnOnce(&mut ReelStripSet)) {
        if let Some(set) = self.tables().strips.get_mut(&(mode, config_id.to_string())) {
            f(set);
        }
    }

    pub fn tamper_spin(&self, session_id: Uuid, spin_index: u64, f: impl FnOnce(&mut SpinLog)) {
        if let Some(spin) = self
            .tables()
            .spins
            .get_mut(&session_id)
            .and_then(|spins| spins.iter_mut().find(|s| s.spin_index == spin_index))
        {
            f(spin);
        }
    }

    pub fn session_record(&self, id: Uuid) -> Option<PfSessionRecord> {
        self.tables().sessions.get(&id).cloned()
    }

    pub fn spin_count(&self, session_id: Uuid) -> usize {
        self.tables().spins.get(&session_id).map_or(0, Vec::len)
    }

    pub fn free_spins_for_game(&self, game_session_id: Uuid) -> Vec<FreeSpinsSession> {
        self.tables()
            .free_spins
            .values()
            .filter(|fs| fs.game_session_id == game_session_id)
            .cloned()
            .collect()
    }

    pub fn history(&self) -> Vec<SpinOutcome> {
        self.tables().history.clone()
    }

    pub fn stats(&self, player_id: Uuid, mode: GameMode) -> SpinStats {
        self.tables()
            .stats
            .get(&(player_id, mode))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(any(test, feature = "mocks"))]
impl PfStore for Memory {
    async fn create_session(&self, record: PfSessionRecord) -> Result<()> {
        self.check(FailPoint::CreateSession)?;
        let mut tables = self.tables();
        let player_id = record.session.player_id;
        if tables
            .sessions
            .values()
            .any(|r| r.session.player_id == player_id && r.session.is_active())
        {
            bail!("player {player_id} already has an active session");
        }
        tables.sessions.insert(record.session.id, record);
        Ok(())
    }

    async fn load_session(&self, id: Uuid) -> Result<Option<PfSessionRecord>> {
        Ok(self.tables().sessions.get(&id).cloned())
    }

    async fn active_session_for_player(&self, player_id: Uuid) -> Result<Option<PfSessionRecord>> {
        Ok(self
            .tables()
            .sessions
            .values()
            .find(|r| r.session.player_id == player_id && r.session.is_active())
            .cloned())
    }

    async fn active_session_for_game(
        &self,
        game_session_id: Uuid,
    ) -> Result<Option<PfSessionRecord>> {
        Ok(self
            .tables()
            .sessions
            .values()
            .find(|r| r.session.game_session_id == game_session_id && r.session.is_active())
            .cloned())
    }

    async fn commit_spin(
        &self,
        record: PfSessionRecord,
        expected_version: u64,
        spin: SpinLog,
    ) -> Result<bool> {
        self.check(FailPoint::CommitSpin)?;
        let mut tables = self.tables();
        let id = record.session.id;
        match tables.sessions.get(&id) {
            Some(stored) if stored.session.lock_version == expected_version => {}
            Some(_) => return Ok(false),
            None => return Err(anyhow!("session {id} not found")),
        }
        let spins = tables.spins.entry(id).or_default();
        if spins.iter().any(|s| s.spin_index == spin.spin_index) {
            bail!("spin {} already recorded for session {id}", spin.spin_index);
        }
        spins.push(spin);
        tables.sessions.insert(id, record);
        Ok(true)
    }

    async fn end_session(
        &self,
        record: PfSessionRecord,
        expected_version: u64,
        audit: SessionAudit,
    ) -> Result<bool> {
        self.check(FailPoint::EndSession)?;
        let mut tables = self.tables();
        let id = record.session.id;
        match tables.sessions.get(&id) {
            Some(stored) if stored.session.lock_version == expected_version => {}
            Some(_) => return Ok(false),
            None => return Err(anyhow!("session {id} not found")),
        }
        if tables.audits.contains_key(&id) {
            bail!("audit for session {id} already exists");
        }
        tables.audits.insert(id, audit);
        tables.sessions.insert(id, record);
        Ok(true)
    }

    async fn spin(&self, session_id: Uuid, spin_index: u64) -> Result<Option<SpinLog>> {
        Ok(self.tables().spins.get(&session_id).and_then(|spins| {
            spins
                .iter()
                .find(|s| s.spin_index == spin_index)
                .cloned()
        }))
    }

    async fn spins(&self, session_id: Uuid) -> Result<Vec<SpinLog>> {
        let mut spins = self
            .tables()
            .spins
            .get(&session_id)
            .cloned()
            .unwrap_or_default();
        spins.sort_by_key(|s| s.spin_index);
        Ok(spins)
    }

    async fn audit(&self, session_id: Uuid) -> Result<Option<SessionAudit>> {
        Ok(self.tables().audits.get(&session_id).cloned())
    }
}

#[cfg(any(test, feature = "mocks"))]
impl Wallet for Memory {
    async fn account(&self, player_id: Uuid) -> Result<Option<PlayerAccount>> {
        Ok(self.tables().accounts.get(&player_id).cloned())
    }

    async fn commit_balance(
        &self,
        player_id: Uuid,
        expected_version: u64,
        balance: Money,
    ) -> Result<bool> {
        self.check(FailPoint::CommitBalance)?;
        if self
            .balance_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(false);
        }
        let mut tables = self.tables();
        let Some(account) = tables.accounts.get_mut(&player_id) else {
            bail!("account {player_id} not found");
        };
        if account.lock_version != expected_version {
            return Ok(false);
        }
        account.balance = balance;
        account.lock_version += 1;
        Ok(true)
    }
}

#[cfg(any(test, feature = "mocks"))]
impl GameSessions for Memory {
    async fn game_session(&self, id: Uuid) -> Result<Option<GameSession>> {
        Ok(self.tables().games.get(&id).cloned())
    }
}

#[cfg(any(test, feature = "mocks"))]
impl ReelStripRepository for Memory {
    async fn active_strips(&self, mode: GameMode) -> Result<Option<ReelStripSet>> {
        let tables = self.tables();
        Ok(tables
            .active_strips
            .get(&mode)
            .and_then(|config_id| tables.strips.get(&(mode, config_id.clone())))
            .cloned())
    }

    async fn strips(&self, mode: GameMode, config_id: &str) -> Result<Option<ReelStripSet>> {
        Ok(self
            .tables()
            .strips
            .get(&(mode, config_id.to_string()))
            .cloned())
    }
}

#[cfg(any(test, feature = "mocks"))]
impl FreeSpinsStore for Memory {
    async fn load_free_spins(&self, id: Uuid) -> Result<Option<FreeSpinsSession>> {
        Ok(self.tables().free_spins.get(&id).cloned())
    }

    async fn create_free_spins(&self, session: FreeSpinsSession) -> Result<()> {
        self.check(FailPoint::CreateFreeSpins)?;
        self.tables().free_spins.insert(session.id, session);
        Ok(())
    }

    async fn update_free_spins(
        &self,
        session: FreeSpinsSession,
        expected_version: u64,
    ) -> Result<bool> {
        self.check(FailPoint::UpdateFreeSpins)?;
        let mut tables = self.tables();
        match tables.free_spins.get(&session.id) {
            Some(stored) if stored.lock_version == expected_version => {
                tables.free_spins.insert(session.id, session);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(anyhow!("free spins session {} not found", session.id)),
        }
    }
}

#[cfg(any(test, feature = "mocks"))]
impl SpinHistory for Memory {
    async fn record_outcome(&self, outcome: &SpinOutcome) -> Result<()> {
        self.check(FailPoint::History)?;
        self.tables().history.push(outcome.clone());
        Ok(())
    }
}

#[cfg(any(test, feature = "mocks"))]
impl StatsSink for Memory {
    async fn record_stats(&self, outcome: &SpinOutcome) -> Result<()> {
        self.check(FailPoint::Stats)?;
        self.tables()
            .stats
            .entry((outcome.player_id, outcome.game_mode))
            .or_default()
            .record(outcome);
        Ok(())
    }
}

/// In-memory [`FastCache`] that can be switched off to exercise store fallback.
#[cfg(any(test, feature = "mocks"))]
#[derive(Default)]
pub struct MemoryCache {
    sessions: Mutex<HashMap<Uuid, PfSessionState>>,
    players: Mutex<HashMap<Uuid, Uuid>>,
    free_spins: Mutex<HashMap<Uuid, FreeSpinsSession>>,
    unavailable: AtomicBool,
}

#[cfg(any(test, feature = "mocks"))]
impl MemoryCache {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.free_spins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn contains_session(&self, id: Uuid) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    fn available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("cache unavailable");
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "mocks"))]
impl FastCache for MemoryCache {
    async fn get_session(&self, id: Uuid) -> Result<Option<PfSessionState>> {
        self.available()?;
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn get_player_session(&self, player_id: Uuid) -> Result<Option<PfSessionState>> {
        self.available()?;
        let Some(id) = self
            .players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&player_id)
            .copied()
        else {
            return Ok(None);
        };
        self.get_session(id).await
    }

    async fn put_session(&self, state: &PfSessionState) -> Result<()> {
        self.available()?;
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.session.player_id, state.session.id);
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.session.id, state.clone());
        Ok(())
    }

    async fn evict_session(&self, session: &PfSession) -> Result<()> {
        self.available()?;
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session.id);
        let mut players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        if players.get(&session.player_id) == Some(&session.id) {
            players.remove(&session.player_id);
        }
        Ok(())
    }

    async fn get_free_spins(&self, id: Uuid) -> Result<Option<FreeSpinsSession>> {
        self.available()?;
        Ok(self
            .free_spins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }

    async fn put_free_spins(&self, session: &FreeSpinsSession) -> Result<()> {
        self.available()?;
        self.free_spins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id, session.clone());
        Ok(())
    }
}
