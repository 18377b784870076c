use crate::{
    config::{GameConfig, ServiceConfig, ValidatedGameConfig, ValidatedServiceConfig},
    orchestrator::{FreeSpinRequest, SpinOrchestrator, SpinRequest},
    rng::{RngError, SpinRng},
    state::{Memory, MemoryCache},
};
use fairreel_types::{
    ledger::GameSession,
    pf::PfSession,
    slot::{GameMode, Grid, ReelStripSet, Symbol, Tile},
    Money,
};
use std::sync::Arc;
use uuid::Uuid;

use Symbol::{Scatter, Wild};

/// Replays a fixed script of draws; each value is reduced modulo the requested bound.
pub struct ScriptedRng {
    script: Vec<usize>,
    next: usize,
}

impl ScriptedRng {
    pub fn new(script: impl Into<Vec<usize>>) -> Self {
        Self {
            script: script.into(),
            next: 0,
        }
    }

    pub fn consumed(&self) -> usize {
        self.next
    }
}

impl SpinRng for ScriptedRng {
    fn int(&mut self, bound: usize) -> Result<usize, RngError> {
        if bound == 0 {
            return Err(RngError::ZeroBound);
        }
        let value = self.script.get(self.next).ok_or(RngError::Exhausted {
            bound: bound as u64,
            stream: self.next as u64,
        })?;
        self.next += 1;
        Ok(value % bound)
    }
}

/// Shorthand for a plain tile symbol.
pub fn t(tile: Tile) -> Symbol {
    Symbol::Tile(tile)
}

/// Creates a grid from five reel columns (top row first).
pub fn grid(columns: [&[Symbol]; 5]) -> Grid {
    Grid::from_columns(columns.iter().map(|column| column.to_vec()).collect())
        .expect("fixture grid is well formed")
}

/// Creates a strip set for `mode`, stamped with its checksum.
pub fn strip_set(config_id: &str, mode: GameMode, strips: [&[Symbol]; 5]) -> ReelStripSet {
    ReelStripSet::new(
        config_id,
        mode,
        strips.iter().map(|strip| strip.to_vec()).collect(),
    )
    .expect("fixture strips are well formed")
}

/// Creates mixed strips with every symbol kind, for tests that only need a plausible reel set.
pub fn fixture_strips(mode: GameMode) -> ReelStripSet {
    use Tile::*;
    strip_set(
        &format!("fixture-{mode}-v1"),
        mode,
        [
            &[
                t(Fa), t(Ersuo), t(Zhong), t(Ertong), Wild, t(Bai), t(Santong), Scatter,
                t(Bawan), t(Wusuo), t(Wutong), Symbol::Gold(Fa), t(Ertong), t(Ersuo),
            ],
            &[
                t(Zhong), t(Santong), t(Fa), t(Wusuo), t(Ersuo), Scatter, t(Bai), t(Ertong),
                t(Wutong), Wild, t(Bawan), t(Ersuo), t(Santong),
            ],
            &[
                t(Bai), t(Wutong), t(Ersuo), t(Fa), Scatter, t(Zhong), t(Ertong), t(Bawan),
                t(Santong), t(Wusuo), Wild, t(Ertong),
            ],
            &[
                t(Bawan), t(Ertong), t(Wusuo), Symbol::Gold(Zhong), t(Santong), t(Fa), Wild,
                t(Ersuo), t(Bai), Scatter, t(Wutong),
            ],
            &[
                t(Wutong), t(Fa), t(Santong), t(Ersuo), t(Bai), t(Ertong), Scatter, t(Zhong),
                t(Wusuo), t(Bawan),
            ],
        ],
    )
}

/// Creates strips that can never win or trigger: reels 0 and 1 share no tile and hold no wild.
pub fn blank_strips(mode: GameMode) -> ReelStripSet {
    use Tile::*;
    strip_set(
        &format!("blank-{mode}-v1"),
        mode,
        [
            &[t(Fa), t(Zhong)],
            &[t(Bai), t(Bawan)],
            &[t(Wutong), t(Wusuo)],
            &[t(Santong), t(Ertong)],
            &[t(Ersuo), t(Fa)],
        ],
    )
}

/// Creates strips whose every grid wins `Fa` on three reels with all rows matching, and keeps
/// winning after every refill, so spins always run into the cascade cap.
pub fn winning_strips(mode: GameMode) -> ReelStripSet {
    use Tile::*;
    strip_set(
        &format!("winning-{mode}-v1"),
        mode,
        [
            &[t(Fa)],
            &[t(Fa)],
            &[t(Fa)],
            &[t(Zhong)],
            &[t(Bai)],
        ],
    )
}

/// Creates strips that show scatters on every cell of reels 0..3 and never win.
pub fn scatter_strips(mode: GameMode) -> ReelStripSet {
    use Tile::*;
    strip_set(
        &format!("scatter-{mode}-v1"),
        mode,
        [
            &[Scatter],
            &[Scatter],
            &[Scatter],
            &[t(Santong), t(Ertong)],
            &[t(Ersuo), t(Fa)],
        ],
    )
}

/// Creates the game math used by tests: defaults with a short cascade cap.
pub fn test_game_config() -> ValidatedGameConfig {
    GameConfig {
        max_cascades: 8,
        ..GameConfig::default()
    }
    .validate()
    .expect("test game config is valid")
}

/// Creates service settings with a fixed key and near-instant retries.
pub fn test_service_config() -> ValidatedServiceConfig {
    ServiceConfig {
        seed_encryption_key: hex::encode([0x42u8; 32]),
        cache_ttl_seconds: 60,
        store_retry_attempts: 2,
        store_retry_backoff_ms: 1,
    }
    .validate()
    .expect("test service config is valid")
}

/// A funded player with an active game session, wired to in-memory collaborators.
pub struct Harness {
    pub store: Arc<Memory>,
    pub cache: Arc<MemoryCache>,
    pub orchestrator: SpinOrchestrator<Memory, MemoryCache>,
    pub player_id: Uuid,
    pub game_session_id: Uuid,
}

impl Harness {
    /// Creates a harness with [`fixture_strips`] active in every mode.
    pub fn new(balance: Money) -> Self {
        Self::with_strips(
            balance,
            [
                fixture_strips(GameMode::Base),
                fixture_strips(GameMode::BonusBuy),
                fixture_strips(GameMode::FreeSpins),
            ],
        )
    }

    /// Creates a harness whose active strip set per mode comes from `strips`.
    pub fn with_strips(balance: Money, strips: impl IntoIterator<Item = ReelStripSet>) -> Self {
        let store = Arc::new(Memory::default());
        let cache = Arc::new(MemoryCache::default());
        let player_id = Uuid::new_v4();
        let game_session_id = Uuid::new_v4();
        store.insert_account(player_id, balance);
        store.insert_game_session(GameSession {
            id: game_session_id,
            player_id,
            is_active: true,
        });
        for set in strips {
            store.insert_strips(set, true);
        }
        let orchestrator = SpinOrchestrator::new(
            store.clone(),
            cache.clone(),
            test_game_config(),
            &test_service_config(),
        );
        Self {
            store,
            cache,
            orchestrator,
            player_id,
            game_session_id,
        }
    }

    pub async fn start_session(&self, theta_commitment: Option<&str>) -> PfSession {
        self.orchestrator
            .sessions()
            .start_session(self.player_id, self.game_session_id, theta_commitment)
            .await
            .expect("session starts")
    }

    pub fn spin(&self, bet: u64, mode: GameMode) -> SpinRequest {
        SpinRequest {
            player_id: self.player_id,
            game_session_id: self.game_session_id,
            bet: Money::from_minor(bet),
            game_mode: mode,
            client_seed: Some("player-seed".to_string()),
            theta_seed: None,
        }
    }

    pub fn free_spin(&self, free_spins_id: Uuid) -> FreeSpinRequest {
        FreeSpinRequest {
            player_id: self.player_id,
            game_session_id: self.game_session_id,
            free_spins_id,
            client_seed: Some("player-seed".to_string()),
            theta_seed: None,
        }
    }

    pub fn balance(&self) -> Money {
        self.store.balance(self.player_id).unwrap_or(Money::ZERO)
    }
}
