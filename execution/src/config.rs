use fairreel_types::{
    slot::{
        GameMode, Tile, BASE_MULTIPLIERS, BONUS_BUY_COST_MULTIPLIER, DEFAULT_MAX_CASCADES,
        DEFAULT_ROWS, FREE_SPINS_BASE_AWARD, FREE_SPINS_MULTIPLIERS, FREE_SPINS_PER_EXTRA_SCATTER,
        MIN_WIN_COUNT, REEL_COUNT, SCATTER_TRIGGER_COUNT,
    },
    Money,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, num::NonZeroUsize, path::Path, time::Duration};
use thiserror::Error;

/// Pays for 3, 4 and 5 of a kind, in hundredths of the bet.
pub type Pays = [u32; REEL_COUNT - MIN_WIN_COUNT as usize + 1];

const MAX_ROWS: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field} must be <= {max} (got {value})")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be non-decreasing")]
    NotMonotonic { field: &'static str },
    #[error("paytable has no entry for {0}")]
    MissingPay(Tile),
    #[error("priority must list every tile exactly once")]
    InvalidPriority,
    #[error("min_bet ({min}) exceeds max_bet ({max})")]
    BetRange { min: Money, max: Money },
    #[error("{field} must be {len} bytes of hex")]
    InvalidKey { field: &'static str, len: usize },
    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

fn default_rows() -> usize {
    DEFAULT_ROWS
}

fn default_priority() -> Vec<Tile> {
    Tile::ALL.to_vec()
}

fn default_base_multipliers() -> Vec<u32> {
    BASE_MULTIPLIERS.to_vec()
}

fn default_free_spins_multipliers() -> Vec<u32> {
    FREE_SPINS_MULTIPLIERS.to_vec()
}

fn default_max_cascades() -> u32 {
    DEFAULT_MAX_CASCADES
}

fn default_scatter_trigger() -> u32 {
    SCATTER_TRIGGER_COUNT
}

fn default_free_spins_base_award() -> u32 {
    FREE_SPINS_BASE_AWARD
}

fn default_free_spins_per_extra_scatter() -> u32 {
    FREE_SPINS_PER_EXTRA_SCATTER
}

fn default_bonus_buy_cost_multiplier() -> u64 {
    BONUS_BUY_COST_MULTIPLIER
}

fn default_min_bet() -> Money {
    Money::from_minor(10)
}

fn default_max_bet() -> Money {
    Money::from_minor(100_000)
}

fn default_paytable() -> BTreeMap<Tile, Pays> {
    BTreeMap::from([
        (Tile::Fa, [150, 500, 1_000]),
        (Tile::Zhong, [100, 300, 800]),
        (Tile::Bai, [80, 200, 600]),
        (Tile::Bawan, [60, 150, 400]),
        (Tile::Wutong, [40, 100, 300]),
        (Tile::Wusuo, [30, 80, 200]),
        (Tile::Santong, [20, 60, 150]),
        (Tile::Ertong, [10, 40, 100]),
        (Tile::Ersuo, [10, 40, 100]),
    ])
}

/// Game math, loaded from YAML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_paytable")]
    pub paytable: BTreeMap<Tile, Pays>,
    /// Presentation order for the highlighted winning tile.
    #[serde(default = "default_priority")]
    pub priority: Vec<Tile>,
    /// Cascade multipliers for base and bonus-buy spins; the last value repeats.
    #[serde(default = "default_base_multipliers")]
    pub base_multipliers: Vec<u32>,
    #[serde(default = "default_free_spins_multipliers")]
    pub free_spins_multipliers: Vec<u32>,
    #[serde(default = "default_max_cascades")]
    pub max_cascades: u32,
    #[serde(default = "default_scatter_trigger")]
    pub scatter_trigger: u32,
    #[serde(default = "default_free_spins_base_award")]
    pub free_spins_base_award: u32,
    #[serde(default = "default_free_spins_per_extra_scatter")]
    pub free_spins_per_extra_scatter: u32,
    #[serde(default = "default_bonus_buy_cost_multiplier")]
    pub bonus_buy_cost_multiplier: u64,
    #[serde(default = "default_min_bet")]
    pub min_bet: Money,
    #[serde(default = "default_max_bet")]
    pub max_bet: Money,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            paytable: default_paytable(),
            priority: default_priority(),
            base_multipliers: default_base_multipliers(),
            free_spins_multipliers: default_free_spins_multipliers(),
            max_cascades: default_max_cascades(),
            scatter_trigger: default_scatter_trigger(),
            free_spins_base_award: default_free_spins_base_award(),
            free_spins_per_extra_scatter: default_free_spins_per_extra_scatter(),
            bonus_buy_cost_multiplier: default_bonus_buy_cost_multiplier(),
            min_bet: default_min_bet(),
            max_bet: default_max_bet(),
        }
    }
}

/// A [`GameConfig`] whose invariants have been checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedGameConfig {
    pub rows: usize,
    pub paytable: BTreeMap<Tile, Pays>,
    pub priority: Vec<Tile>,
    pub base_multipliers: Vec<u32>,
    pub free_spins_multipliers: Vec<u32>,
    pub max_cascades: u32,
    pub scatter_trigger: u32,
    pub free_spins_base_award: u32,
    pub free_spins_per_extra_scatter: u32,
    pub bonus_buy_cost_multiplier: u64,
    pub min_bet: Money,
    pub max_bet: Money,
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn ensure_progression(field: &'static str, values: &[u32]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::Empty { field });
    }
    if values.contains(&0) {
        return Err(ConfigError::InvalidNonZero { field, value: 0 });
    }
    if values.windows(2).any(|pair| pair[1] < pair[0]) {
        return Err(ConfigError::NotMonotonic { field });
    }
    Ok(())
}

impl GameConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(self) -> Result<ValidatedGameConfig, ConfigError> {
        ensure_nonzero("rows", self.rows as u64)?;
        if self.rows > MAX_ROWS {
            return Err(ConfigError::TooLarge {
                field: "rows",
                value: self.rows as u64,
                max: MAX_ROWS as u64,
            });
        }
        ensure_progression("base_multipliers", &self.base_multipliers)?;
        ensure_progression("free_spins_multipliers", &self.free_spins_multipliers)?;
        ensure_nonzero("max_cascades", self.max_cascades as u64)?;
        ensure_nonzero("scatter_trigger", self.scatter_trigger as u64)?;
        ensure_nonzero("bonus_buy_cost_multiplier", self.bonus_buy_cost_multiplier)?;
        ensure_nonzero("min_bet", self.min_bet.minor())?;
        if self.min_bet > self.max_bet {
            return Err(ConfigError::BetRange {
                min: self.min_bet,
                max: self.max_bet,
            });
        }
        if let Some(tile) = Tile::ALL
            .into_iter()
            .find(|tile| !self.paytable.contains_key(tile))
        {
            return Err(ConfigError::MissingPay(tile));
        }
        let mut priority = self.priority.clone();
        priority.sort();
        priority.dedup();
        if priority.len() != Tile::ALL.len() || self.priority.len() != Tile::ALL.len() {
            return Err(ConfigError::InvalidPriority);
        }

        Ok(ValidatedGameConfig {
            rows: self.rows,
            paytable: self.paytable,
            priority: self.priority,
            base_multipliers: self.base_multipliers,
            free_spins_multipliers: self.free_spins_multipliers,
            max_cascades: self.max_cascades,
            scatter_trigger: self.scatter_trigger,
            free_spins_base_award: self.free_spins_base_award,
            free_spins_per_extra_scatter: self.free_spins_per_extra_scatter,
            bonus_buy_cost_multiplier: self.bonus_buy_cost_multiplier,
            min_bet: self.min_bet,
            max_bet: self.max_bet,
        })
    }
}

impl ValidatedGameConfig {
    /// Paytable value for a run of `count` reels, or `0` if that run does not pay.
    pub fn pay(&self, tile: Tile, count: u8) -> u32 {
        let Some(index) = (count as usize).checked_sub(MIN_WIN_COUNT as usize) else {
            return 0;
        };
        self.paytable
            .get(&tile)
            .and_then(|pays| pays.get(index))
            .copied()
            .unwrap_or(0)
    }

    pub fn multipliers(&self, mode: GameMode) -> &[u32] {
        match mode {
            GameMode::Base | GameMode::BonusBuy => &self.base_multipliers,
            GameMode::FreeSpins => &self.free_spins_multipliers,
        }
    }

    /// Multiplier for the 0-based `step`; the progression's last value repeats.
    pub fn multiplier_at(&self, mode: GameMode, step: usize) -> u32 {
        let progression = self.multipliers(mode);
        progression
            .get(step)
            .or_else(|| progression.last())
            .copied()
            .unwrap_or(1)
    }

    /// Free spins awarded for `scatters` on an initial grid; `0` below the trigger.
    pub fn free_spins_award(&self, scatters: u32) -> u32 {
        if scatters < self.scatter_trigger {
            return 0;
        }
        let extra = scatters - self.scatter_trigger;
        self.free_spins_base_award
            .saturating_add(self.free_spins_per_extra_scatter.saturating_mul(extra))
    }

    /// Amount deducted from the balance to play one spin in `mode`.
    pub fn cost(&self, mode: GameMode, bet: Money) -> Option<Money> {
        match mode {
            GameMode::Base => Some(bet),
            GameMode::BonusBuy => bet.checked_mul(self.bonus_buy_cost_multiplier),
            GameMode::FreeSpins => Some(Money::ZERO),
        }
    }

    pub fn bet_in_range(&self, bet: Money) -> bool {
        bet >= self.min_bet && bet <= self.max_bet
    }
}

fn default_cache_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_store_retry_attempts() -> usize {
    3
}

fn default_store_retry_backoff_ms() -> u64 {
    25
}

/// Service wiring: secrets and store behavior.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// AES-256-GCM key for server seeds at rest, hex encoded.
    pub seed_encryption_key: String,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_store_retry_attempts")]
    pub store_retry_attempts: usize,
    #[serde(default = "default_store_retry_backoff_ms")]
    pub store_retry_backoff_ms: u64,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("seed_encryption_key", &"<redacted>")
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("store_retry_attempts", &self.store_retry_attempts)
            .field("store_retry_backoff_ms", &self.store_retry_backoff_ms)
            .finish()
    }
}

#[derive(Clone)]
pub struct ValidatedServiceConfig {
    pub seed_encryption_key: [u8; 32],
    pub cache_ttl: Duration,
    pub retry: RetryPolicy,
}

impl fmt::Debug for ValidatedServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedServiceConfig")
            .field("seed_encryption_key", &"<redacted>")
            .field("cache_ttl", &self.cache_ttl)
            .field("retry", &self.retry)
            .finish()
    }
}

/// How best-effort store writes are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: NonZeroUsize,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: NonZeroUsize::MIN.saturating_add(default_store_retry_attempts() - 1),
            base_backoff: Duration::from_millis(default_store_retry_backoff_ms()),
        }
    }
}

impl ServiceConfig {
    pub fn validate(self) -> Result<ValidatedServiceConfig, ConfigError> {
        let mut key = [0u8; 32];
        hex::decode_to_slice(self.seed_encryption_key.trim(), &mut key).map_err(|_| {
            ConfigError::InvalidKey {
                field: "seed_encryption_key",
                len: key.len(),
            }
        })?;
        ensure_nonzero("cache_ttl_seconds", self.cache_ttl_seconds)?;
        let attempts = NonZeroUsize::new(self.store_retry_attempts).ok_or(
            ConfigError::InvalidNonZero {
                field: "store_retry_attempts",
                value: 0,
            },
        )?;

        Ok(ValidatedServiceConfig {
            seed_encryption_key: key,
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            retry: RetryPolicy {
                attempts,
                base_backoff: Duration::from_millis(self.store_retry_backoff_ms),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = GameConfig::default().validate().unwrap();
        assert_eq!(config.rows, DEFAULT_ROWS);
        assert_eq!(config.pay(Tile::Fa, 3), 150);
        assert_eq!(config.pay(Tile::Fa, 5), 1_000);
        assert_eq!(config.pay(Tile::Fa, 2), 0);
    }

    #[test]
    fn test_multiplier_progression_repeats_last() {
        let config = GameConfig::default().validate().unwrap();
        let base: Vec<u32> = (0..6)
            .map(|step| config.multiplier_at(GameMode::Base, step))
            .collect();
        assert_eq!(base, vec![1, 2, 3, 5, 5, 5]);
        assert_eq!(config.multiplier_at(GameMode::FreeSpins, 0), 2);
        assert_eq!(config.multiplier_at(GameMode::FreeSpins, 9), 10);
        assert_eq!(config.multiplier_at(GameMode::BonusBuy, 1), 2);
    }

    #[test]
    fn test_free_spins_award_table() {
        let config = GameConfig::default().validate().unwrap();
        let awards: Vec<u32> = (0..=5).map(|n| config.free_spins_award(n)).collect();
        assert_eq!(awards, vec![0, 0, 0, 12, 14, 16]);
    }

    #[test]
    fn test_cost_by_mode() {
        let config = GameConfig::default().validate().unwrap();
        let bet = Money::from_minor(200);
        assert_eq!(config.cost(GameMode::Base, bet), Some(bet));
        assert_eq!(
            config.cost(GameMode::BonusBuy, bet),
            Some(Money::from_minor(10_000))
        );
        assert_eq!(config.cost(GameMode::FreeSpins, bet), Some(Money::ZERO));
    }

    #[test]
    fn test_rejects_bad_progressions() {
        let config = GameConfig {
            base_multipliers: vec![],
            ..GameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Empty {
                field: "base_multipliers"
            })
        ));

        let config = GameConfig {
            free_spins_multipliers: vec![2, 6, 4],
            ..GameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotMonotonic {
                field: "free_spins_multipliers"
            })
        ));
    }

    #[test]
    fn test_rejects_incomplete_paytable_and_priority() {
        let mut config = GameConfig::default();
        config.paytable.remove(&Tile::Ersuo);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingPay(Tile::Ersuo))
        ));

        let mut config = GameConfig::default();
        config.priority[1] = Tile::Fa;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPriority)
        ));
    }

    #[test]
    fn test_yaml_uses_defaults_for_missing_fields() {
        let yaml = r#"
rows: 5
base_multipliers: [1, 2, 4]
paytable:
  fa: [200, 600, 1200]
  zhong: [100, 300, 800]
  bai: [80, 200, 600]
  bawan: [60, 150, 400]
  wutong: [40, 100, 300]
  wusuo: [30, 80, 200]
  santong: [20, 60, 150]
  ertong: [10, 40, 100]
  ersuo: [10, 40, 100]
"#;
        let config: GameConfig = serde_yaml::from_str(yaml).unwrap();
        let config = config.validate().unwrap();
        assert_eq!(config.rows, 5);
        assert_eq!(config.pay(Tile::Fa, 4), 600);
        assert_eq!(config.multiplier_at(GameMode::Base, 10), 4);
        assert_eq!(config.free_spins_multipliers, FREE_SPINS_MULTIPLIERS.to_vec());
    }

    #[test]
    fn test_service_config_validation() {
        let config = ServiceConfig {
            seed_encryption_key: "11".repeat(32),
            cache_ttl_seconds: 60,
            store_retry_attempts: 2,
            store_retry_backoff_ms: 5,
        };
        assert!(!format!("{config:?}").contains("1111"));
        let validated = config.clone().validate().unwrap();
        assert_eq!(validated.seed_encryption_key, [0x11; 32]);
        assert_eq!(validated.retry.attempts.get(), 2);

        let short = ServiceConfig {
            seed_encryption_key: "11".repeat(16),
            ..config.clone()
        };
        assert!(matches!(
            short.validate(),
            Err(ConfigError::InvalidKey { .. })
        ));

        let no_attempts = ServiceConfig {
            store_retry_attempts: 0,
            ..config
        };
        assert!(no_attempts.validate().is_err());
    }
}
