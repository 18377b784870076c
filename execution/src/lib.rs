//! Fairreel execution layer.
//!
//! This crate runs provably fair spins of a five-reel, ways-to-win cascading slot: the
//! commit/reveal hash chain, the per-spin HKDF random streams, the cascade engine, the spin
//! orchestrator and third-party verification.
//!
//! ## Determinism requirements
//! - The engine only draws randomness from the [`SpinRng`] it is given, in a fixed order
//!   (see [`engine`]). Replaying a spin's inputs replays its outcome.
//! - Wall-clock time and OS randomness are confined to session creation, fallback client
//!   seeds, timestamps and retry jitter.
//!
//! ## Storage invariants
//! Durable state lives behind the traits in [`state`]. Writes to shared records are
//! compare-and-swap on `lock_version`; the fast cache is advisory and every cache failure
//! degrades to a store read.
//!
//! The primary entrypoint is [`SpinOrchestrator`].
//!
//! ## Minimal spin (example)
//! ```rust,ignore
//! # #[cfg(feature = "mocks")]
//! # {
//! use fairreel_execution::mocks::Harness;
//! use fairreel_types::{slot::GameMode, Money};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let harness = Harness::new(Money::from_minor(10_000));
//! let session = harness.start_session(None).await;
//! let outcome = harness
//!     .orchestrator
//!     .execute_base_spin(harness.spin(100, GameMode::Base))
//!     .await?;
//! assert_eq!(outcome.nonce, session.nonce_start);
//! # Ok(())
//! # }
//! # }
//! ```

mod backoff;
#[cfg(feature = "redis")]
pub mod cache;
pub mod cipher;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash_chain;
pub mod orchestrator;
pub mod rng;
pub mod session;
pub mod state;
pub mod verify;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod verification_tests;

pub use config::{
    ConfigError, GameConfig, RetryPolicy, ServiceConfig, ValidatedGameConfig,
    ValidatedServiceConfig,
};
pub use engine::{CascadeEngine, EngineError, ReelGridGenerator, WinEvaluator};
pub use error::{Error, ErrorClass, Result};
pub use orchestrator::{FreeSpinRequest, SessionLocks, SpinOrchestrator, SpinRequest};
pub use rng::{HkdfStreamRng, RngError, SpinRng};
pub use session::{PreparedSpin, SessionManager};
pub use verify::{verify_payload, verify_spin, verify_spin_with_reel};
