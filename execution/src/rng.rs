//! Deterministic random streams for a single spin.
//!
//! One HKDF-SHA256 pseudorandom key is extracted per spin from
//! `(serverSeed, clientSeed, nonce)` with the previous spin hash as salt. Each draw expands
//! a fresh, domain-separated block (`info = "stream:<k>"`, `k = 0, 1, ...`), so the `k`-th
//! draw of a spin is independent of every other draw and verifiers can replay any spin from
//! its inputs alone.

use fairreel_types::pf::{is_hex64, ServerSeed};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

use crate::hash_chain::generate_spin_hash;

/// Bytes expanded per draw: eight `u64` candidates for rejection sampling.
pub const STREAM_BLOCK_LEN: usize = 64;

const STREAM_INFO_PREFIX: &str = "stream:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RngError {
    #[error("client seed must not be empty")]
    EmptyClientSeed,
    #[error("previous spin hash must be 64 hex characters")]
    InvalidPrevSpinHash,
    #[error("bound must be greater than zero")]
    ZeroBound,
    #[error("hkdf expand failed for stream {0}")]
    Expand(u64),
    #[error("no unbiased candidate for bound {bound} in stream {stream}")]
    Exhausted { bound: u64, stream: u64 },
}

/// Source of uniform integers consumed by the reel generator and cascade engine.
pub trait SpinRng {
    /// Uniform integer in `[0, bound)`.
    fn int(&mut self, bound: usize) -> Result<usize, RngError>;
}

pub struct HkdfStreamRng {
    hkdf: Hkdf<Sha256>,
    spin_hash: String,
    streams: u64,
}

impl HkdfStreamRng {
    pub fn new(
        seed: &ServerSeed,
        client_seed: &str,
        nonce: u64,
        prev_spin_hash: &str,
    ) -> Result<Self, RngError> {
        if client_seed.is_empty() {
            return Err(RngError::EmptyClientSeed);
        }
        if !is_hex64(prev_spin_hash) {
            return Err(RngError::InvalidPrevSpinHash);
        }
        let salt = hex::decode(prev_spin_hash).map_err(|_| RngError::InvalidPrevSpinHash)?;

        let mut ikm = Vec::with_capacity(32 + 8 + client_seed.len() + 8);
        ikm.extend_from_slice(seed.as_bytes());
        ikm.extend_from_slice(&(client_seed.len() as u64).to_be_bytes());
        ikm.extend_from_slice(client_seed.as_bytes());
        ikm.extend_from_slice(&nonce.to_be_bytes());

        Ok(Self {
            hkdf: Hkdf::<Sha256>::new(Some(&salt), &ikm),
            spin_hash: generate_spin_hash(prev_spin_hash, seed, client_seed, nonce),
            streams: 0,
        })
    }

    /// The chain hash of the spin this generator belongs to.
    pub fn spin_hash(&self) -> &str {
        &self.spin_hash
    }

    /// Number of streams consumed so far.
    pub fn streams_used(&self) -> u64 {
        self.streams
    }

    fn next_block(&mut self) -> Result<(u64, [u8; STREAM_BLOCK_LEN]), RngError> {
        let stream = self.streams;
        self.streams += 1;
        let info = format!("{STREAM_INFO_PREFIX}{stream}");
        let mut block = [0u8; STREAM_BLOCK_LEN];
        self.hkdf
            .expand(info.as_bytes(), &mut block)
            .map_err(|_| RngError::Expand(stream))?;
        Ok((stream, block))
    }
}

impl SpinRng for HkdfStreamRng {
    fn int(&mut self, bound: usize) -> Result<usize, RngError> {
        if bound == 0 {
            return Err(RngError::ZeroBound);
        }
        let bound = bound as u64;
        let (stream, block) = self.next_block()?;

        // Largest multiple of `bound` that fits; candidates at or above it are biased.
        let zone = u64::MAX - (u64::MAX % bound);
        for chunk in block.chunks_exact(8) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            let candidate = u64::from_be_bytes(word);
            if candidate < zone {
                return Ok((candidate % bound) as usize);
            }
        }
        Err(RngError::Exhausted { bound, stream })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_chain::hash_server_seed;
    use proptest::prelude::*;

    fn seed() -> ServerSeed {
        ServerSeed::from_bytes([0x42; 32])
    }

    fn rng(client_seed: &str, nonce: u64) -> HkdfStreamRng {
        HkdfStreamRng::new(&seed(), client_seed, nonce, &hash_server_seed(&seed())).unwrap()
    }

    fn draws(rng: &mut HkdfStreamRng, n: usize, bound: usize) -> Vec<usize> {
        (0..n).map(|_| rng.int(bound).unwrap()).collect()
    }

    #[test]
    fn test_rejects_malformed_inputs() {
        let prev = hash_server_seed(&seed());
        assert_eq!(
            HkdfStreamRng::new(&seed(), "", 1, &prev).err(),
            Some(RngError::EmptyClientSeed)
        );
        assert_eq!(
            HkdfStreamRng::new(&seed(), "c", 1, "not-a-hash").err(),
            Some(RngError::InvalidPrevSpinHash)
        );
        assert_eq!(rng("c", 1).int(0), Err(RngError::ZeroBound));
    }

    #[test]
    fn test_exposes_chain_hash() {
        let prev = hash_server_seed(&seed());
        let rng = HkdfStreamRng::new(&seed(), "lucky", 3, &prev).unwrap();
        assert_eq!(rng.spin_hash(), generate_spin_hash(&prev, &seed(), "lucky", 3));
    }

    #[test]
    fn test_each_draw_consumes_one_stream() {
        let mut rng = rng("lucky", 1);
        draws(&mut rng, 7, 30);
        assert_eq!(rng.streams_used(), 7);
    }

    #[test]
    fn test_inputs_change_the_sequence() {
        let base = draws(&mut rng("lucky", 1), 16, 1 << 20);
        assert_ne!(base, draws(&mut rng("lucky", 2), 16, 1 << 20));
        assert_ne!(base, draws(&mut rng("lucky!", 1), 16, 1 << 20));
    }

    #[test]
    fn test_bound_of_one_is_always_zero() {
        let mut rng = rng("lucky", 1);
        assert!(draws(&mut rng, 50, 1).iter().all(|&v| v == 0));
    }

    #[test]
    fn test_distribution_covers_every_value() {
        let mut rng = rng("coverage", 1);
        let mut seen = [0u32; 6];
        for _ in 0..600 {
            seen[rng.int(6).unwrap()] += 1;
        }
        assert!(seen.iter().all(|&count| count > 50), "skewed: {seen:?}");
    }

    proptest! {
        #[test]
        fn identical_inputs_replay_identically(
            client_seed in "[a-z0-9]{1,32}",
            nonce in 1u64..1_000_000,
            bound in 1usize..500,
        ) {
            let a = draws(&mut rng(&client_seed, nonce), 20, bound);
            let b = draws(&mut rng(&client_seed, nonce), 20, bound);
            prop_assert!(a.iter().all(|&v| v < bound));
            prop_assert_eq!(a, b);
        }
    }
}
