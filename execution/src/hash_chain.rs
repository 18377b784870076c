//! Commitments and the per-session spin hash chain.
//!
//! ## Flow
//!
//! 1. **Commit** - a fresh server seed is generated and only `SHA256(seed)` is published.
//!    When the player pre-committed entropy (`theta`), the chain start binds both commitments.
//! 2. **Chain** - every spin hash folds in the previous hash, so no spin can be computed
//!    before its predecessor is fixed.
//! 3. **Reveal** - at session end the seed is disclosed and anyone can replay the chain.
//!
//! ```text
//! prev[1]    = SHA256(serverSeedHash || thetaCommitment)   (or serverSeedHash)
//! hash[n]    = SHA256(prev[n] || serverSeed || clientSeed[n] || n)
//! prev[n+1]  = hash[n]
//! ```
//!
//! All hashes are lowercase hex; every hash input is the UTF-8 text shown above.

use fairreel_types::pf::{PayloadSpin, ServerSeed, SpinLog, NONCE_START};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Bytes of entropy in a server-generated client seed.
pub const CLIENT_SEED_LEN: usize = 16;

fn sha256_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Generate a fresh 256-bit server seed.
pub fn generate_server_seed<R: RngCore + CryptoRng>(rng: &mut R) -> ServerSeed {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    ServerSeed::from_bytes(bytes)
}

/// The public commitment to a server seed.
pub fn hash_server_seed(seed: &ServerSeed) -> String {
    sha256_hex(&[seed.to_hex().as_bytes()])
}

/// The commitment a player publishes for their theta seed.
pub fn hash_theta_seed(theta_seed: &str) -> String {
    sha256_hex(&[theta_seed.as_bytes()])
}

/// Returns `true` if `commitment == SHA256(seed)`.
pub fn verify_commitment(seed: &ServerSeed, commitment: &str) -> bool {
    hash_server_seed(seed).eq_ignore_ascii_case(commitment)
}

/// Returns `true` if `commitment == SHA256(theta_seed)`.
pub fn verify_theta(theta_seed: &str, commitment: &str) -> bool {
    hash_theta_seed(theta_seed).eq_ignore_ascii_case(commitment)
}

/// The `prevSpinHash` for the first nonce of a session.
pub fn generate_initial_prev_spin_hash(
    server_seed_hash: &str,
    theta_commitment: Option<&str>,
) -> String {
    match theta_commitment.filter(|commitment| !commitment.is_empty()) {
        Some(commitment) => sha256_hex(&[server_seed_hash.as_bytes(), commitment.as_bytes()]),
        None => server_seed_hash.to_string(),
    }
}

/// `SHA256(prevSpinHash || serverSeed || clientSeed || nonce)`.
pub fn generate_spin_hash(
    prev_spin_hash: &str,
    seed: &ServerSeed,
    client_seed: &str,
    nonce: u64,
) -> String {
    sha256_hex(&[
        prev_spin_hash.as_bytes(),
        seed.to_hex().as_bytes(),
        client_seed.as_bytes(),
        nonce.to_string().as_bytes(),
    ])
}

/// Fallback client seed, used only when the player supplied none.
///
/// Spins played with it are marked [`fairreel_types::pf::ClientSeedSource::Server`]: the
/// server chose both inputs, so the player's fairness guarantee is weaker.
pub fn generate_client_seed<R: RngCore + CryptoRng>(rng: &mut R) -> String {
    let mut bytes = [0u8; CLIENT_SEED_LEN];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// One link of a recorded chain.
pub trait ChainEntry {
    fn client_seed(&self) -> &str;
    fn nonce(&self) -> u64;
    fn spin_hash(&self) -> &str;
}

impl ChainEntry for SpinLog {
    fn client_seed(&self) -> &str {
        &self.client_seed
    }

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn spin_hash(&self) -> &str {
        &self.spin_hash
    }
}

impl ChainEntry for PayloadSpin {
    fn client_seed(&self) -> &str {
        &self.client_seed
    }

    fn nonce(&self) -> u64 {
        self.nonce
    }

    fn spin_hash(&self) -> &str {
        &self.spin_hash
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("server seed does not match its commitment")]
    CommitmentMismatch,
    #[error("spin hash mismatch at index {index}")]
    LinkMismatch { index: usize, expected: String },
}

/// Recompute the expected hash of every link, each from the *expected* hash before it.
pub fn expected_chain<E: ChainEntry>(
    seed: &ServerSeed,
    initial_prev_spin_hash: &str,
    spins: &[E],
) -> Vec<String> {
    let mut prev = initial_prev_spin_hash.to_string();
    let mut expected = Vec::with_capacity(spins.len());
    for spin in spins {
        let hash = generate_spin_hash(&prev, seed, spin.client_seed(), spin.nonce());
        expected.push(hash.clone());
        prev = hash;
    }
    expected
}

/// Replay an entire chain from its start.
///
/// Fails closed: returns the first index whose recorded hash differs from the recomputed one.
pub fn verify_hash_chain<E: ChainEntry>(
    seed: &ServerSeed,
    server_seed_hash: &str,
    theta_commitment: Option<&str>,
    spins: &[E],
) -> Result<(), ChainError> {
    if !verify_commitment(seed, server_seed_hash) {
        return Err(ChainError::CommitmentMismatch);
    }
    let initial = generate_initial_prev_spin_hash(server_seed_hash, theta_commitment);
    let expected = expected_chain(seed, &initial, spins);
    for (index, (spin, expected)) in spins.iter().zip(expected).enumerate() {
        if !spin.spin_hash().eq_ignore_ascii_case(&expected) {
            return Err(ChainError::LinkMismatch { index, expected });
        }
    }
    Ok(())
}

/// Nonce the spin at `index` of a complete chain must carry.
pub fn nonce_at(index: usize) -> u64 {
    NONCE_START + index as u64
}
