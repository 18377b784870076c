use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use fairreel_types::pf::ServerSeed;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use uuid::Uuid;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("seed encryption failed")]
    Encrypt,
    #[error("sealed seed is too short ({0} bytes)")]
    Truncated(usize),
    #[error("sealed seed failed authentication")]
    Decrypt,
    #[error("decrypted seed has wrong length ({0} bytes)")]
    InvalidLength(usize),
}

/// AES-256-GCM sealing of server seeds at rest.
///
/// Output is `nonce || ciphertext || tag`; the PF session id is bound as associated data,
/// so a sealed seed cannot be moved to another session record.
#[derive(Clone)]
pub struct SeedCipher {
    cipher: Aes256Gcm,
}

impl SeedCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    pub fn seal(&self, session_id: Uuid, seed: &ServerSeed) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: seed.as_bytes(),
                    aad: session_id.as_bytes(),
                },
            )
            .map_err(|_| CipherError::Encrypt)?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, session_id: Uuid, sealed: &[u8]) -> Result<ServerSeed, CipherError> {
        if sealed.len() <= NONCE_LEN {
            return Err(CipherError::Truncated(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: session_id.as_bytes(),
                },
            )
            .map_err(|_| CipherError::Decrypt)?;
        let bytes: [u8; 32] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::InvalidLength(plaintext.len()))?;
        Ok(ServerSeed::from_bytes(bytes))
    }
}
