//! Per-link cryptographic state: the encrypt/decrypt state machine,
//! nonce management, and the outcome taxonomy it reports.

use std::fmt;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::KeyInit;
use aes::Aes128;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, trace};
use zeroize::Zeroize;

use crate::nonce::{self, NONCE_SIZE};
use crate::ocb;
use crate::replay::{ReplayFilter, Verdict};

/// Key length in bytes (AES-128).
pub const KEY_SIZE: usize = 16;

/// Crypto header: one nonce byte plus three tag bytes.
pub const HEADER_SIZE: usize = 4;

/// Authentication tag bytes carried on the wire.
pub const TAG_SIZE: usize = 3;

/// Why a datagram failed to decrypt.
///
/// Every variant is an expected condition on an unreliable transport:
/// the caller decides whether to drop, log, or request retransmission.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecryptError {
    /// Sequence number already accepted in the current window.
    #[error("repeated sequence number")]
    Repeat,

    /// Sequence number too far behind the newest accepted datagram.
    #[error("datagram outside the replay window")]
    Late,

    /// Authentication tag mismatch: corruption or forgery.
    #[error("authentication tag mismatch")]
    Mac,

    /// Buffer shorter than the 4-byte crypto header.
    #[error("datagram truncated before the crypto header")]
    Eof,
}

/// Nonce configuration errors.
///
/// Distinct from [`DecryptError`] on purpose: a wrong nonce length is a
/// caller bug, not a property of the datagram, and aborts the call
/// instead of coming back as a per-datagram outcome.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NonceError {
    /// The supplied nonce is not exactly 16 bytes.
    #[error("invalid nonce length: expected 16 bytes, got {0}")]
    InvalidLength(usize),
}

/// Decrypt statistics snapshot for monitoring.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptStats {
    /// Successfully decrypted datagrams.
    pub good: u64,
    /// Datagrams rejected as too far behind the window.
    pub late: u64,
    /// Gaps inferred from forward sequence jumps.
    pub lost: u64,
    /// Explicit decrypt-nonce resynchronizations.
    pub resync: u64,
}

/// One side of an encrypted datagram link.
///
/// Holds the shared AES-128 key and both direction counters. The two
/// ends of a link derive complementary states with
/// [`CryptState::new_from`]: this peer's decrypt counter is the peer's
/// encrypt counter and vice versa, so a peer never decrypts with its own
/// encrypt nonce.
///
/// Both `encrypt` and `decrypt` mutate the state; concurrent calls on
/// the same instance must be serialized by the caller (one exclusive
/// lock per instance, or single-task ownership). Distinct instances
/// need no coordination.
pub struct CryptState {
    key: [u8; KEY_SIZE],
    cipher: Aes128,
    encrypt_nonce: u128,
    decrypt_nonce: u128,
    filter: ReplayFilter,
    stats: CryptStats,
}

impl CryptState {
    /// Generate a state with key and nonces from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        let mut encrypt_nonce = [0u8; NONCE_SIZE];
        let mut decrypt_nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut encrypt_nonce);
        OsRng.fill_bytes(&mut decrypt_nonce);
        Self::new(key, encrypt_nonce, decrypt_nonce)
    }

    /// Construct from an explicit key and direction counters.
    pub fn new(
        key: [u8; KEY_SIZE],
        encrypt_nonce: [u8; NONCE_SIZE],
        decrypt_nonce: [u8; NONCE_SIZE],
    ) -> Self {
        let cipher = Aes128::new(&GenericArray::from(key));
        Self {
            key,
            cipher,
            encrypt_nonce: u128::from_be_bytes(encrypt_nonce),
            decrypt_nonce: u128::from_be_bytes(decrypt_nonce),
            filter: ReplayFilter::new(),
            stats: CryptStats::default(),
        }
    }

    /// Derive the complementary state for the other end of the link:
    /// same key, counters swapped, fresh history, zeroed stats.
    pub fn new_from(peer: &CryptState) -> Self {
        Self::new(
            peer.key,
            peer.decrypt_nonce.to_be_bytes(),
            peer.encrypt_nonce.to_be_bytes(),
        )
    }

    /// Shared key bytes, for handing to the peer during session setup.
    pub fn key(&self) -> [u8; KEY_SIZE] {
        self.key
    }

    /// Current outbound counter.
    pub fn encrypt_nonce(&self) -> [u8; NONCE_SIZE] {
        self.encrypt_nonce.to_be_bytes()
    }

    /// Newest accepted inbound counter.
    pub fn decrypt_nonce(&self) -> [u8; NONCE_SIZE] {
        self.decrypt_nonce.to_be_bytes()
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> CryptStats {
        self.stats
    }

    /// Overwrite the decrypt counter and forget the replay history.
    ///
    /// This is the explicit resynchronization point for when the two
    /// sides' counters have diverged beyond recoverable inference. The
    /// nonce must be exactly 16 bytes; anything else leaves the state
    /// untouched.
    pub fn set_decrypt_nonce(&mut self, nonce: &[u8]) -> Result<(), NonceError> {
        let bytes: [u8; NONCE_SIZE] = nonce
            .try_into()
            .map_err(|_| NonceError::InvalidLength(nonce.len()))?;
        self.decrypt_nonce = u128::from_be_bytes(bytes);
        self.filter.reset();
        self.stats.resync += 1;
        debug!("decrypt nonce resynchronized");
        Ok(())
    }

    /// Encrypt a datagram.
    ///
    /// Advances the outbound counter and returns the wire form: one
    /// nonce byte, three tag bytes, then ciphertext of the same length
    /// as `plaintext`.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        self.encrypt_nonce = self.encrypt_nonce.wrapping_add(1);

        let mut out = Vec::with_capacity(HEADER_SIZE + plaintext.len());
        out.push(self.encrypt_nonce as u8);
        out.extend_from_slice(&[0u8; TAG_SIZE]);
        let tag = ocb::encrypt(&self.cipher, self.encrypt_nonce, plaintext, &mut out);
        out[1..HEADER_SIZE].copy_from_slice(&tag[..TAG_SIZE]);
        out
    }

    /// Decrypt a datagram received from the peer.
    ///
    /// The sender's full counter is reconstructed from the single header
    /// byte, classified against the replay window, and only then
    /// verified. No failure path mutates the decrypt counter or the
    /// history table; a forged header cannot corrupt replay protection.
    pub fn decrypt(&mut self, buffer: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if buffer.len() < HEADER_SIZE {
            return Err(DecryptError::Eof);
        }
        let header_byte = buffer[0];
        let wire_tag = &buffer[1..HEADER_SIZE];
        let ciphertext = &buffer[HEADER_SIZE..];

        let diff = nonce::wrapping_diff(header_byte, self.decrypt_nonce as u8);
        let candidate = nonce::apply_diff(self.decrypt_nonce, diff);

        match self.filter.classify(candidate, diff) {
            Verdict::Late => {
                self.stats.late += 1;
                trace!(diff, "datagram behind the replay window");
                return Err(DecryptError::Late);
            }
            Verdict::Repeat => return Err(DecryptError::Repeat),
            Verdict::Fresh => {}
        }

        let mut plaintext = Vec::with_capacity(ciphertext.len());
        let tag = ocb::decrypt(&self.cipher, candidate, ciphertext, &mut plaintext);

        if !bool::from(tag[..TAG_SIZE].ct_eq(wire_tag)) {
            return Err(DecryptError::Mac);
        }

        self.filter.record(candidate);
        if diff > 0 {
            let lost = (diff - 1) as u64;
            if lost > 0 {
                self.stats.lost += lost;
                debug!(lost, "forward jump in sequence, datagrams inferred lost");
            }
            self.decrypt_nonce = candidate;
        }
        self.stats.good += 1;
        Ok(plaintext)
    }
}

impl fmt::Debug for CryptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Key deliberately omitted.
        f.debug_struct("CryptState")
            .field("encrypt_nonce", &hex::encode(self.encrypt_nonce()))
            .field("decrypt_nonce", &hex::encode(self.decrypt_nonce()))
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Drop for CryptState {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
