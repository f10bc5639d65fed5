//! Datagram encryption engine for Sotto voice links.
//!
//! This crate implements the symmetric, authenticated, replay-resistant
//! cryptographic session used on a Sotto datagram link:
//! - OCB2-AES128 authenticated encryption with a 3-byte wire tag
//! - Independent 128-bit nonce counters, one per direction
//! - Duplicate and lateness detection reconstructed from the single
//!   sequence byte each datagram carries
//! - Explicit decrypt-nonce resynchronization
//!
//! # Design
//!
//! Key exchange is out of scope: both peers receive the same 16-byte key
//! from an external handshake and derive complementary states with
//! [`CryptState::new_from`] — one peer's encrypt counter is the other's
//! decrypt counter, and vice versa. Each encrypted datagram carries a
//! 4-byte crypto header (one nonce byte, three tag bytes) followed by
//! ciphertext of the same length as the plaintext.
//!
//! Per-datagram failures (truncation, replay, lateness, tag mismatch) are
//! expected conditions on an unreliable transport and come back as values
//! ([`DecryptError`]), never panics. Misconfiguration ([`NonceError`]) is
//! the only hard error.
//!
//! # Example
//!
//! ```
//! use sotto_crypto::CryptState;
//!
//! let mut server = CryptState::generate();
//! let mut client = CryptState::new_from(&server); // counters swapped
//!
//! let datagram = server.encrypt(b"hello");
//! assert_eq!(client.decrypt(&datagram).unwrap(), b"hello");
//!
//! // The same wire bytes a second time are a replay.
//! assert!(client.decrypt(&datagram).is_err());
//! ```
//!
//! # Thread safety
//!
//! A `CryptState` is mutable shared state; serialize access to a single
//! instance (one exclusive lock, or single-task ownership). Distinct
//! instances are fully independent.

#![forbid(unsafe_code)]

mod nonce;
mod ocb;
pub mod replay;
pub mod state;

pub use nonce::NONCE_SIZE;
pub use replay::{ReplayFilter, Verdict, REPLAY_WINDOW};
pub use state::{CryptState, CryptStats, DecryptError, NonceError, HEADER_SIZE, KEY_SIZE, TAG_SIZE};
