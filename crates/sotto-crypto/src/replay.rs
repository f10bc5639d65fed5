//! Replay and lateness detection for datagram sequence counters.
//!
//! Only the low byte of the sender's 128-bit counter travels on the wire,
//! so the filter keeps a 256-entry history indexed by that byte. Each
//! slot stores the second-lowest byte of the counter that last used it;
//! a slot whose stored byte does not match the candidate's second byte
//! belongs to an older 256-cycle and counts as stale.
//!
//! Classification runs before the authentication tag is checked, so a
//! flood of replayed datagrams is rejected without touching AES.
//!
//! # Thread safety
//!
//! Not thread-safe. [`CryptState`](crate::CryptState) serializes access.

/// Sequence positions covered by the lateness window.
///
/// A candidate `REPLAY_WINDOW - 1` or more positions behind the newest
/// accepted counter is rejected as late: the boundary sits between 31
/// and 32 positions back.
pub const REPLAY_WINDOW: u8 = 32;

/// Pre-verification classification of an inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Not seen before and within the window; proceed to tag verification.
    Fresh,
    /// Already accepted in the current window.
    Repeat,
    /// Too far behind the newest accepted counter to trust.
    Late,
}

/// History of recently accepted sequence counters.
#[derive(Debug, Clone)]
pub struct ReplayFilter {
    history: [u8; 256],
}

impl Default for ReplayFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self { history: [0; 256] }
    }

    /// Classify `candidate`, which sits `diff` positions from the newest
    /// accepted counter (`diff` as returned by the nonce reconstruction,
    /// positive = ahead).
    pub fn classify(&self, candidate: u128, diff: i32) -> Verdict {
        if diff <= 1 - i32::from(REPLAY_WINDOW) {
            return Verdict::Late;
        }
        if diff <= 0 && self.history[slot(candidate)] == marker(candidate) {
            return Verdict::Repeat;
        }
        Verdict::Fresh
    }

    /// Record an accepted counter. Call only after its tag verified;
    /// recording a forged counter would let an attacker poison the
    /// window.
    pub fn record(&mut self, candidate: u128) {
        self.history[slot(candidate)] = marker(candidate);
    }

    /// Forget all history (explicit resynchronization).
    pub fn reset(&mut self) {
        self.history = [0; 256];
    }
}

fn slot(counter: u128) -> usize {
    counter as u8 as usize
}

fn marker(counter: u128) -> u8 {
    (counter >> 8) as u8
}
