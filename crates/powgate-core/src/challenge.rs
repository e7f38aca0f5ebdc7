use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::hash::{count_leading_zero_bits, sha256};

/// Error indicating that the operating system could not supply challenge
/// randomness.
#[derive(Debug, Error)]
#[error("failed to draw challenge randomness: {0}")]
pub struct RandomnessError(#[from] rand::Error);

/// Error indicating that the entire nonce space was searched without
/// finding a satisfying solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("nonce space exhausted without finding a solution")]
pub struct NonceSpaceExhausted;

/// A hashcash challenge bound to a single peer.
///
/// The server commits to `(random, unix_seconds, identity, difficulty)` for
/// one connection; a solution is a nonce whose verification digest carries
/// at least `difficulty` leading zero bits. The bound identity and
/// difficulty are immutable once the challenge exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    random: [u8; 32],
    unix_seconds: i64,
    identity: String,
    difficulty: u8,
}

impl Challenge {
    /// Generates a fresh challenge for `identity` at the given difficulty.
    ///
    /// The 32 random bytes come from the operating system CSPRNG; failure to
    /// draw them is the only error path.
    pub fn generate(
        identity: impl Into<String>,
        difficulty: u8,
    ) -> Result<Self, RandomnessError> {
        let mut random = [0u8; 32];
        OsRng.try_fill_bytes(&mut random)?;
        Ok(Self {
            random,
            unix_seconds: unix_now(),
            identity: identity.into(),
            difficulty,
        })
    }

    /// Reassembles a challenge from its transmitted parts.
    ///
    /// Used by clients that received the tuple over the wire and need to
    /// search for a solution against the exact same digest input.
    #[must_use]
    pub fn from_parts(
        random: [u8; 32],
        unix_seconds: i64,
        identity: impl Into<String>,
        difficulty: u8,
    ) -> Self {
        Self {
            random,
            unix_seconds,
            identity: identity.into(),
            difficulty,
        }
    }

    #[must_use]
    pub fn random(&self) -> &[u8; 32] {
        &self.random
    }

    #[must_use]
    pub fn unix_seconds(&self) -> i64 {
        self.unix_seconds
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    /// Returns `true` while the challenge is no older than `max_age`.
    ///
    /// Advisory on the server path, where a challenge lives only for one
    /// bounded session; required whenever challenges are persisted or
    /// forwarded.
    #[must_use]
    pub fn is_valid(&self, max_age: Duration) -> bool {
        let age = unix_now() - self.unix_seconds;
        age <= i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX)
    }

    /// Computes the verification digest for `nonce`.
    ///
    /// The digest input is the canonical form
    /// `base64_std(random) ":" unix_seconds ":" identity ":" nonce` with the
    /// timestamp and nonce in plain decimal. Both ends must produce this
    /// byte sequence exactly or verification silently fails.
    #[must_use]
    pub fn digest(&self, nonce: u64) -> [u8; 32] {
        let material = format!(
            "{}:{}:{}:{}",
            BASE64_STANDARD.encode(self.random),
            self.unix_seconds,
            self.identity,
            nonce
        );
        sha256(material.as_bytes())
    }

    /// Returns `true` if `nonce` solves this challenge for the presenting
    /// peer.
    ///
    /// The presented identity must equal the bound identity, and the
    /// verification digest must carry at least `difficulty` leading zero
    /// bits.
    #[must_use]
    pub fn verify(&self, nonce: u64, presented_identity: &str) -> bool {
        if presented_identity != self.identity {
            return false;
        }
        count_leading_zero_bits(&self.digest(nonce)) >= u32::from(self.difficulty)
    }

    /// Searches for the smallest nonce satisfying the challenge.
    ///
    /// Expected work is `2^difficulty` digests. CPU-bound; callers on an
    /// async runtime should run it on a blocking thread.
    pub fn solve(&self) -> Result<u64, NonceSpaceExhausted> {
        let required = u32::from(self.difficulty);
        for nonce in 0..=u64::MAX {
            if count_leading_zero_bits(&self.digest(nonce)) >= required {
                return Ok(nonce);
            }
        }
        Err(NonceSpaceExhausted)
    }
}

fn unix_now() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(err) => -(err.duration().as_secs() as i64),
    }
}
