#![warn(missing_docs)]
//! # spa-auth-pkce
//!
//! ## Purpose
//! Generates CSRF nonces and RFC 7636 PKCE verifier/challenge pairs.
//!
//! ## Responsibilities
//! - Produce 56-character hex identifiers from 28 random bytes.
//! - Derive the S256 code challenge from a verifier.
//! - Keep the randomness source injectable for deterministic tests.
//!
//! ## Data flow
//! Session `login`/`register` -> [`random_identifier`] for the state nonce and
//! [`generate_pkce`] for the verifier -> challenge goes into the redirect URL,
//! verifier goes into a cookie.
//!
//! ## Ownership and lifetimes
//! Returned values are owned strings; nothing borrows from the random source.
//!
//! ## Error model
//! Generation is infallible. The thread-local generator reseeds from the OS.
//!
//! ## Security and privacy notes
//! The default [`ThreadRandom`] source is a CSPRNG. Callers must not log the
//! verifier.
//!
//! ## Example
//! ```rust
//! use spa_auth_pkce::{challenge_for, generate_pkce, ThreadRandom};
//!
//! let pair = generate_pkce(&ThreadRandom);
//! assert_eq!(pair.verifier.len(), 56);
//! assert_eq!(pair.challenge, challenge_for(&pair.verifier));
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Random bytes behind one identifier.
pub const IDENTIFIER_BYTES: usize = 28;

/// Length of a hex-encoded identifier.
pub const IDENTIFIER_LEN: usize = IDENTIFIER_BYTES * 2;

/// Challenge method sent alongside the challenge.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Source of random bytes.
pub trait RandomSource: Send + Sync {
    /// Fills `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Thread-local CSPRNG source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        rand::rng().fill(dest);
    }
}

/// PKCE secret and its derived challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Secret kept client-side until code exchange.
    pub verifier: String,
    /// `base64url(SHA-256(verifier))` without padding.
    pub challenge: String,
}

/// Returns a 56-character lowercase hex identifier.
pub fn random_identifier(source: &dyn RandomSource) -> String {
    let mut bytes = [0_u8; IDENTIFIER_BYTES];
    source.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates a fresh verifier and its S256 challenge.
pub fn generate_pkce(source: &dyn RandomSource) -> PkcePair {
    let verifier = random_identifier(source);
    let challenge = challenge_for(&verifier);
    PkcePair {
        verifier,
        challenge,
    }
}

/// Applies the S256 transform to a verifier.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
