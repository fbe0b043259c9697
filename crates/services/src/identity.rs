//! # Submitter identity
//!
//! Posts and comments are tagged with a token derived from the caller's raw
//! identifier (usually the client address) so the raw value is never stored.
//! The same input always yields the same token, which keeps per-submitter
//! heuristics possible. Tokens can still be correlated across posts; this is
//! not an anonymization primitive.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// Length of every token: 32 digest bytes in unpadded base64.
pub const TOKEN_LEN: usize = 43;

/// Derives submitter tokens from raw identifiers.
pub struct SubmitterHasher {
    /// Optional deployment-wide pepper. Empty means unsalted.
    salt: SecretString,
}

impl SubmitterHasher {
    pub fn new(salt: SecretString) -> Self {
        Self { salt }
    }

    pub fn unsalted() -> Self {
        Self::new(SecretString::from(String::new()))
    }

    /// Fixed-length, URL-safe, one-way token for `raw`.
    pub fn token(&self, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.expose_secret().as_bytes());
        hasher.update(raw.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Blank identifiers count as "no submitter".
    pub fn token_for(&self, raw: Option<&str>) -> Option<String> {
        raw.map(str::trim)
            .filter(|r| !r.is_empty())
            .map(|r| self.token(r))
    }
}

impl Default for SubmitterHasher {
    fn default() -> Self {
        Self::unsalted()
    }
}
