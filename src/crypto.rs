//! Channel encryption: Fernet tokens under the pre-shared key.
//!
//! Every framed message carries one Fernet token: a self-contained,
//! versioned, url-safe base64 string bundling IV, timestamp, ciphertext
//! (AES-128-CBC), and an HMAC-SHA256 tag. Tampering, truncation, or a
//! key mismatch all surface as a decrypt error, which callers treat as
//! a connection-level failure: once a token fails to verify, the stream
//! can no longer be trusted to be frame-aligned.
//!
//! The key is supplied at construction (config value), never read from
//! a global, so ciphers are testable and keys rotatable.

use anyhow::{anyhow, Result};
use fernet::Fernet;

/// Symmetric cipher for controller traffic.
///
/// Cheap to construct; holds only derived key material.
pub struct ChannelCipher {
    fernet: Fernet,
}

impl std::fmt::Debug for ChannelCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("ChannelCipher").finish_non_exhaustive()
    }
}

impl ChannelCipher {
    /// Build a cipher from a url-safe base64 key (32 bytes decoded).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not valid url-safe base64 of the
    /// required length.
    pub fn new(key: &str) -> Result<Self> {
        let fernet = Fernet::new(key)
            .ok_or_else(|| anyhow!("invalid channel key: expected 32 bytes of url-safe base64"))?;
        Ok(Self { fernet })
    }

    /// Encrypt plaintext into a token string.
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        self.fernet.encrypt(plaintext)
    }

    /// Decrypt and verify a token, returning the plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, was tampered with,
    /// or was produced under a different key. Distinct from the
    /// connection-closed condition, which the transport reports as
    /// `None` before any token reaches this layer.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>> {
        self.fernet.decrypt(token).map_err(|e| {
            anyhow!("token failed integrity check (tampered, truncated, or wrong key): {e:?}")
        })
    }

    /// Generate a fresh random key suitable for [`ChannelCipher::new`].
    #[must_use]
    pub fn generate_key() -> String {
        Fernet::generate_key()
    }
}
