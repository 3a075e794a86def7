//! AES-CFB-128 privacy (RFC 3826).
//!
//! The privacy key is the localized key of the privacy password, truncated
//! to the AES key size. The IV is `engineBoots || engineTime || salt`
//! (concatenated, not XORed); the 8-byte salt travels as `msgPrivacyParameters`.

use std::sync::atomic::{AtomicU64, Ordering};

use aes::{Aes128, Aes192, Aes256};
use bytes::Bytes;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{AuthProtocol, LocalizedKey, PrivProtocol};
use crate::error::{CryptoErrorKind, Error, Result};

const SALT_LEN: usize = 8;

/// Monotonic salt source seeded from the OS RNG. Zero is never handed out.
#[derive(Debug)]
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    pub fn new() -> Self {
        let mut seed = [0u8; 8];
        // A failed RNG read leaves a fixed seed; salts stay unique per key either way.
        if getrandom::fill(&mut seed).is_err() {
            tracing::warn!(target: "netloc::manager", "OS RNG unavailable, salt counter seeded with 1");
        }
        Self::from_value(u64::from_ne_bytes(seed).max(1))
    }

    pub fn from_value(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    pub fn next(&self) -> u64 {
        loop {
            let value = self.0.fetch_add(1, Ordering::Relaxed);
            if value != 0 {
                return value;
            }
        }
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Privacy key bound to one engine id.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
    #[zeroize(skip)]
    salt: SaltCounter,
}

impl PrivKey {
    /// Localize `password` with the profile's authentication hash. Callers
    /// check [`AuthProtocol::is_compatible_with`] first.
    pub fn from_password(
        auth_protocol: AuthProtocol,
        protocol: PrivProtocol,
        password: &[u8],
        engine_id: &[u8],
    ) -> Self {
        let localized = LocalizedKey::from_password(auth_protocol, password, engine_id);
        Self::from_bytes(protocol, localized.as_bytes())
    }

    pub fn from_bytes(protocol: PrivProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
            salt: SaltCounter::new(),
        }
    }

    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    fn cipher_key(&self) -> Result<&[u8]> {
        self.key
            .get(..self.protocol.key_len())
            .ok_or_else(|| Error::crypto(CryptoErrorKind::InvalidKeyLength))
    }

    /// Encrypt, returning `(ciphertext, privParameters)`.
    pub fn encrypt(&self, plaintext: &[u8], engine_boots: u32, engine_time: u32) -> Result<(Bytes, Bytes)> {
        let salt = self.salt.next().to_be_bytes();
        let iv = iv(engine_boots, engine_time, &salt);
        let key = self.cipher_key()?;
        let mut buffer = plaintext.to_vec();
        let bad_key = |_| Error::crypto(CryptoErrorKind::InvalidKeyLength);
        match self.protocol {
            PrivProtocol::Aes128 => cfb_mode::Encryptor::<Aes128>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .encrypt(&mut buffer),
            PrivProtocol::Aes192 => cfb_mode::Encryptor::<Aes192>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .encrypt(&mut buffer),
            PrivProtocol::Aes256 => cfb_mode::Encryptor::<Aes256>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .encrypt(&mut buffer),
        }
        Ok((Bytes::from(buffer), Bytes::copy_from_slice(&salt)))
    }

    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
    ) -> Result<Bytes> {
        let salt: &[u8; SALT_LEN] = priv_params.try_into().map_err(|_| {
            Error::crypto(CryptoErrorKind::InvalidPrivParamsLength {
                expected: SALT_LEN,
                actual: priv_params.len(),
            })
        })?;
        let iv = iv(engine_boots, engine_time, salt);
        let key = self.cipher_key()?;
        let mut buffer = ciphertext.to_vec();
        let bad_key = |_| Error::crypto(CryptoErrorKind::InvalidKeyLength);
        match self.protocol {
            PrivProtocol::Aes128 => cfb_mode::Decryptor::<Aes128>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .decrypt(&mut buffer),
            PrivProtocol::Aes192 => cfb_mode::Decryptor::<Aes192>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .decrypt(&mut buffer),
            PrivProtocol::Aes256 => cfb_mode::Decryptor::<Aes256>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .decrypt(&mut buffer),
        }
        Ok(Bytes::from(buffer))
    }
}

fn iv(engine_boots: u32, engine_time: u32, salt: &[u8; SALT_LEN]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
    iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
    iv[8..].copy_from_slice(salt);
    iv
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
