//! USM authentication (RFC 3414 A.2, RFC 7860).
//!
//! Password-to-key expansion, key localization against an engine id, and
//! truncated HMACs over whole messages.

use digest::{Digest, KeyInit, Mac};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AuthProtocol;
use crate::error::{CryptoErrorKind, Error, Result};

/// Passwords shorter than this are accepted but logged; net-snmp refuses them.
pub const MIN_PASSWORD_LENGTH: usize = 8;

const EXPANSION_SIZE: usize = 1_048_576;

macro_rules! hmac_with {
    ($digest:ty, $key:expr, $data:expr) => {{
        let mut mac = <hmac::Hmac<$digest> as KeyInit>::new_from_slice($key)
            .map_err(|_| Error::crypto(CryptoErrorKind::InvalidKeyLength))?;
        Mac::update(&mut mac, $data);
        mac.finalize().into_bytes().to_vec()
    }};
}

/// Authentication key bound to one engine id.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// `Kul = H(Ku || engine_id || Ku)` where `Ku` hashes 1 MiB of repeated password.
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        if password.len() < MIN_PASSWORD_LENGTH {
            tracing::warn!(target: "netloc::manager", { password_len = password.len(), %protocol }, "SNMPv3 password shorter than 8 characters");
        }
        let key = match protocol {
            AuthProtocol::Md5 => derive::<md5::Md5>(password, engine_id),
            AuthProtocol::Sha1 => derive::<sha1::Sha1>(password, engine_id),
            AuthProtocol::Sha224 => derive::<sha2::Sha224>(password, engine_id),
            AuthProtocol::Sha256 => derive::<sha2::Sha256>(password, engine_id),
            AuthProtocol::Sha384 => derive::<sha2::Sha384>(password, engine_id),
            AuthProtocol::Sha512 => derive::<sha2::Sha512>(password, engine_id),
        };
        Self { key, protocol }
    }

    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn mac_len(&self) -> usize {
        self.protocol.mac_len()
    }

    /// Truncated HMAC of `data`.
    pub fn compute_hmac(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut mac = match self.protocol {
            AuthProtocol::Md5 => hmac_with!(md5::Md5, &self.key, data),
            AuthProtocol::Sha1 => hmac_with!(sha1::Sha1, &self.key, data),
            AuthProtocol::Sha224 => hmac_with!(sha2::Sha224, &self.key, data),
            AuthProtocol::Sha256 => hmac_with!(sha2::Sha256, &self.key, data),
            AuthProtocol::Sha384 => hmac_with!(sha2::Sha384, &self.key, data),
            AuthProtocol::Sha512 => hmac_with!(sha2::Sha512, &self.key, data),
        };
        mac.truncate(self.mac_len());
        Ok(mac)
    }

    /// Constant-time comparison against a received MAC.
    pub fn verify_hmac(&self, data: &[u8], expected: &[u8]) -> Result<bool> {
        let computed = self.compute_hmac(data)?;
        Ok(computed.len() == expected.len() && bool::from(computed.ct_eq(expected)))
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn derive<D: Digest>(password: &[u8], engine_id: &[u8]) -> Vec<u8> {
    let master = password_to_key::<D>(password);
    let mut hasher = D::new();
    hasher.update(&master);
    hasher.update(engine_id);
    hasher.update(&master);
    hasher.finalize().to_vec()
}

fn password_to_key<D: Digest>(password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![0u8; <D as Digest>::output_size()];
    }
    let mut hasher = D::new();
    let mut chunk = [0u8; 64];
    let mut repeated = password.iter().cycle();
    for _ in 0..EXPANSION_SIZE / chunk.len() {
        for (slot, byte) in chunk.iter_mut().zip(&mut repeated) {
            *slot = *byte;
        }
        hasher.update(chunk);
    }
    hasher.finalize().to_vec()
}

/// Overwrite the zeroed authentication parameters at `offset..offset+len`
/// with the HMAC of the whole message.
pub fn authenticate_message(key: &LocalizedKey, message: &mut [u8], offset: usize, len: usize) -> Result<()> {
    let mac = key.compute_hmac(message)?;
    let slot = message
        .get_mut(offset..offset + len)
        .filter(|slot| slot.len() == mac.len())
        .ok_or_else(|| Error::crypto(CryptoErrorKind::InvalidKeyLength))?;
    slot.copy_from_slice(&mac);
    Ok(())
}

/// Check the HMAC carried at `offset..offset+len`.
pub fn verify_message(key: &LocalizedKey, message: &[u8], offset: usize, len: usize) -> Result<bool> {
    let Some(received) = message.get(offset..offset + len) else {
        return Ok(false);
    };
    let mut zeroed = message.to_vec();
    zeroed[offset..offset + len].fill(0);
    key.verify_hmac(&zeroed, received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex;

    // RFC 3414 A.3
    const ENGINE_ID: &str = "000000000000000000000002";

    #[test]
    fn test_localized_md5() {
        let engine_id = hex::decode(ENGINE_ID).unwrap();
        let key = LocalizedKey::from_password(AuthProtocol::Md5, b"maplesyrup", &engine_id);
        assert_eq!(hex::encode(key.as_bytes()), "526f5eed9fcce26f8964c2930787d82b");
    }

    #[test]
    fn test_localized_sha1() {
        let engine_id = hex::decode(ENGINE_ID).unwrap();
        let key = LocalizedKey::from_password(AuthProtocol::Sha1, b"maplesyrup", &engine_id);
        assert_eq!(
            hex::encode(key.as_bytes()),
            "6695febc9288e36282235fc7151f128497b38f3f"
        );
    }

    #[test]
    fn test_master_key_md5() {
        let key = password_to_key::<md5::Md5>(b"maplesyrup");
        assert_eq!(hex::encode(&key), "9faf3283884e92834ebc9847d8edd963");
    }

    #[test]
    fn test_message_authentication() {
        let key = LocalizedKey::from_bytes(AuthProtocol::Sha256, vec![7u8; 32]);
        let mut message = b"header-xxxxxxxxxxxxxxxxxxxxxxxx-trailer".to_vec();
        let (offset, len) = (7, key.mac_len());
        message[offset..offset + len].fill(0);

        authenticate_message(&key, &mut message, offset, len).unwrap();
        assert!(verify_message(&key, &message, offset, len).unwrap());

        message[0] ^= 1;
        assert!(!verify_message(&key, &message, offset, len).unwrap());
    }
}
