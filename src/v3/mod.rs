//! SNMPv3 User-based Security Model (RFC 3414, RFC 3826, RFC 7860).
//!
//! - [`UsmSecurityParams`] - the per-message security envelope
//! - [`LocalizedKey`] - password-to-key derivation and HMAC authentication
//! - [`PrivKey`] - AES-128/192/256-CFB privacy
//! - [`UsmUser`] - a user's localized keys for one engine id, able to
//!   verify and decrypt inbound messages and to build authenticated replies

pub mod auth;
mod privacy;
mod usm;

use std::net::SocketAddr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use auth::{LocalizedKey, MIN_PASSWORD_LENGTH};
pub use privacy::{PrivKey, SaltCounter};
pub use usm::UsmSecurityParams;

use crate::ber::Decoder;
use crate::error::{CryptoErrorKind, Error, Result};
use crate::message::{MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, V3Message, V3MessageData};
use crate::util::hex::Hex;

/// msgMaxSize advertised in messages we build.
pub const DEFAULT_MSG_MAX_SIZE: i32 = 65507;

/// Authentication protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthProtocol {
    /// HMAC-MD5-96
    Md5,
    /// HMAC-SHA-96
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
            Self::Sha224 => write!(f, "SHA-224"),
            Self::Sha256 => write!(f, "SHA-256"),
            Self::Sha384 => write!(f, "SHA-384"),
            Self::Sha512 => write!(f, "SHA-512"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = Box<Error>;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" => Ok(Self::Sha1),
            "SHA224" | "SHA-224" => Ok(Self::Sha224),
            "SHA256" | "SHA-256" => Ok(Self::Sha256),
            "SHA384" | "SHA-384" => Ok(Self::Sha384),
            "SHA512" | "SHA-512" => Ok(Self::Sha512),
            _ => Err(Error::validation(
                "auth_protocol",
                format!("unknown protocol '{s}'; expected MD5, SHA, SHA-224, SHA-256, SHA-384 or SHA-512"),
            )),
        }
    }
}

impl AuthProtocol {
    /// Digest output length, which is also the localized key length.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Length of the truncated MAC carried in msgAuthenticationParameters.
    pub fn mac_len(self) -> usize {
        match self {
            Self::Md5 | Self::Sha1 => 12,
            Self::Sha224 => 16,
            Self::Sha256 => 24,
            Self::Sha384 => 32,
            Self::Sha512 => 48,
        }
    }

    /// Whether this digest yields enough key material for `priv_protocol`.
    pub fn is_compatible_with(self, priv_protocol: PrivProtocol) -> bool {
        self.digest_len() >= priv_protocol.key_len()
    }
}

/// Privacy protocols. Only the AES-CFB family is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrivProtocol {
    Aes128,
    Aes192,
    Aes256,
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aes128 => write!(f, "AES"),
            Self::Aes192 => write!(f, "AES-192"),
            Self::Aes256 => write!(f, "AES-256"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = Box<Error>;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AES" | "AES128" | "AES-128" => Ok(Self::Aes128),
            "AES192" | "AES-192" => Ok(Self::Aes192),
            "AES256" | "AES-256" => Ok(Self::Aes256),
            _ => Err(Error::validation(
                "priv_protocol",
                format!("unknown protocol '{s}'; expected AES, AES-192 or AES-256"),
            )),
        }
    }
}

impl PrivProtocol {
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }
}

/// A USM user's keys, localized to one authoritative engine id.
#[derive(Debug)]
pub struct UsmUser {
    username: Bytes,
    auth: Option<LocalizedKey>,
    privacy: Option<PrivKey>,
}

impl UsmUser {
    /// Localize passwords for `engine_id`. Privacy needs authentication,
    /// and the auth digest must be long enough for the AES key.
    pub fn localize(
        username: impl Into<Bytes>,
        auth: Option<(AuthProtocol, &[u8])>,
        privacy: Option<(PrivProtocol, &[u8])>,
        engine_id: &[u8],
    ) -> Result<Self> {
        let invalid = |reason: String| {
            Error::InvalidSecurityProfile {
                engine_id: Hex(engine_id).to_string(),
                reason,
            }
            .boxed()
        };
        let username = username.into();
        if username.len() > 32 {
            return Err(invalid(format!("user name of {} bytes, max 32", username.len())));
        }

        let privacy = match (auth, privacy) {
            (_, None) => None,
            (None, Some(_)) => return Err(invalid("privacy requires authentication".into())),
            (Some((auth_protocol, _)), Some((priv_protocol, _)))
                if !auth_protocol.is_compatible_with(priv_protocol) =>
            {
                return Err(invalid(format!(
                    "{auth_protocol} does not yield enough key material for {priv_protocol}"
                )));
            }
            (Some((auth_protocol, _)), Some((priv_protocol, password))) => Some(PrivKey::from_password(
                auth_protocol,
                priv_protocol,
                password,
                engine_id,
            )),
        };
        let auth = auth.map(|(protocol, password)| LocalizedKey::from_password(protocol, password, engine_id));

        Ok(Self {
            username,
            auth,
            privacy,
        })
    }

    pub fn username(&self) -> &Bytes {
        &self.username
    }

    pub fn security_level(&self) -> SecurityLevel {
        match (&self.auth, &self.privacy) {
            (None, _) => SecurityLevel::NoAuthNoPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
        }
    }

    /// Verify and decrypt an inbound message. `raw` is the datagram `msg`
    /// was decoded from, since the HMAC covers those exact bytes; `params`
    /// are its decoded security parameters.
    pub fn open(
        &self,
        raw: &Bytes,
        msg: &V3Message,
        params: &UsmSecurityParams,
        source: SocketAddr,
    ) -> Result<ScopedPdu> {
        let level = msg.security_level();
        if level != self.security_level() || params.username != self.username {
            tracing::debug!(
                target: "netloc::manager",
                { snmp.source = %source, ?level, expected = ?self.security_level() },
                "security level or user name mismatch"
            );
            return Err(Error::Auth { target: source }.boxed());
        }

        if let Some(key) = &self.auth {
            let (offset, len) = UsmSecurityParams::find_auth_params_offset(raw)
                .ok_or_else(|| Error::crypto(CryptoErrorKind::MissingAuthParams))?;
            if !auth::verify_message(key, raw, offset, len)? {
                tracing::debug!(target: "netloc::manager", { snmp.source = %source }, "HMAC verification failed");
                return Err(Error::Auth { target: source }.boxed());
            }
        }

        let scoped = match (&msg.data, &self.privacy) {
            (V3MessageData::Plaintext(scoped), _) => scoped.clone(),
            (V3MessageData::Encrypted(ciphertext), Some(key)) => {
                let plaintext = key.decrypt(ciphertext, params.engine_boots, params.engine_time, &params.priv_params)?;
                ScopedPdu::decode(&mut Decoder::new(plaintext))?
            }
            (V3MessageData::Encrypted(_), None) => return Err(Error::Auth { target: source }.boxed()),
        };
        Ok(scoped)
    }

    /// Build a complete outbound message at this user's security level.
    pub fn seal(
        &self,
        msg_id: i32,
        engine_id: Bytes,
        engine_boots: u32,
        engine_time: u32,
        scoped: &ScopedPdu,
    ) -> Result<Bytes> {
        let level = self.security_level();
        let global = MsgGlobalData::new(msg_id, DEFAULT_MSG_MAX_SIZE, MsgFlags::new(level, false));
        let mut params = UsmSecurityParams::new(engine_id, engine_boots, engine_time, self.username.clone());

        let data = match &self.privacy {
            Some(key) => {
                let (ciphertext, salt) = key.encrypt(&scoped.encode_to_bytes(), engine_boots, engine_time)?;
                params = params.with_priv_params(salt);
                V3MessageData::Encrypted(ciphertext)
            }
            None => V3MessageData::Plaintext(scoped.clone()),
        };
        if let Some(key) = &self.auth {
            params = params.with_auth_placeholder(key.mac_len());
        }

        let msg = V3Message {
            global_data: global,
            security_params: params.encode(),
            data,
        };
        let encoded = msg.encode();
        let Some(key) = &self.auth else {
            return Ok(encoded);
        };
        let (offset, len) = UsmSecurityParams::find_auth_params_offset(&encoded)
            .ok_or_else(|| Error::crypto(CryptoErrorKind::MissingAuthParams))?;
        let mut buf = encoded.to_vec();
        auth::authenticate_message(key, &mut buf, offset, len)?;
        Ok(Bytes::from(buf))
    }
}
