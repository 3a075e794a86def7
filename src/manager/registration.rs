//! Per-IP registrations and their SNMPv3 security settings.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::pdu::AnyPdu;
use crate::util::hex::{self, Hex};
use crate::v3::{AuthProtocol, MIN_PASSWORD_LENGTH, PrivProtocol, UsmUser};
use crate::version::Version;

/// A decoded notification or response, as handed to a registrant.
#[derive(Debug, Clone)]
pub struct Received {
    pub version: Version,
    /// Community string, or the authoritative engine id for v3.
    pub community: Bytes,
    pub pdu: AnyPdu,
    pub source: SocketAddr,
}

impl Received {
    pub fn source_ip(&self) -> IpAddr {
        self.source.ip()
    }

    pub fn source_port(&self) -> u16 {
        self.source.port()
    }

    /// Request id, absent for v1 traps.
    pub fn request_id(&self) -> Option<i32> {
        self.pdu.as_pdu().map(|pdu| pdu.request_id)
    }
}

pub type Callback = Arc<dyn Fn(Received) + Send + Sync + 'static>;

/// A protocol and its password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential<P> {
    pub protocol: P,
    pub password: String,
}

impl<P: std::fmt::Debug> std::fmt::Debug for Credential<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("protocol", &self.protocol)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// USM user settings for one engine id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityProfile {
    pub username: String,
    #[serde(default)]
    pub auth: Option<Credential<AuthProtocol>>,
    #[serde(default)]
    pub privacy: Option<Credential<PrivProtocol>>,
}

impl SecurityProfile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            auth: None,
            privacy: None,
        }
    }

    pub fn auth(mut self, protocol: AuthProtocol, password: impl Into<String>) -> Self {
        self.auth = Some(Credential {
            protocol,
            password: password.into(),
        });
        self
    }

    pub fn privacy(mut self, protocol: PrivProtocol, password: impl Into<String>) -> Self {
        self.privacy = Some(Credential {
            protocol,
            password: password.into(),
        });
        self
    }

    /// Check required fields and localize keys for `engine_id`.
    fn localize(&self, engine_id: &[u8]) -> Result<UsmUser> {
        let invalid = |reason: &str| {
            Error::InvalidSecurityProfile {
                engine_id: Hex(engine_id).to_string(),
                reason: reason.to_string(),
            }
            .boxed()
        };
        if !(5..=32).contains(&engine_id.len()) {
            return Err(invalid("engine id must be 5 to 32 bytes"));
        }
        if self.username.is_empty() {
            return Err(invalid("user name is required"));
        }
        let credentials = [self.auth.as_ref().map(|c| &c.password), self.privacy.as_ref().map(|c| &c.password)];
        if credentials.into_iter().flatten().any(|p| p.len() < MIN_PASSWORD_LENGTH) {
            return Err(invalid("passwords must be at least 8 characters"));
        }

        UsmUser::localize(
            Bytes::copy_from_slice(self.username.as_bytes()),
            self.auth.as_ref().map(|c| (c.protocol, c.password.as_bytes())),
            self.privacy.as_ref().map(|c| (c.protocol, c.password.as_bytes())),
            engine_id,
        )
    }
}

/// v3 security profiles keyed by authoritative engine id.
#[derive(Debug, Clone, Default)]
pub struct SecuritySettings {
    profiles: HashMap<Bytes, SecurityProfile>,
}

impl SecuritySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(mut self, engine_id: impl Into<Bytes>, profile: SecurityProfile) -> Self {
        self.profiles.insert(engine_id.into(), profile);
        self
    }

    /// Like [`profile`](Self::profile) with a hex engine id (`0x` optional).
    pub fn profile_hex(self, engine_id: &str, profile: SecurityProfile) -> Result<Self> {
        let raw = hex::decode(engine_id)
            .ok_or_else(|| Error::validation("engine_id", format!("'{engine_id}' is not hex")))?;
        Ok(self.profile(raw, profile))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    fn localize(&self) -> Result<HashMap<Bytes, UsmUser>> {
        self.profiles
            .iter()
            .map(|(engine_id, profile)| Ok((engine_id.clone(), profile.localize(engine_id)?)))
            .collect()
    }
}

/// Everything the manager holds for one registered IP.
pub struct Registration {
    context: ExecutionContext,
    span: Span,
    users: HashMap<Bytes, UsmUser>,
    callback: Callback,
}

impl Registration {
    /// Validate `settings` and localize every profile's keys. Nothing is
    /// registered if any profile is rejected.
    pub fn new(
        context: ExecutionContext,
        span: Span,
        settings: &SecuritySettings,
        callback: impl Fn(Received) + Send + Sync + 'static,
    ) -> Result<Self> {
        Ok(Self {
            context,
            span,
            users: settings.localize()?,
            callback: Arc::new(callback),
        })
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn user(&self, engine_id: &[u8]) -> Option<&UsmUser> {
        self.users.get(engine_id)
    }

    /// Hand `received` to the registrant's context.
    pub(crate) fn post(&self, received: Received) {
        let callback = Arc::clone(&self.callback);
        let span = self.span.clone();
        let source = received.source;
        let posted = self.context.post(move || {
            let _entered = span.enter();
            callback(received);
        });
        if posted.is_err() {
            tracing::warn!(
                target: "netloc::manager",
                { snmp.source = %source, context = self.context.name() },
                "execution context closed, dropping callback"
            );
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("context", &self.context)
            .field("engine_ids", &self.users.keys().map(|id| Hex(id).to_string()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENGINE: &[u8] = b"\x80\x00\x1f\x88\x80\x01\x02\x03";

    #[tokio::test]
    async fn test_valid_settings_localize() {
        let settings = SecuritySettings::new()
            .profile(
                Bytes::from_static(ENGINE),
                SecurityProfile::new("trapuser")
                    .auth(AuthProtocol::Sha256, "authpass123")
                    .privacy(PrivProtocol::Aes256, "privpass123"),
            )
            .profile_hex("0x8000000001020304", SecurityProfile::new("public"))
            .unwrap();
        let reg = Registration::new(ExecutionContext::spawn("t"), Span::none(), &settings, |_| {}).unwrap();
        assert!(reg.user(ENGINE).is_some());
        assert!(reg.user(&[0x80, 0, 0, 0, 1, 2, 3, 4]).is_some());
    }

    #[tokio::test]
    async fn test_invalid_profiles_rejected_at_registration() {
        let cases = [
            SecurityProfile::new(""),
            SecurityProfile::new("u").auth(AuthProtocol::Md5, "short"),
            SecurityProfile::new("u").privacy(PrivProtocol::Aes128, "privpass123"),
            SecurityProfile::new("u")
                .auth(AuthProtocol::Md5, "authpass123")
                .privacy(PrivProtocol::Aes192, "privpass123"),
        ];
        for profile in cases {
            let settings = SecuritySettings::new().profile(Bytes::from_static(ENGINE), profile);
            let err = Registration::new(ExecutionContext::spawn("t"), Span::none(), &settings, |_| {}).unwrap_err();
            assert!(matches!(*err, Error::InvalidSecurityProfile { .. }), "{err}");
        }

        let settings = SecuritySettings::new().profile(Bytes::from_static(b"abc"), SecurityProfile::new("u"));
        assert!(Registration::new(ExecutionContext::spawn("t"), Span::none(), &settings, |_| {}).is_err());
        assert!(SecuritySettings::new().profile_hex("zz", SecurityProfile::new("u")).is_err());
    }

    #[test]
    fn test_credentials_redacted() {
        let profile = SecurityProfile::new("u").auth(AuthProtocol::Sha1, "sekrit-password");
        assert!(!format!("{profile:?}").contains("sekrit"));
    }

    #[test]
    fn test_profile_deserializes() {
        let profile: SecurityProfile = serde_json::from_str(
            r#"{"username":"trapuser","auth":{"protocol":"sha256","password":"authpass123"}}"#,
        )
        .unwrap();
        assert_eq!(profile.auth.unwrap().protocol, AuthProtocol::Sha256);
        assert!(profile.privacy.is_none());
    }
}
