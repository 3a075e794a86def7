//! SNMP Manager: decode inbound datagrams and route them to registrants.
//!
//! The manager owns the registration table. It is not itself concurrent:
//! a [`Dispatcher`](crate::dispatch::Dispatcher) owns one and drives it from
//! its actor task, which serializes registration against dispatch.
//!
//! For each datagram:
//!
//! 1. Decode the message envelope and version.
//! 2. v1/v2c: take the community from the header. v3: look up the sender's
//!    security profile by authoritative engine id, then verify and decrypt.
//! 3. Informs are acknowledged with a version-appropriate Response and
//!    delivered; traps are delivered with no acknowledgement; responses
//!    are handed back for request matching (when enabled); anything else
//!    is ignored.
//!
//! Failures are logged and the datagram is dropped. Nothing propagates.

mod registration;

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use bytes::Bytes;

pub use registration::{Callback, Credential, Received, Registration, SecurityProfile, SecuritySettings};

use crate::error::{Error, Result};
use crate::message::{CommunityMessage, Message, ScopedPdu, V3Message};
use crate::pdu::{AnyPdu, PduType};
use crate::util::hex::Hex;
use crate::v3::UsmSecurityParams;
use crate::version::Version;

/// What the dispatcher should do after a datagram was handled.
#[derive(Debug)]
pub enum Inbound {
    /// Send these bytes back to the source (an inform acknowledgement).
    /// The notification itself has already been delivered.
    Reply(Bytes),
    /// A Response PDU, to be matched against outstanding requests first.
    Response(Received),
    /// Delivered to the registrant, nothing to send.
    Delivered,
    /// Ignored or rejected; already logged.
    Dropped,
}

/// Registration table plus the decode/dispatch pipeline.
#[derive(Debug)]
pub struct SnmpManager {
    registrations: HashMap<IpAddr, Registration>,
    started: Instant,
    accept_responses: bool,
}

impl SnmpManager {
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
            started: Instant::now(),
            accept_responses: false,
        }
    }

    /// Return Response PDUs as [`Inbound::Response`] instead of dropping them.
    pub fn accept_responses(mut self, accept: bool) -> Self {
        self.accept_responses = accept;
        self
    }

    /// Install or replace the registration for `ip`.
    pub fn register(&mut self, ip: IpAddr, registration: Registration) {
        tracing::debug!(target: "netloc::manager", { snmp.ip = %ip }, "registered");
        self.registrations.insert(ip, registration);
    }

    /// Remove the registration for `ip`. Callbacks already posted still run.
    pub fn ignore(&mut self, ip: IpAddr) -> bool {
        let removed = self.registrations.remove(&ip).is_some();
        tracing::debug!(target: "netloc::manager", { snmp.ip = %ip, removed }, "ignored");
        removed
    }

    pub fn is_registered(&self, ip: IpAddr) -> bool {
        self.registrations.contains_key(&ip)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Whole seconds since construction; the engine time in v3 replies.
    pub fn v3_time(&self) -> u32 {
        u32::try_from(self.started.elapsed().as_secs())
            .unwrap_or(u32::MAX)
            .min(i32::MAX as u32)
    }

    /// Decode and route one datagram. Never fails: errors are logged at
    /// `warn` and yield [`Inbound::Dropped`].
    pub fn handle_datagram(&self, data: Bytes, source: SocketAddr) -> Inbound {
        match self.process(data, source) {
            Ok(inbound) => inbound,
            Err(err) => {
                tracing::warn!(target: "netloc::manager", { snmp.source = %source, error = %err }, "dropped datagram");
                Inbound::Dropped
            }
        }
    }

    /// Post `received` to its source's registrant, if any.
    pub fn deliver(&self, received: Received) -> bool {
        match self.registrations.get(&received.source_ip()) {
            Some(registration) => {
                registration.post(received);
                true
            }
            None => {
                tracing::debug!(target: "netloc::manager", { snmp.source = %received.source }, "no registration, dropping");
                false
            }
        }
    }

    fn process(&self, data: Bytes, source: SocketAddr) -> Result<Inbound> {
        let (received, reply) = match Message::decode(data.clone())? {
            Message::Community(msg) => open_community(msg, source),
            Message::V3(msg) => self.open_v3(&data, msg, source)?,
        };

        let pdu_type = received.pdu.pdu_type();
        if let Some(registration) = self.registrations.get(&received.source_ip()) {
            let _entered = registration.span().enter();
            tracing::debug!(
                target: "netloc::manager",
                { snmp.source = %source, snmp.version = %received.version, snmp.pdu_type = %pdu_type, snmp.request_id = ?received.request_id() },
                "received"
            );
        }

        match pdu_type {
            PduType::InformRequest => {
                // unregistered senders get no acknowledgement
                if self.deliver(received) {
                    Ok(reply.map_or(Inbound::Delivered, Inbound::Reply))
                } else {
                    Ok(Inbound::Dropped)
                }
            }
            PduType::TrapV1 | PduType::TrapV2 => {
                self.deliver(received);
                Ok(Inbound::Delivered)
            }
            PduType::Response if self.accept_responses => Ok(Inbound::Response(received)),
            other => {
                tracing::debug!(target: "netloc::manager", { snmp.source = %source, snmp.pdu_type = %other }, "ignoring PDU");
                Ok(Inbound::Dropped)
            }
        }
    }

    fn open_v3(&self, raw: &Bytes, msg: V3Message, source: SocketAddr) -> Result<(Received, Option<Bytes>)> {
        let params = UsmSecurityParams::decode(msg.security_params.clone(), 0)?;
        let unknown = || {
            Error::UnknownSecurityProfile {
                target: source,
                engine_id: Hex(&params.engine_id).to_string(),
            }
            .boxed()
        };
        let user = self
            .registrations
            .get(&source.ip())
            .and_then(|registration| registration.user(&params.engine_id))
            .ok_or_else(unknown)?;

        let scoped = user.open(raw, &msg, &params, source)?;
        let reply = match &scoped.pdu {
            AnyPdu::Standard(pdu) if pdu.pdu_type == PduType::InformRequest => {
                let response = ScopedPdu::new(
                    scoped.context_engine_id.clone(),
                    scoped.context_name.clone(),
                    pdu.to_response(),
                );
                Some(user.seal(
                    msg.global_data.msg_id,
                    params.engine_id.clone(),
                    params.engine_boots,
                    self.v3_time(),
                    &response,
                )?)
            }
            _ => None,
        };

        let received = Received {
            version: Version::V3,
            community: params.engine_id,
            pdu: scoped.pdu,
            source,
        };
        Ok((received, reply))
    }
}

impl Default for SnmpManager {
    fn default() -> Self {
        Self::new()
    }
}

fn open_community(msg: CommunityMessage, source: SocketAddr) -> (Received, Option<Bytes>) {
    let reply = match &msg.pdu {
        AnyPdu::Standard(pdu) if pdu.pdu_type == PduType::InformRequest => {
            Some(CommunityMessage::new(msg.version, msg.community.clone(), pdu.to_response()).encode())
        }
        _ => None,
    };
    let received = Received {
        version: msg.version,
        community: msg.community,
        pdu: msg.pdu,
        source,
    };
    (received, reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::message::SecurityLevel;
    use crate::oid;
    use crate::pdu::{GenericTrap, Pdu, TrapV1Pdu};
    use crate::v3::{AuthProtocol, PrivProtocol, UsmUser};
    use std::sync::{Arc, Mutex};
    use tracing::Span;

    const ENGINE: &[u8] = b"\x80\x00\x1f\x88\x80\x0a\x0b\x0c";

    fn source() -> SocketAddr {
        "192.0.2.10:40000".parse().unwrap()
    }

    fn recorder(settings: &SecuritySettings) -> (Registration, ExecutionContext, Arc<Mutex<Vec<Received>>>) {
        let ctx = ExecutionContext::spawn("switch");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reg = Registration::new(ctx.clone(), Span::none(), settings, move |r| sink.lock().unwrap().push(r)).unwrap();
        (reg, ctx, seen)
    }

    fn link_down() -> Pdu {
        Pdu::notification(PduType::TrapV2, 3, 100, oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3), vec![])
    }

    #[tokio::test]
    async fn test_v2c_trap_delivered_without_ack() {
        let (reg, ctx, seen) = recorder(&SecuritySettings::new());
        let mut manager = SnmpManager::new();
        manager.register(source().ip(), reg);

        let raw = CommunityMessage::v2c("public", link_down()).encode();
        assert!(matches!(manager.handle_datagram(raw, source()), Inbound::Delivered));
        ctx.flush().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(&seen[0].community[..], b"public");
        assert_eq!(seen[0].source_port(), 40000);
        assert_eq!(seen[0].pdu.trap_oid(), Some(oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3)));
    }

    #[tokio::test]
    async fn test_v1_trap_delivered() {
        let (reg, ctx, seen) = recorder(&SecuritySettings::new());
        let mut manager = SnmpManager::new();
        manager.register(source().ip(), reg);

        let trap = TrapV1Pdu::new(oid!(1, 3, 6, 1, 4, 1, 9), [192, 0, 2, 10], GenericTrap::LinkUp, 0, 5, vec![]);
        let raw = CommunityMessage::v1("public", trap).encode();
        assert!(matches!(manager.handle_datagram(raw, source()), Inbound::Delivered));
        ctx.flush().await.unwrap();
        assert_eq!(seen.lock().unwrap()[0].version, Version::V1);
    }

    #[tokio::test]
    async fn test_v2c_inform_acknowledged() {
        let (reg, ctx, seen) = recorder(&SecuritySettings::new());
        let mut manager = SnmpManager::new();
        manager.register(source().ip(), reg);

        let inform = Pdu::notification(PduType::InformRequest, 99, 1, oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1), vec![]);
        let raw = CommunityMessage::v2c("private", inform).encode();
        let Inbound::Reply(ack) = manager.handle_datagram(raw, source()) else {
            panic!("expected an acknowledgement");
        };
        let Message::Community(ack) = Message::decode(ack).unwrap() else {
            panic!("expected a community message");
        };
        assert_eq!(&ack.community[..], b"private");
        let pdu = ack.pdu.as_pdu().unwrap();
        assert_eq!(pdu.pdu_type, PduType::Response);
        assert_eq!(pdu.request_id, 99);

        ctx.flush().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unregistered_inform_not_acknowledged() {
        let manager = SnmpManager::new();
        let inform = Pdu::notification(PduType::InformRequest, 5, 1, oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1), vec![]);
        let raw = CommunityMessage::v2c("public", inform).encode();
        assert!(matches!(manager.handle_datagram(raw, source()), Inbound::Dropped));
    }

    #[tokio::test]
    async fn test_inform_after_ignore_is_dropped() {
        let (reg, ctx, seen) = recorder(&SecuritySettings::new());
        let mut manager = SnmpManager::new();
        manager.register(source().ip(), reg);

        let inform = |id| {
            let pdu = Pdu::notification(PduType::InformRequest, id, 1, oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1), vec![]);
            CommunityMessage::v2c("public", pdu).encode()
        };
        assert!(matches!(manager.handle_datagram(inform(1), source()), Inbound::Reply(_)));
        assert!(manager.ignore(source().ip()));
        assert!(matches!(manager.handle_datagram(inform(2), source()), Inbound::Dropped));

        ctx.flush().await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].request_id(), Some(1));
    }

    #[tokio::test]
    async fn test_v3_inform_acknowledged_with_auth_priv() {
        let profile = SecurityProfile::new("trapuser")
            .auth(AuthProtocol::Sha1, "authpass123")
            .privacy(PrivProtocol::Aes128, "privpass123");
        let (reg, ctx, seen) = recorder(&SecuritySettings::new().profile(Bytes::from_static(ENGINE), profile));
        let mut manager = SnmpManager::new();
        manager.register(source().ip(), reg);

        let sender = UsmUser::localize(
            "trapuser",
            Some((AuthProtocol::Sha1, b"authpass123")),
            Some((PrivProtocol::Aes128, b"privpass123")),
            ENGINE,
        )
        .unwrap();
        let inform = Pdu::notification(PduType::InformRequest, 1234, 1, oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 2), vec![]);
        let scoped = ScopedPdu::new(Bytes::from_static(ENGINE), Bytes::new(), inform);
        let raw = sender.seal(55, Bytes::from_static(ENGINE), 4, 1000, &scoped).unwrap();

        let Inbound::Reply(ack) = manager.handle_datagram(raw, source()) else {
            panic!("expected an acknowledgement");
        };
        let Message::V3(ack_msg) = Message::decode(ack.clone()).unwrap() else {
            panic!("expected v3");
        };
        assert_eq!(ack_msg.global_data.msg_id, 55);
        assert_eq!(ack_msg.security_level(), SecurityLevel::AuthPriv);
        let params = UsmSecurityParams::decode(ack_msg.security_params.clone(), 0).unwrap();
        assert_eq!(params.engine_boots, 4);
        let response = sender.open(&ack, &ack_msg, &params, source()).unwrap();
        let pdu = response.pdu.as_pdu().unwrap();
        assert_eq!((pdu.pdu_type, pdu.request_id), (PduType::Response, 1234));

        ctx.flush().await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].version, Version::V3);
        assert_eq!(&seen[0].community[..], ENGINE);
    }

    #[tokio::test]
    async fn test_v3_without_profile_dropped() {
        let (reg, ctx, seen) = recorder(&SecuritySettings::new());
        let mut manager = SnmpManager::new();
        manager.register(source().ip(), reg);

        let sender = UsmUser::localize("trapuser", None, None, ENGINE).unwrap();
        let scoped = ScopedPdu::new(Bytes::new(), Bytes::new(), link_down());
        let raw = sender.seal(1, Bytes::from_static(ENGINE), 0, 0, &scoped).unwrap();
        assert!(matches!(manager.handle_datagram(raw, source()), Inbound::Dropped));
        ctx.flush().await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_datagram_dropped_then_next_delivered() {
        let (reg, ctx, seen) = recorder(&SecuritySettings::new());
        let other: SocketAddr = "192.0.2.11:162".parse().unwrap();
        let mut manager = SnmpManager::new();
        manager.register(other.ip(), reg);

        let trap = TrapV1Pdu::new(oid!(1, 3, 6, 1, 4, 1, 9), [192, 0, 2, 10], GenericTrap::ColdStart, 0, 5, vec![]);
        let raw = CommunityMessage::v1("public", trap).encode();
        let truncated = raw.slice(..raw.len() - 7);
        assert!(matches!(manager.handle_datagram(truncated, source()), Inbound::Dropped));
        assert!(matches!(manager.handle_datagram(Bytes::from_static(&[0xff; 3]), source()), Inbound::Dropped));

        let raw = CommunityMessage::v2c("public", link_down()).encode();
        assert!(matches!(manager.handle_datagram(raw, other), Inbound::Delivered));
        ctx.flush().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_responses_only_surface_when_accepted() {
        let response = Pdu::new(PduType::Response, 8, vec![]);
        let raw = CommunityMessage::v2c("public", response).encode();

        let manager = SnmpManager::new();
        assert!(matches!(manager.handle_datagram(raw.clone(), source()), Inbound::Dropped));

        let manager = SnmpManager::new().accept_responses(true);
        let Inbound::Response(received) = manager.handle_datagram(raw, source()) else {
            panic!("expected a response");
        };
        assert_eq!(received.request_id(), Some(8));
    }

    #[tokio::test]
    async fn test_ignore_stops_delivery() {
        let (reg, ctx, seen) = recorder(&SecuritySettings::new());
        let mut manager = SnmpManager::new();
        manager.register(source().ip(), reg);
        assert!(manager.ignore(source().ip()));
        assert!(!manager.ignore(source().ip()));

        let raw = CommunityMessage::v2c("public", link_down()).encode();
        manager.handle_datagram(raw, source());
        ctx.flush().await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_v3_time_starts_near_zero() {
        assert!(SnmpManager::new().v3_time() < 2);
    }
}
