//! Outbound polling on UDP 161.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::Span;

use super::{Dispatcher, DispatcherState};
use crate::config::DispatcherConfig;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::manager::{Received, SecuritySettings};
use crate::message::CommunityMessage;
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::version::Version;

/// Sends requests from one shared socket and matches responses by source
/// IP and request id. Responses matching no outstanding request go to the
/// source's registrant, like traps do.
#[derive(Debug, Clone)]
pub struct SnmpClient {
    inner: Dispatcher,
    next_request_id: Arc<AtomicI32>,
}

impl SnmpClient {
    /// Client for `0.0.0.0:161`.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::client())
    }

    /// Responses are always accepted, whatever `config` says.
    pub fn with_config(config: DispatcherConfig) -> Self {
        let mut seed = [0u8; 4];
        let seed = match getrandom::fill(&mut seed) {
            Ok(()) => i32::from_ne_bytes(seed) & 0x3fff_ffff,
            Err(_) => 1,
        };
        Self {
            inner: Dispatcher::new(config.accept_responses(true)),
            next_request_id: Arc::new(AtomicI32::new(seed.max(1))),
        }
    }

    pub async fn start(&self) -> Result<SocketAddr> {
        self.inner.start().await
    }

    pub fn state(&self) -> DispatcherState {
        self.inner.state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn register(
        &self,
        context: ExecutionContext,
        span: Span,
        ip: IpAddr,
        settings: &SecuritySettings,
        callback: impl Fn(Received) + Send + Sync + 'static,
    ) -> Result<()> {
        self.inner.register(context, span, ip, settings, callback)
    }

    pub fn ignore(&self, ip: IpAddr) -> Result<()> {
        self.inner.ignore(ip)
    }

    /// Fire-and-forget datagram to `ip:port`.
    pub fn send(&self, ip: IpAddr, port: u16, data: Bytes) -> Result<()> {
        self.inner.send(SocketAddr::new(ip, port), data)
    }

    pub async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    /// Positive, wrapping request ids.
    pub fn next_request_id(&self) -> i32 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id > 0 {
                return id;
            }
            // wrapped: restart at 1
            let _ = self
                .next_request_id
                .compare_exchange(id.wrapping_add(1), 1, Ordering::Relaxed, Ordering::Relaxed);
        }
    }

    /// Send `pdu` to `target` in a community message and wait up to
    /// `timeout` for the matching Response. On timeout the pending slot is
    /// closed before the error is returned, so a late datagram is routed
    /// like an unsolicited one.
    pub async fn request(
        &self,
        target: SocketAddr,
        version: Version,
        community: impl Into<Bytes>,
        pdu: Pdu,
        timeout: Duration,
    ) -> Result<Received> {
        if version == Version::V3 {
            return Err(Error::validation("version", "v3 requests are not supported"));
        }
        let request_id = pdu.request_id;
        let data = CommunityMessage::new(version, community, pdu).encode();
        let started = Instant::now();
        let slot = self.inner.request(target, request_id, data).await?;
        tracing::debug!(target: "netloc::dispatch", { snmp.target = %target, snmp.request_id = request_id }, "request sent");

        match tokio::time::timeout(timeout, slot).await {
            Ok(Ok(received)) => Ok(received),
            Ok(Err(_)) => Err(Error::Closed.boxed()),
            Err(_) => {
                self.inner.cancel(target.ip(), request_id).await?;
                let elapsed = started.elapsed();
                tracing::debug!(target: "netloc::dispatch", { snmp.target = %target, snmp.request_id = request_id, ?elapsed }, "request timed out");
                Err(Error::Timeout {
                    target,
                    elapsed,
                    request_id,
                }
                .boxed())
            }
        }
    }

    /// GET `oids` from `target` over v2c.
    pub async fn get(
        &self,
        target: SocketAddr,
        community: impl Into<Bytes>,
        oids: &[Oid],
        timeout: Duration,
    ) -> Result<Received> {
        let pdu = Pdu::get_request(self.next_request_id(), oids);
        self.request(target, Version::V2c, community, pdu, timeout).await
    }
}

impl Default for SnmpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_ids_positive_and_wrap() {
        let client = SnmpClient::new();
        client.next_request_id.store(i32::MAX, Ordering::Relaxed);
        assert_eq!(client.next_request_id(), i32::MAX);
        assert_eq!(client.next_request_id(), 1);
        assert_eq!(client.next_request_id(), 2);
    }

    #[tokio::test]
    async fn test_request_before_start_fails() {
        let client = SnmpClient::new();
        let err = client
            .get("127.0.0.1:161".parse().unwrap(), "public", &[], Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(*err, Error::NotBound { port: 161 }));
    }
}
