//! Trap/inform receiver on UDP 162.

use std::net::{IpAddr, SocketAddr};

use tracing::Span;

use super::{Dispatcher, DispatcherState};
use crate::config::DispatcherConfig;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::manager::{Received, SecuritySettings};

/// Receives traps and informs for registered source IPs. Informs are
/// acknowledged before the callback is posted.
///
/// ```rust,no_run
/// use netloc::{ExecutionContext, SecuritySettings, TrapDispatcher};
///
/// # async fn example() -> netloc::Result<()> {
/// let traps = TrapDispatcher::new();
/// traps.start().await?;
///
/// let context = ExecutionContext::spawn("core-switch");
/// traps.register(
///     context,
///     tracing::info_span!("switch", ip = "10.0.0.2"),
///     "10.0.0.2".parse().unwrap(),
///     &SecuritySettings::new(),
///     |received| tracing::info!(pdu = ?received.pdu.pdu_type(), "trap"),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TrapDispatcher {
    inner: Dispatcher,
}

impl TrapDispatcher {
    /// Dispatcher for `0.0.0.0:162`.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::traps())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            inner: Dispatcher::new(config),
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

    pub async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

impl Default for TrapDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
