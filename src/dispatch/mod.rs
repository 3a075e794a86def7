//! UDP dispatchers.
//!
//! A [`Dispatcher`] owns one UDP socket and one [`SnmpManager`]. Every
//! operation (register, ignore, send, inbound datagram) is a command to a
//! single actor task, so the registration table is never read while half
//! written. Callbacks are posted to each registrant's
//! [`ExecutionContext`], never run on the actor.
//!
//! - [`TrapDispatcher`] - port 162, traps and informs
//! - [`SnmpClient`] - port 161, outbound polling with response matching
//!
//! Lifecycle: `Unbound -> Binding -> Bound`. [`Dispatcher::start`] binds
//! once; later calls return the bound address. Registrations made before
//! `start` are applied in order.

mod client;
mod pending;
mod trap;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Span;

pub use client::SnmpClient;
pub use trap::TrapDispatcher;

use self::pending::PendingResponses;
use crate::config::DispatcherConfig;
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::manager::{Inbound, Received, Registration, SecuritySettings, SnmpManager};
use crate::util::bind_udp_socket;

/// Socket lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Unbound,
    Binding,
    Bound { local_addr: SocketAddr },
}

enum Command {
    Start {
        reply: oneshot::Sender<Result<SocketAddr>>,
    },
    Register {
        ip: IpAddr,
        registration: Registration,
    },
    Ignore {
        ip: IpAddr,
    },
    Send {
        target: SocketAddr,
        data: Bytes,
    },
    Request {
        target: SocketAddr,
        request_id: i32,
        data: Bytes,
        reply: oneshot::Sender<Result<oneshot::Receiver<Received>>>,
    },
    Cancel {
        target: IpAddr,
        request_id: i32,
        done: oneshot::Sender<bool>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
    Datagram {
        data: Bytes,
        source: SocketAddr,
    },
}

/// Handle to a dispatcher actor. Cheap to clone; the actor stops when the
/// last handle is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<DispatcherState>,
    config: Arc<DispatcherConfig>,
}

impl Dispatcher {
    /// Spawn the actor. The socket is not bound until [`start`](Self::start).
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: DispatcherConfig) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(DispatcherState::Unbound);
        let manager = SnmpManager::new().accept_responses(config.accept_responses);
        let actor = Actor {
            config: config.clone(),
            manager,
            pending: PendingResponses::new(),
            socket: None,
            state: state_tx,
            commands: commands.downgrade(),
            shutdown: None,
        };
        tokio::spawn(actor.run(rx));
        Self {
            commands,
            state,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.state() {
            DispatcherState::Bound { local_addr } => Some(local_addr),
            _ => None,
        }
    }

    /// Bind the socket and start reading. Idempotent.
    pub async fn start(&self) -> Result<SocketAddr> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Start { reply })?;
        rx.await.map_err(|_| Error::Closed.boxed())?
    }

    /// Install or replace the registration for `ip`. `settings` is
    /// validated here; a rejected profile leaves any previous registration
    /// in place.
    pub fn register(
        &self,
        context: ExecutionContext,
        span: Span,
        ip: IpAddr,
        settings: &SecuritySettings,
        callback: impl Fn(Received) + Send + Sync + 'static,
    ) -> Result<()> {
        let registration = Registration::new(context, span, settings, callback)?;
        self.command(Command::Register { ip, registration })
    }

    pub fn ignore(&self, ip: IpAddr) -> Result<()> {
        self.command(Command::Ignore { ip })
    }

    /// Fire-and-forget send. Only valid once bound; send failures are logged.
    pub fn send(&self, target: SocketAddr, data: Bytes) -> Result<()> {
        self.ensure_bound()?;
        self.command(Command::Send { target, data })
    }

    /// Wait until every command issued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.command(Command::Flush { done })?;
        rx.await.map_err(|_| Error::Closed.boxed())
    }

    /// Open a pending-response slot and send `data`.
    pub(crate) async fn request(
        &self,
        target: SocketAddr,
        request_id: i32,
        data: Bytes,
    ) -> Result<oneshot::Receiver<Received>> {
        self.ensure_bound()?;
        let (reply, rx) = oneshot::channel();
        self.command(Command::Request {
            target,
            request_id,
            data,
            reply,
        })?;
        rx.await.map_err(|_| Error::Closed.boxed())?
    }

    /// Close a pending-response slot. Returns once the slot is gone.
    pub(crate) async fn cancel(&self, target: IpAddr, request_id: i32) -> Result<bool> {
        let (done, rx) = oneshot::channel();
        self.command(Command::Cancel {
            target,
            request_id,
            done,
        })?;
        rx.await.map_err(|_| Error::Closed.boxed())
    }

    fn ensure_bound(&self) -> Result<()> {
        match self.state() {
            DispatcherState::Bound { .. } => Ok(()),
            _ => Err(Error::NotBound {
                port: self.config.bind_addr.port(),
            }
            .boxed()),
        }
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Closed.boxed())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bind_addr", &self.config.bind_addr)
            .field("state", &self.state())
            .finish()
    }
}

struct Actor {
    config: DispatcherConfig,
    manager: SnmpManager,
    pending: PendingResponses,
    socket: Option<Arc<UdpSocket>>,
    state: watch::Sender<DispatcherState>,
    commands: mpsc::WeakUnboundedSender<Command>,
    /// Dropping this stops the receive loop.
    shutdown: Option<oneshot::Sender<()>>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        tracing::debug!(target: "netloc::dispatch", { bind_addr = %self.config.bind_addr }, "dispatcher stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start { reply } => {
                let _ = reply.send(self.start());
            }
            Command::Register { ip, registration } => self.manager.register(ip, registration),
            Command::Ignore { ip } => {
                self.manager.ignore(ip);
            }
            Command::Send { target, data } => {
                if let Err(err) = self.send_to(&data, target).await {
                    tracing::warn!(target: "netloc::dispatch", { snmp.target = %target, error = %err }, "send failed");
                }
            }
            Command::Request {
                target,
                request_id,
                data,
                reply,
            } => {
                let slot = self.pending.insert(target.ip(), request_id);
                let result = match self.send_to(&data, target).await {
                    Ok(()) => Ok(slot),
                    Err(err) => {
                        self.pending.remove(target.ip(), request_id);
                        Err(err)
                    }
                };
                let _ = reply.send(result);
            }
            Command::Cancel {
                target,
                request_id,
                done,
            } => {
                let _ = done.send(self.pending.remove(target, request_id));
            }
            Command::Flush { done } => {
                let _ = done.send(());
            }
            Command::Datagram { data, source } => self.datagram(data, source).await,
        }
    }

    fn start(&mut self) -> Result<SocketAddr> {
        if let DispatcherState::Bound { local_addr } = *self.state.borrow() {
            return Ok(local_addr);
        }
        self.state.send_replace(DispatcherState::Binding);

        let bind_addr = self.config.bind_addr;
        let bound = bind_udp_socket(bind_addr).and_then(|socket| Ok((socket.local_addr()?, socket)));
        let (local_addr, socket) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                self.state.send_replace(DispatcherState::Unbound);
                tracing::warn!(target: "netloc::dispatch", { %bind_addr, error = %source }, "bind failed");
                return Err(Error::Io {
                    target: Some(bind_addr),
                    source,
                }
                .boxed());
            }
        };

        let socket = Arc::new(socket);
        let (shutdown, stop) = oneshot::channel();
        tokio::spawn(recv_loop(
            Arc::clone(&socket),
            self.commands.clone(),
            self.config.max_message_size,
            stop,
        ));
        self.socket = Some(socket);
        self.shutdown = Some(shutdown);
        self.state.send_replace(DispatcherState::Bound { local_addr });
        tracing::info!(target: "netloc::dispatch", { %local_addr }, "dispatcher bound");
        Ok(local_addr)
    }

    async fn datagram(&mut self, data: Bytes, source: SocketAddr) {
        match self.manager.handle_datagram(data, source) {
            Inbound::Reply(ack) => {
                if let Err(err) = self.send_to(&ack, source).await {
                    tracing::warn!(target: "netloc::dispatch", { snmp.target = %source, error = %err }, "acknowledgement not sent");
                }
            }
            Inbound::Response(received) => {
                if let Some(unmatched) = self.pending.resolve(received) {
                    self.manager.deliver(unmatched);
                }
            }
            Inbound::Delivered | Inbound::Dropped => {}
        }
    }

    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        let socket = self.socket.as_ref().ok_or_else(|| {
            Error::NotBound {
                port: self.config.bind_addr.port(),
            }
            .boxed()
        })?;
        socket
            .send_to(data, target)
            .await
            .map(drop)
            .map_err(|source| Error::Network { target, source }.boxed())
    }
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    commands: mpsc::WeakUnboundedSender<Command>,
    max_message_size: usize,
    mut stop: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; max_message_size];
    loop {
        tokio::select! {
            _ = &mut stop => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, source)) => {
                    let data = Bytes::copy_from_slice(&buf[..len]);
                    let Some(commands) = commands.upgrade() else { break };
                    if commands.send(Command::Datagram { data, source }).is_err() {
                        break;
                    }
                }
                Err(source) => {
                    tracing::warn!(target: "netloc::dispatch", error = %Error::Io { target: None, source }, "receive failed");
                }
            },
        }
    }
    tracing::trace!(target: "netloc::dispatch", "receive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn loopback() -> DispatcherConfig {
        DispatcherConfig::traps().bind_addr(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let dispatcher = Dispatcher::new(loopback());
        assert_eq!(dispatcher.state(), DispatcherState::Unbound);
        let first = dispatcher.start().await.unwrap();
        assert_eq!(dispatcher.start().await.unwrap(), first);
        assert_eq!(dispatcher.state(), DispatcherState::Bound { local_addr: first });
        assert_eq!(dispatcher.local_addr(), Some(first));
    }

    #[tokio::test]
    async fn test_send_requires_bound_socket() {
        let dispatcher = Dispatcher::new(loopback());
        let err = dispatcher
            .send("127.0.0.1:9".parse().unwrap(), Bytes::from_static(b"x"))
            .unwrap_err();
        assert!(matches!(*err, Error::NotBound { port: 0 }));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_profile_synchronously() {
        let dispatcher = Dispatcher::new(loopback());
        let settings = SecuritySettings::new().profile(
            Bytes::from_static(b"\x80\x00\x00\x00\x01"),
            crate::manager::SecurityProfile::new(""),
        );
        let err = dispatcher
            .register(ExecutionContext::spawn("t"), Span::none(), Ipv4Addr::LOCALHOST.into(), &settings, |_| {})
            .unwrap_err();
        assert!(matches!(*err, Error::InvalidSecurityProfile { .. }));
    }
}
