//! Outstanding requests awaiting a Response.
//!
//! Owned by the dispatcher actor, so no locking. A slot is keyed by the
//! target's IP and the request id: a Response resolves a slot only if it
//! comes from the address the request went to.

use std::collections::HashMap;
use std::net::IpAddr;

use tokio::sync::oneshot;

use crate::manager::Received;

#[derive(Debug, Default)]
pub(crate) struct PendingResponses {
    slots: HashMap<(IpAddr, i32), oneshot::Sender<Received>>,
}

impl PendingResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot. A slot already open under the same key is replaced, and
    /// its waiter sees the sender dropped.
    pub fn insert(&mut self, target: IpAddr, request_id: i32) -> oneshot::Receiver<Received> {
        self.purge_abandoned();
        let (tx, rx) = oneshot::channel();
        self.slots.insert((target, request_id), tx);
        rx
    }

    /// Complete the matching slot, or hand `received` back if none matches
    /// or its waiter has gone.
    pub fn resolve(&mut self, received: Received) -> Option<Received> {
        let Some(request_id) = received.request_id() else {
            return Some(received);
        };
        match self.slots.remove(&(received.source_ip(), request_id)) {
            Some(slot) => slot.send(received).err(),
            None => Some(received),
        }
    }

    /// Close a slot. Returns whether it was still open.
    pub fn remove(&mut self, target: IpAddr, request_id: i32) -> bool {
        self.slots.remove(&(target, request_id)).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Drop slots whose waiter was cancelled without cleaning up.
    fn purge_abandoned(&mut self) {
        self.slots.retain(|_, slot| !slot.is_closed());
    }
}
