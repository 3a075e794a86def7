//! Versioned document persistence.
//!
//! [`DocumentStore`] is the seam to a networked key-value store with
//! optimistic concurrency: every document carries a [`Cas`] token and a
//! write against a stale token fails with
//! [`Error::Conflict`](crate::Error::Conflict). [`MemoryStore`] is the
//! in-process implementation; [`Repository`] adds typed JSON documents and
//! the conflict-retry policy on top of any store.

mod memory;
mod repository;

use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use repository::{Repository, Versioned};

use crate::error::Result;

/// Version token of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cas(pub u64);

/// A stored value and its current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub value: Bytes,
    pub cas: Cas,
}

/// Key-value store with compare-and-swap writes.
///
/// Implementations are cheap to clone handles onto shared state.
pub trait DocumentStore: Send + Sync + Clone {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Create `key`. Fails with `Conflict` if it already exists.
    fn insert(&self, key: &str, value: Bytes) -> impl Future<Output = Result<Cas>> + Send;

    /// Overwrite `key` if its version is still `cas`. Fails with `Conflict`
    /// if the version moved on or the document is gone.
    fn replace(&self, key: &str, value: Bytes, cas: Cas) -> impl Future<Output = Result<Cas>> + Send;

    /// Unconditional write.
    fn upsert(&self, key: &str, value: Bytes) -> impl Future<Output = Result<Cas>> + Send;

    /// Delete `key`, checking `cas` when given. Returns whether it existed.
    fn remove(&self, key: &str, cas: Option<Cas>) -> impl Future<Output = Result<bool>> + Send;

    /// Every document whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> impl Future<Output = Result<Vec<(String, Document)>>> + Send;
}

/// Document key layout.
pub mod keys {
    use std::net::IpAddr;

    use crate::tracking::MacAddress;

    pub const MAC_LOCATION: &str = "macloc-";
    pub const SWITCH_PORT: &str = "swport-";
    pub const USER_DEVICES: &str = "userdevices-";
    pub const MAC_USER: &str = "macuser-";
    pub const PEOPLE_COUNT: &str = "count-";

    /// `macloc-aa:bb:cc:dd:ee:ff`
    pub fn mac_location(mac: &MacAddress) -> String {
        format!("{MAC_LOCATION}{mac}")
    }

    /// `swport-10.0.0.2-Gi1/0/7`
    pub fn switch_port(switch_ip: IpAddr, interface: &str) -> String {
        format!("{SWITCH_PORT}{switch_ip}-{interface}")
    }

    /// `userdevices-alice`; user names are case-insensitive.
    pub fn user_devices(username: &str) -> String {
        format!("{USER_DEVICES}{}", username.to_lowercase())
    }

    /// `macuser-aabbccddeeff`
    pub fn mac_user(mac: &MacAddress) -> String {
        format!("{MAC_USER}{}", mac.compact())
    }

    pub fn people_count(booking_id: &str) -> String {
        format!("{PEOPLE_COUNT}{booking_id}")
    }
}
