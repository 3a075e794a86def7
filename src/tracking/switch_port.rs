use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::MacAddress;
use crate::clock::Clock;
use crate::error::Result;
use crate::store::{DocumentStore, Repository, keys};

/// Lifecycle state of a switch port at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortState {
    /// Nothing connected and no reservation was ever opened.
    Idle,
    Occupied,
    /// Unplugged, still inside the reservation window.
    Reserved,
    /// Unplugged and the window has lapsed.
    Expired,
}

/// One interface on one switch.
///
/// A reservation window is `[unplug_time, unplug_time + reserve_time]`; the
/// methods here are the pure state transitions, [`SwitchPorts`] persists
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchPort {
    pub switch_ip: IpAddr,
    pub interface: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub mac_address: Option<MacAddress>,
    #[serde(default)]
    pub unplug_time: Option<SystemTime>,
    #[serde(default)]
    pub reserve_time: Option<Duration>,
    #[serde(default)]
    pub reserved_mac: Option<MacAddress>,
    #[serde(default)]
    pub reserved_by: Option<String>,
}

impl SwitchPort {
    pub fn new(switch_ip: IpAddr, interface: impl Into<String>) -> Self {
        Self {
            switch_ip,
            interface: interface.into(),
            connected: false,
            mac_address: None,
            unplug_time: None,
            reserve_time: None,
            reserved_mac: None,
            reserved_by: None,
        }
    }

    pub fn key(&self) -> String {
        keys::switch_port(self.switch_ip, &self.interface)
    }

    /// End of the current reservation window, if one was ever opened.
    pub fn reservation_end(&self) -> Option<SystemTime> {
        let unplug = self.unplug_time?;
        unplug.checked_add(self.reserve_time.unwrap_or_default())
    }

    fn window_open(&self, now: SystemTime) -> bool {
        self.reservation_end().is_some_and(|end| end >= now)
    }

    /// A reserved device exists and its window has not ended.
    pub fn reservation_active(&self, now: SystemTime) -> bool {
        self.reserved_mac.is_some() && self.window_open(now)
    }

    /// Mark `mac` as plugged in. Returns whether the port was inside a
    /// reservation window at that moment.
    pub fn connect(&mut self, mac: MacAddress, now: SystemTime) -> bool {
        let claimed = self.window_open(now);
        self.connected = true;
        self.mac_address = Some(mac);
        claimed
    }

    /// Mark the port unplugged.
    ///
    /// No-op returning `false` when nothing is connected. Opens a new window
    /// of `default_reservation` for the departing device unless one is still
    /// open. Returns `true` only when a new, non-empty window was opened.
    pub fn disconnect(&mut self, default_reservation: Duration, now: SystemTime) -> bool {
        if !self.connected {
            return false;
        }
        if !self.window_open(now) {
            self.unplug_time = Some(now);
            self.reserve_time = Some(default_reservation);
            self.reserved_mac = self.mac_address;
            self.reserved_by = None;
        }
        self.connected = false;
        self.mac_address = None;
        !self.reserve_time.unwrap_or_default().is_zero() && self.unplug_time == Some(now)
    }

    /// Extend the window to `requested` past the unplug time.
    ///
    /// `None` when there is no reserved device. Otherwise whether the
    /// reservation is active; only an active one is extended.
    pub fn reserve(&mut self, requested: Duration, by: Option<&str>, now: SystemTime) -> Option<bool> {
        self.reserved_mac?;
        let active = self.reservation_active(now);
        if active {
            self.reserve_time = Some(requested);
            if let Some(by) = by {
                self.reserved_by = Some(by.to_lowercase());
            }
        }
        Some(active)
    }

    pub fn state(&self, now: SystemTime) -> PortState {
        if self.connected {
            PortState::Occupied
        } else if self.unplug_time.is_none() {
            PortState::Idle
        } else if self.window_open(now) {
            PortState::Reserved
        } else {
            PortState::Expired
        }
    }

    /// Whether `mac` still holds this port by reservation, even while some
    /// other device is plugged in. The window is half-open here: at
    /// `unplug_time + reserve_time` the claim is gone.
    pub fn held_for(&self, mac: &MacAddress, now: SystemTime) -> bool {
        self.reserved_mac.as_ref() == Some(mac)
            && self.reservation_end().is_some_and(|end| now < end)
    }
}

/// Persisted switch ports.
#[derive(Debug, Clone)]
pub struct SwitchPorts<S> {
    repo: Repository<S>,
    clock: Arc<dyn Clock>,
    default_reservation: Duration,
}

impl<S: DocumentStore> SwitchPorts<S> {
    pub fn new(repo: Repository<S>, clock: Arc<dyn Clock>, default_reservation: Duration) -> Self {
        Self {
            repo,
            clock,
            default_reservation,
        }
    }

    pub async fn get(&self, switch_ip: IpAddr, interface: &str) -> Result<Option<SwitchPort>> {
        let key = keys::switch_port(switch_ip, interface);
        Ok(self.repo.get(&key).await?.map(|doc| doc.value))
    }

    /// Record `mac` plugged into the port, creating the port on first
    /// sighting. Returns whether it landed inside a reservation window.
    pub async fn connected(&self, switch_ip: IpAddr, interface: &str, mac: MacAddress) -> Result<bool> {
        let key = keys::switch_port(switch_ip, interface);
        let claimed = self
            .repo
            .with_conflict_retry(&key, || async {
                let mut doc = self
                    .repo
                    .get_or_else(&key, || SwitchPort::new(switch_ip, interface))
                    .await?;
                let claimed = doc.value.connect(mac, self.clock.now());
                self.repo.save(&key, &doc).await?;
                Ok(claimed)
            })
            .await?;
        tracing::debug!(target: "netloc::tracking", { store.key = %key, %mac, claimed }, "port connected");
        Ok(claimed)
    }

    /// [`disconnected_for`](Self::disconnected_for) with the configured
    /// default window.
    pub async fn disconnected(&self, switch_ip: IpAddr, interface: &str) -> Result<bool> {
        self.disconnected_for(switch_ip, interface, self.default_reservation)
            .await
    }

    /// Record the port unplugged. Returns whether a new reservation window
    /// was opened, i.e. whether the departing user should be asked to
    /// reserve.
    pub async fn disconnected_for(&self, switch_ip: IpAddr, interface: &str, window: Duration) -> Result<bool> {
        let key = keys::switch_port(switch_ip, interface);
        let opened = self
            .repo
            .with_conflict_retry(&key, || async {
                let Some(mut doc) = self.repo.get::<SwitchPort>(&key).await? else {
                    return Ok(false);
                };
                if !doc.value.connected {
                    return Ok(false);
                }
                let opened = doc.value.disconnect(window, self.clock.now());
                self.repo.save(&key, &doc).await?;
                Ok(opened)
            })
            .await?;
        tracing::debug!(target: "netloc::tracking", { store.key = %key, opened }, "port disconnected");
        Ok(opened)
    }

    /// Extend an active reservation. `None` when the port is unknown or has
    /// no reserved device.
    pub async fn reserve(
        &self,
        switch_ip: IpAddr,
        interface: &str,
        requested: Duration,
        by: Option<&str>,
    ) -> Result<Option<bool>> {
        let key = keys::switch_port(switch_ip, interface);
        let outcome = self
            .repo
            .with_conflict_retry(&key, || async {
                let Some(mut doc) = self.repo.get::<SwitchPort>(&key).await? else {
                    return Ok(None);
                };
                let outcome = doc.value.reserve(requested, by, self.clock.now());
                if outcome == Some(true) {
                    self.repo.save(&key, &doc).await?;
                }
                Ok(outcome)
            })
            .await?;
        tracing::debug!(target: "netloc::tracking", { store.key = %key, ?requested, ?outcome }, "reserve");
        Ok(outcome)
    }

    /// The port `mac` is plugged into, or else the port it still holds by
    /// reservation.
    pub async fn locate(&self, mac: &MacAddress) -> Result<Option<SwitchPort>> {
        let now = self.clock.now();
        let ports: Vec<SwitchPort> = self
            .repo
            .scan::<SwitchPort>(keys::SWITCH_PORT)
            .await?
            .into_iter()
            .map(|doc| doc.value)
            .collect();

        if let Some(port) = ports
            .iter()
            .find(|p| p.connected && p.mac_address.as_ref() == Some(mac))
        {
            return Ok(Some(port.clone()));
        }
        // Several stale claims: the most recent unplug wins.
        Ok(ports
            .into_iter()
            .filter(|p| p.held_for(mac, now))
            .max_by_key(|p| p.unplug_time))
    }
}
