use std::net::IpAddr;
use std::sync::Arc;

use super::{MacAddress, MacLocation, MacLocations, PeopleCounts, SwitchPort, SwitchPorts, UserDevices};
use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::store::{DocumentStore, Repository};

/// Everything the drivers need from the tracking store, sharing one
/// repository, clock and retry policy.
#[derive(Debug, Clone)]
pub struct Tracker<S> {
    ports: SwitchPorts<S>,
    devices: UserDevices<S>,
    locations: MacLocations<S>,
    counts: PeopleCounts<S>,
}

impl<S: DocumentStore> Tracker<S> {
    pub fn new(store: S, config: TrackerConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let repo = Repository::new(store, config.conflict_retry.clone());
        Self {
            ports: SwitchPorts::new(repo.clone(), clock.clone(), config.default_reservation),
            devices: UserDevices::new(repo.clone(), clock, config.max_devices_per_user),
            locations: MacLocations::new(repo.clone()),
            counts: PeopleCounts::new(repo),
        }
    }

    pub fn ports(&self) -> &SwitchPorts<S> {
        &self.ports
    }

    pub fn devices(&self) -> &UserDevices<S> {
        &self.devices
    }

    pub fn locations(&self) -> &MacLocations<S> {
        &self.locations
    }

    pub fn people_counts(&self) -> &PeopleCounts<S> {
        &self.counts
    }

    /// A switch reported `location.mac_address` on a port: remember where
    /// it is and mark the port connected. Returns whether the device
    /// landed inside a reservation window.
    pub async fn device_seen(&self, location: &MacLocation) -> Result<bool> {
        self.locations.save(location).await?;
        self.ports
            .connected(location.switch_ip, &location.interface, location.mac_address)
            .await
    }

    /// Link down on a port. Returns whether the departing user should be
    /// asked to reserve it.
    pub async fn port_down(&self, switch_ip: IpAddr, interface: &str) -> Result<bool> {
        self.ports.disconnected(switch_ip, interface).await
    }

    pub async fn locate(&self, mac: &MacAddress) -> Result<Option<SwitchPort>> {
        self.ports.locate(mac).await
    }
}
