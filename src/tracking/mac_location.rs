use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::MacAddress;
use crate::error::{Error, Result};
use crate::store::{DocumentStore, Repository, keys};

/// Where a device was last seen on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacLocation {
    pub mac_address: MacAddress,
    #[serde(default)]
    pub device_ip: Option<IpAddr>,
    pub switch_ip: IpAddr,
    #[serde(default)]
    pub hostname: Option<String>,
    pub switch_name: String,
    pub interface: String,
}

impl MacLocation {
    pub fn new(
        mac_address: MacAddress,
        switch_ip: IpAddr,
        switch_name: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            mac_address,
            device_ip: None,
            switch_ip,
            hostname: None,
            switch_name: switch_name.into(),
            interface: interface.into(),
        }
    }

    pub fn device_ip(mut self, ip: IpAddr) -> Self {
        self.device_ip = Some(ip);
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn key(&self) -> String {
        keys::mac_location(&self.mac_address)
    }

    pub fn validate(&self) -> Result<()> {
        if self.switch_name.trim().is_empty() {
            return Err(Error::validation("switch_name", "must not be empty"));
        }
        if self.interface.trim().is_empty() {
            return Err(Error::validation("interface", "must not be empty"));
        }
        Ok(())
    }
}

/// Persisted device locations, keyed by MAC.
#[derive(Debug, Clone)]
pub struct MacLocations<S> {
    repo: Repository<S>,
}

impl<S: DocumentStore> MacLocations<S> {
    pub fn new(repo: Repository<S>) -> Self {
        Self { repo }
    }

    /// Validate and store, replacing any previous location.
    pub async fn save(&self, location: &MacLocation) -> Result<()> {
        location.validate()?;
        self.repo.put(&location.key(), location).await?;
        Ok(())
    }

    pub async fn get(&self, mac: &MacAddress) -> Result<Option<MacLocation>> {
        Ok(self
            .repo
            .get(&keys::mac_location(mac))
            .await?
            .map(|doc| doc.value))
    }

    pub async fn remove(&self, mac: &MacAddress) -> Result<bool> {
        self.repo.remove(&keys::mac_location(mac), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Retry;
    use crate::store::MemoryStore;

    fn location() -> MacLocation {
        MacLocation::new(
            "AA:BB:CC:DD:EE:01".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            "sw-floor3",
            "Gi1/0/7",
        )
    }

    #[tokio::test]
    async fn test_rejected_location_is_not_stored() {
        let store = MemoryStore::new();
        let locations = MacLocations::new(Repository::new(store.clone(), Retry::none()));
        let mut bad = location();
        bad.interface = " ".into();
        let err = locations.save(&bad).await.unwrap_err();
        assert!(matches!(*err, Error::Validation { field: "interface", .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_get_remove() {
        let locations = MacLocations::new(Repository::new(MemoryStore::new(), Retry::none()));
        let loc = location().hostname("desk-3-12").device_ip("10.20.0.15".parse().unwrap());
        locations.save(&loc).await.unwrap();
        assert_eq!(loc.key(), "macloc-aa:bb:cc:dd:ee:01");
        assert_eq!(locations.get(&loc.mac_address).await.unwrap(), Some(loc.clone()));
        assert!(locations.remove(&loc.mac_address).await.unwrap());
        assert_eq!(locations.get(&loc.mac_address).await.unwrap(), None);
    }
}
