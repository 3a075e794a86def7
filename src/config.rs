//! Configuration for the tracker and the dispatchers.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::Retry;

/// Default reservation window opened when a device unplugs.
pub const DEFAULT_RESERVATION: Duration = Duration::from_secs(300);

/// Devices remembered per user.
pub const DEFAULT_MAX_DEVICES: usize = 5;

/// Largest UDP payload the dispatchers read.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 65535;

/// Switch-port and device-ownership tracking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub default_reservation: Duration,
    pub max_devices_per_user: usize,
    pub conflict_retry: Retry,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_reservation: DEFAULT_RESERVATION,
            max_devices_per_user: DEFAULT_MAX_DEVICES,
            conflict_retry: Retry::default(),
        }
    }
}

impl TrackerConfig {
    pub fn default_reservation(mut self, window: Duration) -> Self {
        self.default_reservation = window;
        self
    }

    pub fn max_devices_per_user(mut self, max: usize) -> Self {
        self.max_devices_per_user = max.max(1);
        self
    }

    pub fn conflict_retry(mut self, retry: impl Into<Retry>) -> Self {
        self.conflict_retry = retry.into();
        self
    }
}

/// Socket settings for one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub bind_addr: SocketAddr,
    pub max_message_size: usize,
    /// Hand Response PDUs to request matching and registrants.
    pub accept_responses: bool,
}

impl DispatcherConfig {
    /// Inbound traps and informs on `0.0.0.0:162`.
    pub fn traps() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 162)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            accept_responses: false,
        }
    }

    /// Outbound polling on `0.0.0.0:161`.
    pub fn client() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 161)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            accept_responses: true,
        }
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Clamped to at least 484, the smallest size SNMP engines must accept.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size.max(484);
        self
    }

    pub fn accept_responses(mut self, accept: bool) -> Self {
        self.accept_responses = accept;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_presets() {
        let traps = DispatcherConfig::traps();
        assert_eq!(traps.bind_addr.port(), 162);
        assert!(!traps.accept_responses);
        let client = DispatcherConfig::client().max_message_size(10);
        assert_eq!(client.bind_addr.port(), 161);
        assert!(client.accept_responses);
        assert_eq!(client.max_message_size, 484);
    }

    #[test]
    fn test_tracker_config_from_partial_json() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"default_reservation":{"secs":600,"nanos":0}}"#).unwrap();
        assert_eq!(config.default_reservation, Duration::from_secs(600));
        assert_eq!(config.max_devices_per_user, 5);
        assert_eq!(config.conflict_retry, Retry::default());
    }
}
