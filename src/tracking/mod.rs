//! Switch-port occupancy, desk reservations and device ownership.
//!
//! All state lives in a [`DocumentStore`](crate::store::DocumentStore);
//! every read-modify-write runs under the configured conflict retry, so
//! concurrent writers re-read instead of overwriting each other.
//!
//! ```rust
//! use std::time::Duration;
//! use netloc::store::MemoryStore;
//! use netloc::{MacAddress, MacLocation, Tracker, TrackerConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> netloc::Result<()> {
//! let tracker = Tracker::new(MemoryStore::new(), TrackerConfig::default());
//! let mac: MacAddress = "AA:BB:CC:DD:EE:01".parse()?;
//! let switch = "10.0.0.2".parse().unwrap();
//!
//! tracker
//!     .device_seen(&MacLocation::new(mac, switch, "sw-floor3", "Gi1/0/7"))
//!     .await?;
//! let prompt = tracker.port_down(switch, "Gi1/0/7").await?;
//! assert!(prompt);
//!
//! // unplugged, but still holding the desk
//! let port = tracker.locate(&mac).await?.expect("reserved");
//! assert_eq!(port.interface, "Gi1/0/7");
//!
//! tracker
//!     .ports()
//!     .reserve(switch, "Gi1/0/7", Duration::from_secs(3600), Some("alice"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod mac;
mod mac_location;
mod people_count;
mod switch_port;
mod tracker;
mod user_devices;

pub use mac::MacAddress;
pub use mac_location::{MacLocation, MacLocations};
pub use people_count::{PeopleCount, PeopleCounts};
pub use switch_port::{PortState, SwitchPort, SwitchPorts};
pub use tracker::Tracker;
pub use user_devices::{UserDeviceBinding, UserDevices};
