//! # netloc
//!
//! Switch-port and MAC-location tracking with desk reservations, fed by an
//! async SNMP trap/inform dispatcher.
//!
//! ## Features
//!
//! - Trap and inform reception for SNMPv1, v2c and v3 (USM, AES privacy)
//! - Per-source registrations whose callbacks run on the registrant's own
//!   [`ExecutionContext`]
//! - Outbound polling with request/response matching and timeouts
//! - Switch-port state with time-gated reservations, and at-most-one-owner
//!   device bindings, over any compare-and-swap [`DocumentStore`]
//!
//! ## Receiving traps
//!
//! ```rust,no_run
//! use netloc::{ExecutionContext, SecurityProfile, SecuritySettings, TrapDispatcher};
//! use netloc::v3::{AuthProtocol, PrivProtocol};
//!
//! #[tokio::main]
//! async fn main() -> netloc::Result<()> {
//!     let traps = TrapDispatcher::new();
//!     traps.start().await?;
//!
//!     let settings = SecuritySettings::new().profile_hex(
//!         "80001f8880aabbccdd",
//!         SecurityProfile::new("trapuser")
//!             .auth(AuthProtocol::Sha256, "authpass123")
//!             .privacy(PrivProtocol::Aes128, "privpass123"),
//!     )?;
//!
//!     let context = ExecutionContext::spawn("core-switch");
//!     traps.register(
//!         context,
//!         tracing::info_span!("switch"),
//!         "10.0.0.2".parse().unwrap(),
//!         &settings,
//!         |received| println!("{} from {}", received.pdu.pdu_type(), received.source),
//!     )?;
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     Ok(())
//! }
//! ```

pub mod ber;
pub mod clock;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod retry;
pub mod store;
pub mod tracking;
pub mod v3;
pub mod value;
pub mod varbind;
pub mod version;

pub(crate) mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DispatcherConfig, TrackerConfig};
pub use context::ExecutionContext;
pub use dispatch::{Dispatcher, DispatcherState, SnmpClient, TrapDispatcher};
pub use error::{Error, Result};
pub use manager::{Received, SecurityProfile, SecuritySettings, SnmpManager};
pub use oid::Oid;
pub use pdu::{AnyPdu, Pdu, PduType};
pub use retry::{Backoff, Retry};
pub use store::{DocumentStore, MemoryStore};
pub use tracking::{
    MacAddress, MacLocation, PeopleCount, PortState, SwitchPort, Tracker, UserDeviceBinding,
};
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;
