//! Property-based tests for netloc.
//!
//! Ownership tests drive the device registry through a shared runtime and
//! a fresh in-memory store per case. Decoder tests feed arbitrary and
//! damaged datagrams through the manager.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use netloc::message::{CommunityMessage, Message};
use netloc::store::{DocumentStore, keys};
use netloc::{
    ExecutionContext, MacAddress, ManualClock, MemoryStore, Pdu, PduType, Retry, SecuritySettings,
    SnmpManager, Tracker, TrackerConfig, oid,
};
use netloc::manager::{Inbound, Registration};
use proptest::prelude::*;
use tokio::runtime::Runtime;

// =============================================================================
// Shared Test Environment
// =============================================================================

fn runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| Runtime::new().expect("failed to create runtime"))
}

fn tracker(store: &MemoryStore) -> Tracker<MemoryStore> {
    let clock = ManualClock::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
    let config = TrackerConfig::default().conflict_retry(Retry::fixed(5, Duration::ZERO));
    Tracker::with_clock(store.clone(), config, Arc::new(clock))
}

// =============================================================================
// Strategies
// =============================================================================

const USERS: &[&str] = &["alice", "Bob", "carol", "DAVE"];

/// Small MAC space so that users keep stealing each other's devices.
fn arb_mac() -> impl Strategy<Value = MacAddress> {
    (0u8..8).prop_map(|last| MacAddress::new([0x02, 0, 0, 0, 0, last]))
}

fn arb_add() -> impl Strategy<Value = (usize, MacAddress)> {
    (0..USERS.len(), arb_mac())
}

// =============================================================================
// Device ownership
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn each_mac_has_at_most_one_owner(adds in prop::collection::vec(arb_add(), 1..40)) {
        let store = MemoryStore::new();
        let devices = tracker(&store).devices().clone();
        let mut last_owner: HashMap<MacAddress, String> = HashMap::new();

        runtime().block_on(async {
            for (user, mac) in &adds {
                devices.add(USERS[*user], "corp", *mac).await.unwrap();
                last_owner.insert(*mac, USERS[*user].to_lowercase());
            }
        });

        for (mac, expected) in &last_owner {
            let (holders, index) = runtime().block_on(async {
                let mut holders = Vec::new();
                for user in USERS {
                    if devices.for_user(user, "corp").await.unwrap().contains(mac) {
                        holders.push(user.to_lowercase());
                    }
                }
                let index = store.get(&keys::mac_user(mac)).await.unwrap();
                (holders, index)
            });
            // the list may have aged the MAC out; the index never loses it
            prop_assert!(holders.len() <= 1, "{mac} listed by {holders:?}");
            if let Some(holder) = holders.first() {
                prop_assert_eq!(holder, expected);
            }
            let index = index.expect("reverse index entry");
            let owner: String = serde_json::from_slice(&index.value).unwrap();
            prop_assert_eq!(&owner, expected);
        }
    }

    #[test]
    fn history_is_bounded_and_most_recent_first(macs in prop::collection::vec(arb_mac(), 1..30)) {
        let store = MemoryStore::new();
        let devices = tracker(&store).devices().clone();

        let binding = runtime().block_on(async {
            for mac in &macs {
                devices.add("alice", "corp", *mac).await.unwrap();
            }
            devices.for_user("alice", "corp").await.unwrap()
        });

        let mut expected: Vec<MacAddress> = Vec::new();
        for mac in macs.iter().rev() {
            if !expected.contains(mac) {
                expected.push(*mac);
            }
        }
        expected.truncate(5);
        prop_assert_eq!(binding.macs, expected);
    }
}

// =============================================================================
// Decoder robustness
// =============================================================================

fn source() -> SocketAddr {
    "192.0.2.10:162".parse().unwrap()
}

fn manager() -> SnmpManager {
    let _guard = runtime().enter();
    let registration = Registration::new(
        ExecutionContext::spawn("prop"),
        tracing::Span::none(),
        &SecuritySettings::new(),
        |_| {},
    )
    .unwrap();
    let mut manager = SnmpManager::new().accept_responses(true);
    manager.register(source().ip(), registration);
    manager
}

fn valid_trap() -> Bytes {
    let pdu = Pdu::notification(PduType::TrapV2, 1, 0, oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3), vec![]);
    CommunityMessage::v2c("public", pdu).encode()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Message::decode(Bytes::from(data.clone()));
        let _guard = runtime().enter();
        let _ = manager().handle_datagram(Bytes::from(data), source());
    }

    #[test]
    fn truncated_trap_is_dropped(cut in 0usize..40) {
        let raw = valid_trap();
        let cut = cut.min(raw.len() - 1);
        let _guard = runtime().enter();
        let manager = manager();
        prop_assert!(matches!(manager.handle_datagram(raw.slice(..cut), source()), Inbound::Dropped));
        prop_assert!(matches!(manager.handle_datagram(raw, source()), Inbound::Delivered));
    }

    #[test]
    fn flipped_byte_never_panics(index in 0usize..64, mask in 1u8..=255) {
        let mut raw = valid_trap().to_vec();
        let index = index % raw.len();
        raw[index] ^= mask;
        let _guard = runtime().enter();
        let _ = manager().handle_datagram(Bytes::from(raw), source());
    }
}
