//! End-to-end runs of the cooperative runtime against the simulated radio
//! and WiFi stacks.
//!
//! The runtime pumps the global callback queues, so these tests hold a
//! lock to keep them from running concurrently.

use core::cell::RefCell;
use core::time::Duration;
use std::rc::Rc;
use std::sync::Mutex;

use crate::mock_ports::{MockPin, PIANO, RecordingSink, StubTransport, site_config};

use sensornode::adapters::ble_central::{BleCentral, SimPeripheral};
use sensornode::adapters::time::SystemClock;
use sensornode::adapters::wifi::WifiLink;
use sensornode::app::service::{NodePorts, NodeService};
use sensornode::drivers::watchdog::Watchdog;
use sensornode::events::{NET_EVENTS, RADIO_EVENTS};
use sensornode::network::NetworkState;
use sensornode::pairing::ConnectionState;
use sensornode::runtime::{self, SharedNode};

static RUNTIME_LOCK: Mutex<()> = Mutex::new(());

type SimNode = SharedNode<BleCentral, WifiLink, StubTransport, MockPin, SystemClock, RecordingSink>;

fn sim_node(wifi_failures: u32) -> SimNode {
    RADIO_EVENTS.drain(|_| {});
    NET_EVENTS.drain(|_| {});
    let node = NodeService::new(
        site_config(),
        NodePorts {
            radio: BleCentral::new(&RADIO_EVENTS, SimPeripheral::default()),
            link: WifiLink::with_failures(&NET_EVENTS, wifi_failures),
            transport: StubTransport::default(),
            indicator_pin: MockPin::default(),
            clock: SystemClock::new(),
            sink: RecordingSink::default(),
        },
    )
    .expect("site config is valid");
    Rc::new(RefCell::new(node))
}

#[test]
fn pairs_and_publishes_uptime() {
    let _guard = RUNTIME_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let node = sim_node(0);

    runtime::run_for(&node, Watchdog::default(), Duration::from_millis(1500));

    let n = node.borrow();
    assert!(!n.is_started(), "runtime stops the node on exit");
    assert!(
        n.sink()
            .transitions
            .contains(&(ConnectionState::ResolvingServices, ConnectionState::Subscribed))
    );
    assert_eq!(
        n.sink().transitions.last(),
        Some(&(ConnectionState::Subscribed, ConnectionState::Idle))
    );
    assert!(n.sink().saw("NET Connecting -> Connected"));
    assert!(!n.transport().bodies("node-test/uptime").is_empty());
    assert!(n.indicator().toggles() >= 2);
}

#[test]
fn relays_notifications_while_running() {
    let _guard = RUNTIME_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let node = sim_node(0);
    let handle = node.clone();

    runtime::run_until(&node, Watchdog::default(), async move {
        async_io_mini::Timer::after(Duration::from_millis(300)).await;
        handle
            .borrow()
            .radio()
            .sim_notify(&[0x80, 0x80, 0x90, 0x3C, 0x40]);
        async_io_mini::Timer::after(Duration::from_millis(300)).await;
    });

    let n = node.borrow();
    assert_eq!(n.transport().bodies("node-test/peripheral"), ["8080903c40"]);
    assert!(n.sink().saw(&format!("PAIR {PIANO} 5 bytes")));
}

#[test]
fn unreachable_access_point_fails_stop() {
    let _guard = RUNTIME_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let node = sim_node(u32::MAX);

    let handle = node.clone();
    runtime::run_until(&node, Watchdog::default(), async move {
        async_io_mini::Timer::after(Duration::from_millis(300)).await;
        let n = handle.borrow();
        assert_eq!(n.session().state(), NetworkState::Failed);
        assert_eq!(n.link().connect_attempts(), 3);
    });

    let n = node.borrow();
    assert_eq!(n.transport().attempts, 0, "nothing published without a link");
    assert!(n.sink().saw("NET Connecting -> Failed retries=3"));
    // Pairing runs regardless of the network.
    assert!(
        n.sink()
            .transitions
            .contains(&(ConnectionState::ResolvingServices, ConnectionState::Subscribed))
    );
}
