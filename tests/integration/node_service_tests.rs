//! NodeService lifecycle, network session and maintenance behaviour.

use crate::mock_ports::*;

use sensornode::app::ports::TaskDelegate;
use sensornode::app::service::{NodePorts, NodeService};
use sensornode::config::NodeConfig;
use sensornode::error::ConfigError;
use sensornode::events::{NetEvent, RadioEvent};
use sensornode::network::NetworkState;
use sensornode::pairing::ConnectionState;
use sensornode::pairing::device::ServiceId;
use sensornode::scheduler::TaskId;

fn subscribe(node: &mut TestNode) {
    node.handle_radio_event(midi_device(PIANO, "Digital Piano"));
    node.handle_radio_event(RadioEvent::Connected { peer: PIANO });
    node.handle_radio_event(RadioEvent::ServiceFound {
        peer: PIANO,
        service: ServiceId::MIDI,
    });
    assert_eq!(node.pairing().state(), ConnectionState::Subscribed);
}

// ── Construction ──────────────────────────────────────────────

#[test]
fn invalid_config_is_fatal() {
    let result = NodeService::new(
        NodeConfig::default(),
        NodePorts {
            radio: MockRadio::default(),
            link: MockLink::default(),
            transport: StubTransport::default(),
            indicator_pin: MockPin::default(),
            clock: ManualClock::default(),
            sink: RecordingSink::default(),
        },
    );
    assert!(matches!(result, Err(ConfigError::InvalidSsid)));
}

#[test]
fn nothing_runs_before_start() {
    let (mut node, _clock) = make_node(site_config());
    node.handle_radio_event(midi_device(PIANO, "Digital Piano"));
    node.handle_net_event(NetEvent::LinkUp);

    assert!(!node.is_started());
    assert!(node.radio().calls.is_empty());
    assert_eq!(node.link().connects, 0);
    assert_eq!(node.pairing().state(), ConnectionState::Idle);
    assert_eq!(node.session().state(), NetworkState::Disconnected);
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn start_brings_up_network_and_discovery_together() {
    let (mut node, _clock) = make_node(site_config());
    node.start();

    assert!(node.is_started());
    assert_eq!(node.link().connects, 1);
    assert_eq!(node.link().last_ssid.as_deref(), Some("HomeWiFi"));
    assert_eq!(node.session().state(), NetworkState::Connecting);
    assert_eq!(node.pairing().state(), ConnectionState::Scanning);
    assert_eq!(node.radio().scans(), 1);

    let sink = node.sink();
    assert_eq!(sink.lines.first().map(String::as_str), Some("START node-test"));
    assert!(sink.saw("NET Disconnected -> Connecting retries=0"));
    assert_eq!(sink.transitions, [(ConnectionState::Idle, ConnectionState::Scanning)]);
}

#[test]
fn start_twice_is_ignored() {
    let (mut node, _clock) = make_node(site_config());
    node.start();
    node.start();
    assert_eq!(node.link().connects, 1);
    assert_eq!(node.radio().scans(), 1);
}

#[test]
fn stop_releases_peripheral_and_link() {
    let (mut node, _clock) = make_node(site_config());
    node.start();
    node.handle_net_event(NetEvent::LinkUp);
    subscribe(&mut node);

    node.stop();

    assert!(!node.is_started());
    assert_eq!(node.pairing().state(), ConnectionState::Idle);
    assert_eq!(node.radio().disconnects_of(PIANO), 1);
    assert_eq!(node.link().disconnects, 1);
    assert_eq!(node.session().state(), NetworkState::Disconnected);
    assert!(node.sink().saw("STOP"));
}

// ── Network session ───────────────────────────────────────────

#[test]
fn link_up_makes_node_ready() {
    let (mut node, _clock) = make_node(site_config());
    node.start();
    assert!(!node.session().is_ready());

    node.handle_net_event(NetEvent::LinkUp);
    assert!(node.session().is_ready());
    assert!(node.sink().saw("NET Connecting -> Connected retries=0"));
}

#[test]
fn network_fails_after_three_link_downs() {
    let (mut node, _clock) = make_node(site_config());
    node.start();
    for _ in 0..3 {
        node.handle_net_event(NetEvent::LinkDown);
    }

    assert_eq!(node.session().state(), NetworkState::Failed);
    assert_eq!(node.link().connects, 3);
    assert!(node.sink().saw("NET Connecting -> Failed retries=3"));

    // Failed is terminal until an explicit restart.
    node.handle_net_event(NetEvent::LinkUp);
    assert_eq!(node.session().state(), NetworkState::Failed);

    node.restart_network();
    assert_eq!(node.session().state(), NetworkState::Connecting);
    assert_eq!(node.link().connects, 4);
    assert_eq!(node.session().retries(), 0);
}

#[test]
fn restart_from_connected_ignores_own_teardown() {
    let (mut node, _clock) = make_node(site_config());
    node.start();
    node.handle_net_event(NetEvent::LinkUp);

    node.restart_network();
    assert_eq!(node.link().disconnects, 1);
    // The driver reports the teardown it was asked for.
    node.handle_net_event(NetEvent::LinkDown);

    assert_eq!(node.session().state(), NetworkState::Connecting);
    assert_eq!(node.session().retries(), 0);
    assert_eq!(node.link().connects, 2);
}

#[test]
fn timed_out_association_counts_once() {
    let (mut node, clock) = make_node(site_config());
    node.start();

    let now = clock.advance(15_000);
    node.on_task_due(TaskId::Maintenance, now);
    node.handle_net_event(NetEvent::LinkDown);

    assert_eq!(node.session().retries(), 1);
    assert_eq!(node.link().connects, 2, "no second reconnect for the echo");
}

#[test]
fn refused_connects_reach_the_ceiling() {
    let (mut node, _clock) = make_node(site_config());
    node.link_mut().refuse = true;
    node.start();

    assert_eq!(node.session().state(), NetworkState::Failed);
    assert_eq!(node.link().connects, 3);
}

#[test]
fn link_loss_while_connected_reconnects() {
    let (mut node, _clock) = make_node(site_config());
    node.start();
    node.handle_net_event(NetEvent::LinkUp);
    node.handle_net_event(NetEvent::LinkDown);

    assert_eq!(node.session().state(), NetworkState::Connecting);
    assert_eq!(node.session().retries(), 1);
    assert_eq!(node.link().connects, 2);

    node.handle_net_event(NetEvent::LinkUp);
    assert_eq!(node.session().retries(), 0, "success clears the streak");
}

#[test]
fn stuck_association_times_out_on_maintenance() {
    let (mut node, clock) = make_node(site_config());
    node.start();

    let now = clock.advance(14_000);
    node.on_task_due(TaskId::Maintenance, now);
    assert_eq!(node.link().connects, 1);

    let now = clock.advance(1_000);
    node.on_task_due(TaskId::Maintenance, now);
    assert_eq!(node.link().connects, 2);
    assert_eq!(node.session().retries(), 1);
}

// ── Maintenance ───────────────────────────────────────────────

#[test]
fn maintenance_writes_heartbeat_while_subscribed() {
    let (mut node, clock) = make_node(site_config());
    node.start();
    subscribe(&mut node);

    let now = clock.advance(2000);
    node.on_task_due(TaskId::Maintenance, now);

    assert_eq!(
        node.radio().calls.last(),
        Some(&RadioCall::Write(PIANO, vec![0x80, 0x80, 0xFE]))
    );
}

#[test]
fn pairing_gives_up_then_restarts_on_request() {
    let (mut node, clock) = make_node(site_config());
    node.start();
    for _ in 0..3 {
        node.handle_radio_event(midi_device(PIANO, "Digital Piano"));
        node.handle_radio_event(RadioEvent::ConnectFailed { peer: PIANO });
        let now = clock.advance(2000);
        node.on_task_due(TaskId::Maintenance, now);
    }
    assert_eq!(node.pairing().state(), ConnectionState::Idle);
    assert!(node.sink().saw("PAIR giving up after 3 attempts"));

    // The network is unaffected by pairing failures.
    assert_eq!(node.session().state(), NetworkState::Connecting);

    assert!(node.start_pairing());
    assert_eq!(node.pairing().state(), ConnectionState::Scanning);
}

#[test]
fn status_snapshot_published_on_schedule() {
    let mut config = site_config();
    config.telemetry.status_every = 1;
    let (mut node, clock) = make_node(config);
    node.start();
    node.handle_net_event(NetEvent::LinkUp);

    let now = clock.advance(2000);
    node.on_task_due(TaskId::Maintenance, now);

    let status = node.transport().bodies("node-test/status");
    assert_eq!(status.len(), 1);
    let json: serde_json::Value = serde_json::from_str(status[0]).unwrap();
    assert_eq!(json["pairing"], "Scanning");
    assert_eq!(json["network"], "Connected");
    assert_eq!(json["uptime_ms"], 2000);
}

#[test]
fn status_disabled_with_zero_interval() {
    let mut config = site_config();
    config.telemetry.status_every = 0;
    let (mut node, clock) = make_node(config);
    node.start();
    node.handle_net_event(NetEvent::LinkUp);
    for _ in 0..20 {
        let now = clock.advance(2000);
        node.on_task_due(TaskId::Maintenance, now);
    }
    assert!(node.transport().bodies("node-test/status").is_empty());
}

#[test]
fn queue_drops_reported_once_per_increase() {
    let (mut node, clock) = make_node(site_config());
    node.start();

    node.set_queue_drops(2, 0);
    let now = clock.advance(2000);
    node.on_task_due(TaskId::Maintenance, now);
    let now = clock.advance(2000);
    node.on_task_due(TaskId::Maintenance, now);

    let reports = node
        .sink()
        .lines
        .iter()
        .filter(|l| l.starts_with("QUEUE"))
        .count();
    assert_eq!(reports, 1);
    assert!(node.sink().saw("QUEUE radio dropped 2 events"));
}

// ── Indicator ─────────────────────────────────────────────────

#[test]
fn indicator_task_toggles_pin() {
    let (mut node, _clock) = make_node(site_config());
    node.on_task_due(TaskId::Indicator, 500);
    node.on_task_due(TaskId::Indicator, 1000);
    assert_eq!(node.indicator().toggles(), 2);
    assert!(!node.indicator().is_on());
}

#[test]
fn disabled_indicator_holds_low() {
    let mut config = site_config();
    config.indicator_enabled = false;
    let (mut node, _clock) = make_node(config);
    node.on_task_due(TaskId::Indicator, 500);
    assert!(!node.indicator().is_on());
}
