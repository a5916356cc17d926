//! Telemetry delivery: channel naming, readiness gating, diagnostics,
//! peripheral relay and scheduler-driven uptime.

use crate::mock_ports::*;

use sensornode::app::ports::TaskDelegate;
use sensornode::events::{NetEvent, RadioEvent};
use sensornode::network::{Credentials, NetworkSession};
use sensornode::pairing::device::ServiceId;
use sensornode::scheduler::{Scheduler, TaskId};
use sensornode::telemetry::{MAX_BODY_LEN, QoS, TelemetryMessage, TelemetryPublisher};

fn ready_session() -> (NetworkSession, MockLink) {
    let mut link = MockLink::default();
    let mut session = NetworkSession::new(3, 15_000);
    session.start(Credentials::new("HomeWiFi", "").unwrap(), &mut link, 0);
    session.on_link_up();
    assert!(session.is_ready());
    (session, link)
}

// ── Publisher against a live session ─────────────────────────

#[test]
fn qos_and_channel_passed_through() {
    let (session, _link) = ready_session();
    let mut publisher = TelemetryPublisher::new(DEVICE_ID, QoS::AtMostOnce);
    let mut transport = StubTransport::default();

    publisher.publish(
        &session,
        &mut transport,
        &TelemetryMessage::new("temperature", "21.5", QoS::ExactlyOnce),
    );

    assert_eq!(
        transport.sent,
        [("node-test/temperature".to_string(), "21.5".to_string(), QoS::ExactlyOnce)]
    );
}

#[test]
fn oversized_body_cut_on_char_boundary() {
    let (session, _link) = ready_session();
    let mut publisher = TelemetryPublisher::new(DEVICE_ID, QoS::AtMostOnce);
    let mut transport = StubTransport::default();
    // 3-byte chars: 1024 is not a multiple of 3.
    let body = "€".repeat(400);

    publisher.publish(
        &session,
        &mut transport,
        &TelemetryMessage::new("blob", &body, QoS::AtMostOnce),
    );

    let sent = &transport.sent[0].1;
    assert_eq!(sent.len(), 1023);
    assert!(sent.len() <= MAX_BODY_LEN);
    assert_eq!(publisher.stats().truncated, 1);
}

#[test]
fn failed_session_blocks_publishing() {
    let mut link = MockLink::default();
    let mut session = NetworkSession::new(3, 15_000);
    session.start(Credentials::new("HomeWiFi", "").unwrap(), &mut link, 0);
    for _ in 0..3 {
        session.on_link_down(&mut link, 0);
    }
    let mut publisher = TelemetryPublisher::new(DEVICE_ID, QoS::AtMostOnce);
    let mut transport = StubTransport::default();

    publisher.publish_debug(&session, &mut transport, "anyone there?");

    assert_eq!(transport.attempts, 0);
    assert_eq!(publisher.stats().dropped_not_ready, 1);
}

// ── Through the node ──────────────────────────────────────────

#[test]
fn nothing_sent_before_link_up() {
    let (mut node, clock) = make_node(site_config());
    node.start();
    for _ in 0..4 {
        let now = clock.advance(1000);
        node.on_task_due(TaskId::Sensor, now);
        node.on_task_due(TaskId::Maintenance, now);
    }

    assert_eq!(node.transport().attempts, 0);
    assert!(node.telemetry_stats().dropped_not_ready > 0);
}

#[test]
fn diagnostics_go_to_debug_channel_once_ready() {
    let (mut node, _clock) = make_node(site_config());
    node.start();
    node.handle_net_event(NetEvent::LinkUp);
    node.handle_radio_event(midi_device(PIANO, "Digital Piano"));

    let debug = node.transport().debug_lines();
    assert_eq!(debug[0], "NET Connecting -> Connected retries=0");
    assert!(debug.iter().any(|l| l.starts_with("PAIR candidate C4:4F:33:0A:1B:2C")));
    assert!(debug.contains(&"PAIR Scanning -> CandidateFound peer=C4:4F:33:0A:1B:2C"));
    assert!(debug.contains(&"PAIR CandidateFound -> Connecting peer=C4:4F:33:0A:1B:2C"));
    assert!(
        node.transport()
            .sent
            .iter()
            .filter(|(c, _, _)| c == "node-test/debug")
            .all(|(_, _, q)| *q == QoS::AtMostOnce)
    );
}

#[test]
fn debug_qos_follows_config() {
    let mut config = site_config();
    config.telemetry.debug_qos = QoS::AtLeastOnce;
    config.telemetry.telemetry_qos = QoS::ExactlyOnce;
    let (mut node, clock) = make_node(config);
    node.start();
    node.handle_net_event(NetEvent::LinkUp);
    let now = clock.advance(1000);
    node.on_task_due(TaskId::Sensor, now);

    let sent = &node.transport().sent;
    assert!(sent.iter().any(|(c, _, q)| c == "node-test/debug" && *q == QoS::AtLeastOnce));
    assert!(sent.iter().any(|(c, _, q)| c == "node-test/uptime" && *q == QoS::ExactlyOnce));
}

#[test]
fn peripheral_notifications_relayed_as_hex() {
    let (mut node, _clock) = make_node(site_config());
    node.start();
    node.handle_net_event(NetEvent::LinkUp);
    node.handle_radio_event(midi_device(PIANO, "Digital Piano"));
    node.handle_radio_event(RadioEvent::Connected { peer: PIANO });
    node.handle_radio_event(RadioEvent::ServiceFound {
        peer: PIANO,
        service: ServiceId::MIDI,
    });

    let mut data = heapless::Vec::new();
    data.extend_from_slice(&[0x80, 0x80, 0x90, 0x3C, 0x40]).unwrap();
    node.handle_radio_event(RadioEvent::Notification { peer: PIANO, data });

    assert_eq!(node.transport().bodies("node-test/peripheral"), ["8080903c40"]);
    assert!(node.sink().saw("PAIR C4:4F:33:0A:1B:2C 5 bytes"));
}

#[test]
fn transport_errors_are_swallowed() {
    let (mut node, clock) = make_node(site_config());
    node.start();
    node.handle_net_event(NetEvent::LinkUp);
    node.transport_mut().fail = true;

    for _ in 0..3 {
        let now = clock.advance(1000);
        node.on_task_due(TaskId::Sensor, now);
    }

    assert_eq!(node.transport().attempts, 4, "link-up diagnostic plus three samples");
    assert_eq!(node.telemetry_stats().failed, 3);
    assert!(node.session().is_ready());
}

// ── Scheduler-driven ──────────────────────────────────────────

#[test]
fn ten_seconds_of_virtual_time() {
    let (mut node, clock) = make_node(site_config());
    let mut sched = Scheduler::with_node_tasks(&node.config().timing, 0);
    node.start();
    node.handle_net_event(NetEvent::LinkUp);

    for now in (100..=10_000).step_by(100) {
        clock.set(now);
        sched.tick(now, &mut node);
    }

    assert_eq!(node.indicator().toggles(), 20);
    assert_eq!(sched.runs(TaskId::Sensor), 10);
    assert_eq!(sched.runs(TaskId::Maintenance), 5);
    assert_eq!(sched.overruns(), 0);

    let uptime = node.transport().bodies("node-test/uptime");
    assert_eq!(uptime.len(), 10);
    assert_eq!(uptime.first(), Some(&"1000"));
    assert_eq!(uptime.last(), Some(&"10000"));
}

#[test]
fn late_tick_skips_missed_activations() {
    let (mut node, clock) = make_node(site_config());
    let mut sched = Scheduler::with_node_tasks(&node.config().timing, 0);
    node.start();
    node.handle_net_event(NetEvent::LinkUp);

    clock.set(3_500);
    let ran = sched.tick(3_500, &mut node);

    assert_eq!(ran, 3, "each task runs once however late");
    assert_eq!(node.transport().bodies("node-test/uptime"), ["3500"]);
    assert!(sched.overruns() > 0);
    assert_eq!(sched.next_deadline(), Some(4_000));
}
