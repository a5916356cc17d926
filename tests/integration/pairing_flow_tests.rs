//! Pairing machine flows against a recording radio.
//!
//! Drives `PairingMachine` through discovery, promotion, connection,
//! resolution and subscription, and through every failure path back to
//! Disconnected or Idle.

use crate::mock_ports::{
    MockRadio, PIANO, RadioCall, RecordingSink, SPEAKER, SYNTH, midi_device, plain_device,
};

use sensornode::config::PairingConfig;
use sensornode::events::RadioEvent;
use sensornode::pairing::ConnectionState;
use sensornode::pairing::PairingMachine;
use sensornode::pairing::device::ServiceId;

use ConnectionState::*;

struct Rig {
    m: PairingMachine,
    radio: MockRadio,
    sink: RecordingSink,
}

impl Rig {
    fn new() -> Self {
        Self {
            m: PairingMachine::new(PairingConfig::default()),
            radio: MockRadio::default(),
            sink: RecordingSink::default(),
        }
    }

    fn start(&mut self, now: u64) -> bool {
        self.m.start(now, &mut self.radio, &mut self.sink)
    }

    fn ev(&mut self, event: RadioEvent, now: u64) {
        self.m.handle(event, now, &mut self.radio, &mut self.sink);
    }

    fn tick(&mut self, now: u64) {
        self.m.tick(now, &mut self.radio, &mut self.sink);
    }

    fn stop(&mut self, now: u64) {
        self.m.stop(now, &mut self.radio, &mut self.sink);
    }

    /// Start and advance to `target` along the success path.
    fn drive_to(target: ConnectionState) -> Self {
        let mut r = Self::new();
        r.start(0);
        if target == Scanning {
            return r;
        }
        r.ev(midi_device(PIANO, "Digital Piano"), 10);
        if target == Connecting {
            return r;
        }
        r.ev(RadioEvent::Connected { peer: PIANO }, 20);
        if target == ResolvingServices {
            return r;
        }
        r.ev(
            RadioEvent::ServiceFound {
                peer: PIANO,
                service: ServiceId::MIDI,
            },
            30,
        );
        assert_eq!(r.m.state(), Subscribed);
        r
    }
}

// ── Happy path ────────────────────────────────────────────────

#[test]
fn full_path_to_subscribed() {
    let mut r = Rig::drive_to(ResolvingServices);
    r.ev(
        RadioEvent::ServiceFound {
            peer: PIANO,
            service: ServiceId::from_short(0x180A),
        },
        25,
    );
    assert_eq!(r.m.state(), ResolvingServices, "non-target service does not complete resolution");

    r.ev(
        RadioEvent::ServiceFound {
            peer: PIANO,
            service: ServiceId::MIDI,
        },
        30,
    );

    assert_eq!(r.m.state(), Subscribed);
    assert_eq!(
        r.sink.transitions,
        [
            (Idle, Scanning),
            (Scanning, CandidateFound),
            (CandidateFound, Connecting),
            (Connecting, ResolvingServices),
            (ResolvingServices, Subscribed),
        ]
    );
    assert_eq!(
        r.radio.calls,
        [
            RadioCall::StartScan,
            RadioCall::StopScan,
            RadioCall::Connect(PIANO),
            RadioCall::Resolve(PIANO, ServiceId::MIDI),
            RadioCall::Subscribe(PIANO, ServiceId::MIDI, ServiceId::MIDI_IO),
        ]
    );
    let target = r.m.target().expect("target recorded");
    assert_eq!(target.discovered_services.len(), 2);
    assert!(r.m.connection_open());
}

#[test]
fn subscribed_tick_writes_heartbeat() {
    let mut r = Rig::drive_to(Subscribed);
    r.tick(2000);
    assert_eq!(
        r.radio.calls.last(),
        Some(&RadioCall::Write(PIANO, vec![0x80, 0x80, 0xFE]))
    );
    assert_eq!(r.m.state(), Subscribed);
}

#[test]
fn notifications_become_peripheral_data() {
    let mut r = Rig::drive_to(Subscribed);
    let mut data = heapless::Vec::new();
    data.extend_from_slice(&[0x80, 0x80, 0x90, 0x3C, 0x40]).unwrap();
    r.ev(RadioEvent::Notification { peer: PIANO, data }, 40);
    assert!(r.sink.saw("5 bytes"));
    assert_eq!(r.m.state(), Subscribed);
}

// ── Exclusivity ───────────────────────────────────────────────

#[test]
fn first_match_wins() {
    let mut r = Rig::new();
    r.start(0);
    r.ev(plain_device(SPEAKER), 5);
    assert_eq!(r.m.state(), Scanning, "non-matching device is not promoted");

    r.ev(midi_device(PIANO, "Digital Piano"), 10);
    r.ev(midi_device(SYNTH, "Synth"), 11);

    assert_eq!(r.m.state(), Connecting);
    assert_eq!(r.m.target().map(|t| t.address), Some(PIANO));
    assert_eq!(r.radio.connects(), 1);
    assert!(!r.radio.calls.contains(&RadioCall::Connect(SYNTH)));
}

#[test]
fn unexpected_connection_is_torn_down() {
    let mut r = Rig::drive_to(Connecting);
    r.ev(RadioEvent::Connected { peer: SYNTH }, 15);

    assert_eq!(r.m.state(), Connecting);
    assert_eq!(r.radio.disconnects_of(SYNTH), 1);
    assert_eq!(r.radio.disconnects_of(PIANO), 0);
    assert!(r.sink.saw("unexpected connection"));
}

#[test]
fn connection_while_idle_is_refused() {
    let mut r = Rig::new();
    r.ev(RadioEvent::Connected { peer: SYNTH }, 0);
    assert_eq!(r.m.state(), Idle);
    assert_eq!(r.radio.disconnects_of(SYNTH), 1);
}

#[test]
fn stale_callbacks_are_ignored() {
    let mut r = Rig::drive_to(Subscribed);
    let before = r.sink.lines.len();

    r.ev(RadioEvent::LinkLost { peer: SYNTH }, 40);
    r.ev(
        RadioEvent::ServiceFound {
            peer: PIANO,
            service: ServiceId::MIDI,
        },
        41,
    );
    r.ev(RadioEvent::ScanComplete, 42);

    assert_eq!(r.m.state(), Subscribed);
    assert_eq!(r.sink.lines.len(), before);
}

// ── Failure paths ─────────────────────────────────────────────

#[test]
fn service_missing_rejects_device_until_restart() {
    let mut r = Rig::drive_to(ResolvingServices);
    r.ev(RadioEvent::ServiceNotFound { peer: PIANO }, 30);

    assert_eq!(r.m.state(), Disconnected);
    assert_eq!(r.radio.disconnects_of(PIANO), 1);
    assert!(r.m.is_rejected(&PIANO));
    assert_eq!(r.m.retries(), 1);

    r.tick(2000);
    assert_eq!(r.m.state(), Scanning);

    r.ev(midi_device(PIANO, "Digital Piano"), 2010);
    assert_eq!(r.m.state(), Scanning, "rejected device is not promoted again");

    r.ev(midi_device(SYNTH, "Synth"), 2020);
    assert_eq!(r.m.state(), Connecting);
    assert_eq!(r.radio.calls.last(), Some(&RadioCall::Connect(SYNTH)));
}

#[test]
fn link_loss_while_subscribed_retries() {
    let mut r = Rig::drive_to(Subscribed);
    r.ev(RadioEvent::LinkLost { peer: PIANO }, 40);

    assert_eq!(r.m.state(), Disconnected);
    assert!(!r.m.connection_open());
    // The peer already dropped; no local teardown needed.
    assert_eq!(r.radio.disconnects_of(PIANO), 0);

    r.tick(2000);
    assert_eq!(r.m.state(), Scanning);
    assert!(r.sink.saw("retry 1"));
}

#[test]
fn retries_exhaust_to_idle() {
    let mut r = Rig::new();
    r.start(0);
    let mut now = 0;
    for _ in 0..3 {
        now += 10;
        r.ev(midi_device(PIANO, "Digital Piano"), now);
        assert_eq!(r.m.state(), Connecting);
        r.ev(RadioEvent::ConnectFailed { peer: PIANO }, now + 1);
        assert_eq!(r.m.state(), Disconnected);
        now += 2000;
        r.tick(now);
    }

    assert_eq!(r.m.state(), Idle);
    assert_eq!(r.m.retries(), 3);
    assert_eq!(r.radio.connects(), 3);
    assert!(r.sink.saw("giving up after 3 attempts"));

    // A fresh start clears the streak.
    assert!(r.start(now + 1));
    assert_eq!(r.m.retries(), 0);
    assert_eq!(r.m.state(), Scanning);
}

#[test]
fn refused_connect_counts_as_failure() {
    let mut r = Rig::new();
    r.radio.refuse_connect = true;
    r.start(0);
    r.ev(midi_device(PIANO, "Digital Piano"), 10);

    assert_eq!(r.m.state(), Disconnected);
    assert!(r.sink.saw("RADIO connect refused"));
    assert_eq!(r.radio.disconnects_of(PIANO), 0);
}

#[test]
fn refused_heartbeat_drops_link() {
    let mut r = Rig::drive_to(Subscribed);
    r.radio.refuse_write = true;
    r.tick(2000);

    assert_eq!(r.m.state(), Disconnected);
    assert_eq!(r.radio.disconnects_of(PIANO), 1);
    assert!(r.sink.saw("RADIO write refused"));
}

#[test]
fn connect_times_out() {
    let mut r = Rig::drive_to(Connecting);
    r.tick(5_000);
    assert_eq!(r.m.state(), Connecting);

    r.tick(10_010);
    assert_eq!(r.m.state(), Disconnected);
    assert_eq!(r.radio.disconnects_of(PIANO), 1, "pending open is cancelled");
    assert!(r.sink.saw("connect timed out"));
}

#[test]
fn resolve_times_out() {
    let mut r = Rig::drive_to(ResolvingServices);
    r.tick(10_020);
    assert_eq!(r.m.state(), Disconnected);
    assert!(r.sink.saw("service resolution timed out"));
    assert!(!r.m.is_rejected(&PIANO), "a timeout is not a protocol mismatch");
}

// ── Scanning upkeep ───────────────────────────────────────────

#[test]
fn scan_complete_starts_new_epoch() {
    let mut r = Rig::new();
    r.start(0);
    r.ev(plain_device(SPEAKER), 5);
    r.ev(RadioEvent::ScanComplete, 10_000);

    assert_eq!(r.m.state(), Scanning);
    assert_eq!(r.radio.scans(), 2);
    assert_eq!(r.m.epoch(), 2);
    assert!(r.sink.saw("epoch 1 ended, 1 seen"));
}

#[test]
fn stalled_scan_is_restarted() {
    let mut r = Rig::new();
    r.start(0);
    r.tick(29_999);
    assert_eq!(r.radio.scans(), 1);

    r.tick(30_000);
    assert_eq!(r.radio.scans(), 2);
    assert!(r.sink.saw("scan stalled"));
}

// ── Stop ──────────────────────────────────────────────────────

#[test]
fn stop_releases_connection_from_every_state() {
    for state in [Scanning, Connecting, ResolvingServices, Subscribed] {
        let mut r = Rig::drive_to(state);
        r.stop(100);

        assert_eq!(r.m.state(), Idle, "stop from {state}");
        assert!(!r.m.connection_open(), "stop from {state}");
        assert!(r.m.target().is_none(), "stop from {state}");
        let expected = usize::from(state != Scanning);
        assert_eq!(r.radio.disconnects_of(PIANO), expected, "stop from {state}");
        assert_eq!(r.sink.transitions.last(), Some(&(state, Idle)));
    }
}

#[test]
fn stop_from_disconnected_does_not_double_release() {
    let mut r = Rig::drive_to(ResolvingServices);
    r.ev(RadioEvent::ServiceNotFound { peer: PIANO }, 30);
    r.stop(40);
    assert_eq!(r.m.state(), Idle);
    assert_eq!(r.radio.disconnects_of(PIANO), 1);
}
