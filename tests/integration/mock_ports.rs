//! Recording mock ports for integration tests.
//!
//! Every command-side call is recorded so tests can assert on the full
//! history without a radio stack or an access point.

#![allow(dead_code)]

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};

use sensornode::app::events::NodeEvent;
use sensornode::app::ports::{Clock, EventSink, NetworkLink, PeripheralRadio, TelemetryTransport};
use sensornode::app::service::{NodePorts, NodeService};
use sensornode::config::NodeConfig;
use sensornode::error::{LinkError, RadioError, TransportError};
use sensornode::events::RadioEvent;
use sensornode::network::{Credentials, NetTransition};
use sensornode::pairing::ConnectionState;
use sensornode::pairing::device::{BdAddr, DeviceRecord, ServiceId};
use sensornode::telemetry::QoS;

pub const DEVICE_ID: &str = "node-test";
pub const PIANO: BdAddr = BdAddr([0xC4, 0x4F, 0x33, 0x0A, 0x1B, 0x2C]);
pub const SYNTH: BdAddr = BdAddr([0xC4, 0x4F, 0x33, 0x0A, 0x1B, 0x99]);
pub const SPEAKER: BdAddr = BdAddr([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]);

// ── Radio ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    StartScan,
    StopScan,
    Connect(BdAddr),
    Resolve(BdAddr, ServiceId),
    Subscribe(BdAddr, ServiceId, ServiceId),
    Write(BdAddr, Vec<u8>),
    Disconnect(BdAddr),
}

#[derive(Default)]
pub struct MockRadio {
    pub calls: Vec<RadioCall>,
    pub refuse_scan: bool,
    pub refuse_connect: bool,
    pub refuse_write: bool,
}

impl MockRadio {
    pub fn count(&self, pred: impl Fn(&RadioCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn connects(&self) -> usize {
        self.count(|c| matches!(c, RadioCall::Connect(_)))
    }

    pub fn disconnects_of(&self, peer: BdAddr) -> usize {
        self.count(|c| *c == RadioCall::Disconnect(peer))
    }

    pub fn scans(&self) -> usize {
        self.count(|c| *c == RadioCall::StartScan)
    }
}

impl PeripheralRadio for MockRadio {
    fn start_scan(&mut self) -> Result<(), RadioError> {
        self.calls.push(RadioCall::StartScan);
        if self.refuse_scan {
            return Err(RadioError::ScanFailed);
        }
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.calls.push(RadioCall::StopScan);
    }

    fn connect(&mut self, peer: &BdAddr) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Connect(*peer));
        if self.refuse_connect {
            return Err(RadioError::ConnectFailed);
        }
        Ok(())
    }

    fn resolve_services(&mut self, peer: &BdAddr, target: ServiceId) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Resolve(*peer, target));
        Ok(())
    }

    fn subscribe(
        &mut self,
        peer: &BdAddr,
        service: ServiceId,
        characteristic: ServiceId,
    ) -> Result<(), RadioError> {
        self.calls
            .push(RadioCall::Subscribe(*peer, service, characteristic));
        Ok(())
    }

    fn write(&mut self, peer: &BdAddr, data: &[u8]) -> Result<(), RadioError> {
        self.calls.push(RadioCall::Write(*peer, data.to_vec()));
        if self.refuse_write {
            return Err(RadioError::WriteFailed);
        }
        Ok(())
    }

    fn disconnect(&mut self, peer: &BdAddr) {
        self.calls.push(RadioCall::Disconnect(*peer));
    }
}

// ── Network link ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockLink {
    pub connects: u32,
    pub disconnects: u32,
    pub last_ssid: Option<String>,
    pub refuse: bool,
}

impl NetworkLink for MockLink {
    fn connect(&mut self, creds: &Credentials) -> Result<(), LinkError> {
        self.connects += 1;
        self.last_ssid = Some(creds.ssid.as_str().into());
        if self.refuse {
            return Err(LinkError::ConnectFailed);
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

// ── Telemetry transport ───────────────────────────────────────

#[derive(Default)]
pub struct StubTransport {
    pub sent: Vec<(String, String, QoS)>,
    pub fail: bool,
    pub attempts: u32,
}

impl StubTransport {
    /// Bodies sent on `channel`, oldest first.
    pub fn bodies(&self, channel: &str) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|(c, _, _)| c == channel)
            .map(|(_, b, _)| b.as_str())
            .collect()
    }

    pub fn debug_lines(&self) -> Vec<&str> {
        self.bodies(&format!("{DEVICE_ID}/debug"))
    }
}

impl TelemetryTransport for StubTransport {
    fn send(&mut self, channel: &str, body: &str, qos: QoS) -> Result<(), TransportError> {
        self.attempts += 1;
        if self.fail {
            return Err(TransportError::SendFailed);
        }
        self.sent.push((channel.into(), body.into(), qos));
        Ok(())
    }
}

// ── Indicator pin ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockPin {
    pub writes: Vec<bool>,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.writes.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.writes.push(true);
        Ok(())
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Virtual time shared between the test and the node.
#[derive(Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn set(&self, ms: u64) {
        self.0.set(ms);
    }

    pub fn advance(&self, ms: u64) -> u64 {
        let now = self.0.get() + ms;
        self.0.set(now);
        now
    }
}

impl Clock for ManualClock {
    fn uptime_ms(&self) -> u64 {
        self.0.get()
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub lines: Vec<String>,
    pub transitions: Vec<(ConnectionState, ConnectionState)>,
    pub net: Vec<NetTransition>,
}

impl RecordingSink {
    pub fn saw(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &NodeEvent<'_>) {
        self.lines.push(event.to_string());
        match event {
            NodeEvent::PairingTransition { from, to, .. } => self.transitions.push((*from, *to)),
            NodeEvent::NetworkChanged(t) => self.net.push(*t),
            _ => {}
        }
    }
}

// ── Builders ──────────────────────────────────────────────────

pub type TestNode = NodeService<MockRadio, MockLink, StubTransport, MockPin, ManualClock, RecordingSink>;

pub fn site_config() -> NodeConfig {
    let mut c = NodeConfig::default();
    c.device_id.clear();
    c.device_id.push_str(DEVICE_ID).unwrap();
    c.network.credentials = Credentials::new("HomeWiFi", "mysecret8").unwrap();
    c.network.collector.host.push_str("192.168.1.20").unwrap();
    c.network.collector.port = 5005;
    c
}

pub fn make_node(config: NodeConfig) -> (TestNode, ManualClock) {
    let clock = ManualClock::default();
    let node = NodeService::new(
        config,
        NodePorts {
            radio: MockRadio::default(),
            link: MockLink::default(),
            transport: StubTransport::default(),
            indicator_pin: MockPin::default(),
            clock: clock.clone(),
            sink: RecordingSink::default(),
        },
    )
    .expect("site config is valid");
    (node, clock)
}

pub fn midi_device(addr: BdAddr, name: &str) -> RadioEvent {
    RadioEvent::DeviceObserved(
        DeviceRecord::new(addr, -58)
            .with_name(name)
            .with_service(ServiceId::MIDI),
    )
}

pub fn plain_device(addr: BdAddr) -> RadioEvent {
    RadioEvent::DeviceObserved(DeviceRecord::new(addr, -70).with_service(ServiceId::from_short(0x180F)))
}
