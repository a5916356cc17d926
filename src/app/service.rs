//! Node service — the hexagonal core.
//!
//! [`NodeService`] owns the pairing machine, the network session, the
//! telemetry publisher, the indicator and the uptime sensor, plus the
//! ports they drive. It is the single writer of all node state: radio and
//! network callbacks reach it as queued events, periodic work arrives
//! through [`TaskDelegate::on_task_due`].
//!
//! ```text
//!  RadioEvent ──▶ ┌──────────────────────────────┐ ──▶ PeripheralRadio
//!    NetEvent ──▶ │          NodeService          │ ──▶ NetworkLink
//!   TaskId due ──▶│ Pairing · Session · Publisher │ ──▶ TelemetryTransport
//!                 └──────────────────────────────┘ ──▶ EventSink (log)
//! ```
//!
//! Every [`NodeEvent`] goes to the local log sink and, as text, to the
//! diagnostics channel. Peripheral notifications are relayed as hex on
//! the `peripheral` channel instead.

use core::fmt::Write;

use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::config::NodeConfig;
use crate::drivers::indicator::Indicator;
use crate::error::ConfigError;
use crate::events::{MAX_NOTIFY_LEN, NetEvent, RadioEvent};
use crate::network::{NetTransition, NetworkSession};
use crate::pairing::PairingMachine;
use crate::pairing::context::PairingNote;
use crate::scheduler::TaskId;
use crate::sensors::uptime::{UPTIME_SUFFIX, UptimeSensor};
use crate::telemetry::{PublisherStats, QoS, TelemetryMessage, TelemetryPublisher};
use crate::util::hex_encode;

use super::events::{NodeEvent, StatusSnapshot};
use super::ports::{
    Clock, EventSink, NetworkLink, PeripheralRadio, TaskDelegate, TelemetryTransport,
};

/// Topic suffix for relayed peripheral notifications.
pub const PERIPHERAL_SUFFIX: &str = "peripheral";
/// Topic suffix for the periodic status snapshot.
pub const STATUS_SUFFIX: &str = "status";

/// Longest diagnostic line sent on the debug channel.
const MAX_DIAG_LEN: usize = 160;

/// The adapters a node runs against.
pub struct NodePorts<R, L, T, P, C, S> {
    pub radio: R,
    pub link: L,
    pub transport: T,
    pub indicator_pin: P,
    pub clock: C,
    /// Local mirror of every node event (serial log in production).
    pub sink: S,
}

/// Publisher and the transport it writes to, kept together so the relay
/// sink can borrow both while the state machines are borrowed elsewhere.
struct Egress<T> {
    publisher: TelemetryPublisher,
    transport: T,
    telemetry_qos: QoS,
}

// ───────────────────────────────────────────────────────────────
// NodeService
// ───────────────────────────────────────────────────────────────

pub struct NodeService<R, L, T, P, C, S>
where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    config: NodeConfig,
    pairing: PairingMachine,
    session: NetworkSession,
    egress: Egress<T>,
    indicator: Indicator<P>,
    sensor: UptimeSensor,
    radio: R,
    link: L,
    clock: C,
    sink: S,
    started: bool,
    maintenance_ticks: u32,
    radio_dropped: u32,
    net_dropped: u32,
    reported_drops: (u32, u32),
}

impl<R, L, T, P, C, S> NodeService<R, L, T, P, C, S>
where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    /// Validate `config` and wire the ports. Nothing starts until
    /// [`start`](Self::start).
    pub fn new(
        config: NodeConfig,
        ports: NodePorts<R, L, T, P, C, S>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let session = NetworkSession::new(
            config.network.retry_ceiling,
            u64::from(config.network.connect_timeout_ms),
        );
        let egress = Egress {
            publisher: TelemetryPublisher::new(&config.device_id, config.telemetry.debug_qos),
            transport: ports.transport,
            telemetry_qos: config.telemetry.telemetry_qos,
        };
        let pairing = PairingMachine::new(config.pairing.clone());
        let indicator = Indicator::new(ports.indicator_pin, config.indicator_enabled);

        Ok(Self {
            config,
            pairing,
            session,
            egress,
            indicator,
            sensor: UptimeSensor::new(),
            radio: ports.radio,
            link: ports.link,
            clock: ports.clock,
            sink: ports.sink,
            started: false,
            maintenance_ticks: 0,
            radio_dropped: 0,
            net_dropped: 0,
            reported_drops: (0, 0),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Begin network association and peripheral discovery.
    pub fn start(&mut self) {
        if self.started {
            debug!("NodeService: already started");
            return;
        }
        self.started = true;
        let now = self.clock.uptime_ms();
        info!("NodeService: starting as '{}'", self.config.device_id);

        let mut relay = Relay {
            egress: &mut self.egress,
            net: &self.session,
            log: &mut self.sink,
        };
        relay.emit(&NodeEvent::Started {
            device_id: &self.config.device_id,
        });

        let t = self
            .session
            .start(self.config.network.credentials.clone(), &mut self.link, now);
        self.report_net(t);
        self.start_pairing();
    }

    /// Stop discovery (releasing any peripheral connection) and drop the
    /// network link.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        let now = self.clock.uptime_ms();
        {
            let mut relay = Relay {
                egress: &mut self.egress,
                net: &self.session,
                log: &mut self.sink,
            };
            self.pairing.stop(now, &mut self.radio, &mut relay);
            relay.emit(&NodeEvent::Stopped);
        }
        let t = self.session.reset(&mut self.link);
        self.report_net(t);
        self.started = false;
    }

    /// Restart discovery after the pairing machine gave up. No-op unless
    /// it is Idle.
    pub fn start_pairing(&mut self) -> bool {
        let now = self.clock.uptime_ms();
        let mut relay = Relay {
            egress: &mut self.egress,
            net: &self.session,
            log: &mut self.sink,
        };
        self.pairing.start(now, &mut self.radio, &mut relay)
    }

    /// Clear a failed network session and associate again.
    pub fn restart_network(&mut self) {
        let now = self.clock.uptime_ms();
        let t = self.session.reset(&mut self.link);
        self.report_net(t);
        let t = self
            .session
            .start(self.config.network.credentials.clone(), &mut self.link, now);
        self.report_net(t);
    }

    // ── Callback events ───────────────────────────────────────

    pub fn handle_radio_event(&mut self, event: RadioEvent) {
        if !self.started {
            debug!("NodeService: radio event before start, ignored");
            return;
        }
        let now = self.clock.uptime_ms();
        let mut relay = Relay {
            egress: &mut self.egress,
            net: &self.session,
            log: &mut self.sink,
        };
        self.pairing.handle(event, now, &mut self.radio, &mut relay);
    }

    pub fn handle_net_event(&mut self, event: NetEvent) {
        if !self.started {
            debug!("NodeService: net event before start, ignored");
            return;
        }
        let now = self.clock.uptime_ms();
        let t = self.session.handle(event, &mut self.link, now);
        self.report_net(t);
    }

    /// Latest totals of events lost to full callback queues. Reported on
    /// the next maintenance tick when they grow.
    pub fn set_queue_drops(&mut self, radio: u32, net: u32) {
        self.radio_dropped = radio;
        self.net_dropped = net;
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn pairing(&self) -> &PairingMachine {
        &self.pairing
    }

    pub fn session(&self) -> &NetworkSession {
        &self.session
    }

    pub fn telemetry_stats(&self) -> PublisherStats {
        self.egress.publisher.stats()
    }

    pub fn indicator(&self) -> &Indicator<P> {
        &self.indicator
    }

    pub fn indicator_mut(&mut self) -> &mut Indicator<P> {
        &mut self.indicator
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Current uptime from the node's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn transport(&self) -> &T {
        &self.egress.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.egress.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    // ── Internal ──────────────────────────────────────────────

    fn report_net(&mut self, transition: Option<NetTransition>) {
        if let Some(t) = transition {
            let mut relay = Relay {
                egress: &mut self.egress,
                net: &self.session,
                log: &mut self.sink,
            };
            relay.emit(&NodeEvent::NetworkChanged(t));
        }
    }

    fn publish_uptime(&mut self) {
        let reading = self.sensor.sample(&self.clock);
        let body = reading.body();
        let msg = TelemetryMessage::new(UPTIME_SUFFIX, &body, self.egress.telemetry_qos);
        self.egress
            .publisher
            .publish(&self.session, &mut self.egress.transport, &msg);
    }

    fn maintain(&mut self, now_ms: u64) {
        self.maintenance_ticks = self.maintenance_ticks.wrapping_add(1);

        if self.started {
            let mut relay = Relay {
                egress: &mut self.egress,
                net: &self.session,
                log: &mut self.sink,
            };
            self.pairing.tick(now_ms, &mut self.radio, &mut relay);

            let t = self.session.poll_timeout(&mut self.link, now_ms);
            self.report_net(t);
        }

        self.report_drops();

        let every = u32::from(self.config.telemetry.status_every);
        if every > 0 && self.maintenance_ticks % every == 0 {
            self.publish_status(now_ms);
        }
    }

    fn report_drops(&mut self) {
        let (radio_seen, net_seen) = self.reported_drops;
        let mut relay = Relay {
            egress: &mut self.egress,
            net: &self.session,
            log: &mut self.sink,
        };
        if self.radio_dropped > radio_seen {
            relay.emit(&NodeEvent::EventsDropped {
                queue: "radio",
                total: self.radio_dropped,
            });
        }
        if self.net_dropped > net_seen {
            relay.emit(&NodeEvent::EventsDropped {
                queue: "net",
                total: self.net_dropped,
            });
        }
        self.reported_drops = (self.radio_dropped, self.net_dropped);
    }

    fn publish_status(&mut self, now_ms: u64) {
        let target = self.pairing.target();
        let snapshot = StatusSnapshot {
            uptime_ms: now_ms,
            network: self.session.state(),
            network_retries: self.session.retries(),
            pairing: self.pairing.state(),
            pairing_retries: self.pairing.retries(),
            peer: target.map(|t| t.address),
            peer_name: target.and_then(|t| t.display_name.as_deref()),
            epoch: self.pairing.epoch(),
            radio_events_dropped: self.radio_dropped,
            net_events_dropped: self.net_dropped,
            telemetry: self.egress.publisher.stats(),
        };
        match serde_json::to_string(&snapshot) {
            Ok(body) => {
                let msg = TelemetryMessage::new(STATUS_SUFFIX, &body, self.egress.telemetry_qos);
                self.egress
                    .publisher
                    .publish(&self.session, &mut self.egress.transport, &msg);
            }
            Err(e) => warn!("NodeService: status encode failed: {}", e),
        }
    }
}

impl<R, L, T, P, C, S> TaskDelegate for NodeService<R, L, T, P, C, S>
where
    R: PeripheralRadio,
    L: NetworkLink,
    T: TelemetryTransport,
    P: OutputPin,
    C: Clock,
    S: EventSink,
{
    fn on_task_due(&mut self, task: TaskId, now_ms: u64) {
        match task {
            TaskId::Indicator => {
                self.indicator.toggle();
            }
            TaskId::Sensor => self.publish_uptime(),
            TaskId::Maintenance => self.maintain(now_ms),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Relay sink
// ───────────────────────────────────────────────────────────────

/// Mirrors each event to the local sink and publishes it as telemetry.
struct Relay<'a, T, S> {
    egress: &'a mut Egress<T>,
    net: &'a NetworkSession,
    log: &'a mut S,
}

impl<T: TelemetryTransport, S: EventSink> EventSink for Relay<'_, T, S> {
    fn emit(&mut self, event: &NodeEvent<'_>) {
        self.log.emit(event);

        if let NodeEvent::Pairing(PairingNote::PeripheralData { data, .. }) = event {
            let body = hex_encode::<{ 2 * MAX_NOTIFY_LEN }>(data);
            let msg = TelemetryMessage::new(PERIPHERAL_SUFFIX, &body, self.egress.telemetry_qos);
            self.egress
                .publisher
                .publish(self.net, &mut self.egress.transport, &msg);
            return;
        }

        let mut text: heapless::String<MAX_DIAG_LEN> = heapless::String::new();
        if write!(text, "{event}").is_err() {
            debug!("NodeService: diagnostic cut to {} bytes", MAX_DIAG_LEN);
        }
        self.egress
            .publisher
            .publish_debug(self.net, &mut self.egress.transport, &text);
    }
}
