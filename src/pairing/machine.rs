//! Pairing machine: the FSM engine plus the loop that applies its output.
//!
//! Every entry point (`start`, `stop`, `handle`, `tick`) runs one step,
//! then reports notes and the transition, then applies queued radio
//! commands. A refused command becomes a follow-up event for the same
//! step, so failures are handled before the entry point returns.

use log::{debug, warn};

use super::context::{PairingContext, RadioCommand};
use super::device::{BdAddr, DeviceRecord};
use super::states::build_state_table;
use super::{ConnectionState, Fsm, PairingEvent};
use crate::app::events::NodeEvent;
use crate::app::ports::{EventSink, PeripheralRadio};
use crate::config::PairingConfig;
use crate::events::RadioEvent;

/// Follow-up events produced within one step.
const MAX_FOLLOW_UPS: usize = 4;

enum Step {
    Event(PairingEvent),
    Tick,
    Force(ConnectionState),
}

pub struct PairingMachine {
    fsm: Fsm,
    ctx: PairingContext,
}

impl PairingMachine {
    pub fn new(config: PairingConfig) -> Self {
        let mut ctx = PairingContext::new(config);
        let mut fsm = Fsm::new(build_state_table(), ConnectionState::Idle);
        fsm.start(&mut ctx);
        Self { fsm, ctx }
    }

    pub fn state(&self) -> ConnectionState {
        self.fsm.current_state()
    }

    /// The promoted record for the current session, if any.
    pub fn target(&self) -> Option<&DeviceRecord> {
        self.ctx.target.as_ref()
    }

    pub fn retries(&self) -> u8 {
        self.ctx.retries
    }

    /// A connection is open or being opened.
    pub fn connection_open(&self) -> bool {
        self.ctx.link_open
    }

    /// Scan epochs started since boot.
    pub fn epoch(&self) -> u32 {
        self.ctx.epoch_count
    }

    pub fn is_rejected(&self, peer: &BdAddr) -> bool {
        self.ctx.is_rejected(peer)
    }

    pub fn config(&self) -> &PairingConfig {
        &self.ctx.config
    }

    /// Begin discovery. Only honoured from Idle; returns whether it ran.
    pub fn start(
        &mut self,
        now_ms: u64,
        radio: &mut impl PeripheralRadio,
        sink: &mut impl EventSink,
    ) -> bool {
        if self.state() != ConnectionState::Idle {
            debug!("PAIR: start ignored in {}", self.state());
            return false;
        }
        self.ctx.retries = 0;
        self.ctx.rejected.clear();
        self.run(Step::Force(ConnectionState::Scanning), now_ms, radio, sink);
        true
    }

    /// Return to Idle from any state, releasing the connection.
    pub fn stop(
        &mut self,
        now_ms: u64,
        radio: &mut impl PeripheralRadio,
        sink: &mut impl EventSink,
    ) {
        self.run(Step::Force(ConnectionState::Idle), now_ms, radio, sink);
    }

    /// Apply one radio callback.
    pub fn handle(
        &mut self,
        event: RadioEvent,
        now_ms: u64,
        radio: &mut impl PeripheralRadio,
        sink: &mut impl EventSink,
    ) {
        self.run(Step::Event(PairingEvent::Radio(event)), now_ms, radio, sink);
    }

    /// Maintenance: timeouts, retries, stall recovery, heartbeat.
    pub fn tick(
        &mut self,
        now_ms: u64,
        radio: &mut impl PeripheralRadio,
        sink: &mut impl EventSink,
    ) {
        self.run(Step::Tick, now_ms, radio, sink);
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn run(
        &mut self,
        first: Step,
        now_ms: u64,
        radio: &mut impl PeripheralRadio,
        sink: &mut impl EventSink,
    ) {
        self.ctx.now_ms = now_ms;
        let mut follow_ups: heapless::Deque<PairingEvent, MAX_FOLLOW_UPS> = heapless::Deque::new();
        let mut step = Some(first);

        while let Some(current) = step.take() {
            let transition = match current {
                Step::Event(ev) => self.fsm.dispatch(&mut self.ctx, &ev),
                Step::Tick => self.fsm.tick(&mut self.ctx),
                Step::Force(next) => self.fsm.force_transition(next, &mut self.ctx),
            };

            while let Some(note) = self.ctx.notes.pop_front() {
                sink.emit(&NodeEvent::Pairing(&note));
            }
            if let Some(t) = transition {
                sink.emit(&NodeEvent::PairingTransition {
                    from: t.from,
                    to: t.to,
                    peer: self.ctx.target_addr(),
                });
            }

            self.apply_commands(radio, sink, &mut follow_ups);

            if transition.is_some_and(|t| t.to == ConnectionState::CandidateFound)
                && follow_ups.push_back(PairingEvent::ConnectRequested).is_err()
            {
                warn!("PAIR: follow-up queue full, connect deferred to next tick");
            }

            step = follow_ups.pop_front().map(Step::Event);
        }
    }

    fn apply_commands<const N: usize>(
        &mut self,
        radio: &mut impl PeripheralRadio,
        sink: &mut impl EventSink,
        follow_ups: &mut heapless::Deque<PairingEvent, N>,
    ) {
        let service = self.ctx.config.target_service;
        let characteristic = self.ctx.config.characteristic;

        while let Some(cmd) = self.ctx.commands.pop_front() {
            let (request, result, on_refused) = match cmd {
                RadioCommand::StopScan => {
                    radio.stop_scan();
                    continue;
                }
                RadioCommand::Disconnect(peer) => {
                    radio.disconnect(&peer);
                    continue;
                }
                // A refused scan is retried by the stall check.
                RadioCommand::StartScan => ("start_scan", radio.start_scan(), None),
                RadioCommand::Connect(peer) => (
                    "connect",
                    radio.connect(&peer),
                    Some(PairingEvent::Radio(RadioEvent::ConnectFailed { peer })),
                ),
                RadioCommand::ResolveServices(peer) => (
                    "resolve_services",
                    radio.resolve_services(&peer, service),
                    Some(PairingEvent::TransferFailed { peer }),
                ),
                RadioCommand::Subscribe(peer) => (
                    "subscribe",
                    radio.subscribe(&peer, service, characteristic),
                    Some(PairingEvent::TransferFailed { peer }),
                ),
                RadioCommand::Heartbeat(peer) => {
                    let payload = self.ctx.config.heartbeat.as_deref().unwrap_or(&[]);
                    (
                        "write",
                        radio.write(&peer, payload),
                        Some(PairingEvent::TransferFailed { peer }),
                    )
                }
            };

            if let Err(error) = result {
                warn!("PAIR: {} refused: {}", request, error);
                sink.emit(&NodeEvent::RadioRequestFailed { request, error });
                if let Some(ev) = on_refused {
                    if follow_ups.push_back(ev).is_err() {
                        warn!("PAIR: follow-up queue full, dropping failure event");
                    }
                }
            }
        }
    }
}
