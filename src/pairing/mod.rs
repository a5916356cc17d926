//! Peripheral discovery and pairing.
//!
//! Function-pointer state machine driven by radio callback events and the
//! maintenance tick:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                     │
//! │  ┌───────────────────┬──────────┬─────────┬──────────┬─────────┐│
//! │  │ ConnectionState   │ on_enter │ on_exit │ on_event │ on_tick ││
//! │  ├───────────────────┼──────────┼─────────┼──────────┼─────────┤│
//! │  │ Idle              │ fn(ctx)  │    -    │ fn(ctx,e)│ fn(ctx) ││
//! │  │ Scanning          │ fn(ctx)  │ fn(ctx) │ fn(ctx,e)│ fn(ctx) ││
//! │  │ ...               │          │         │          │         ││
//! │  └───────────────────┴──────────┴─────────┴──────────┴─────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers never call the radio. They queue [`context::RadioCommand`]s
//! and [`context::PairingNote`]s on the [`context::PairingContext`]; the
//! [`PairingMachine`] applies the commands after each step and turns a
//! refused command back into the matching failure event.

pub mod adv;
pub mod context;
pub mod device;
pub mod machine;
pub mod states;

use core::fmt;

use log::info;
use serde::Serialize;

use crate::events::RadioEvent;
use context::PairingContext;
use device::BdAddr;

pub use machine::PairingMachine;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Pairing lifecycle state. Must stay in sync with
/// [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Scanning = 1,
    CandidateFound = 2,
    Connecting = 3,
    ResolvingServices = 4,
    Subscribed = 5,
    Disconnected = 6,
}

impl ConnectionState {
    pub const COUNT: usize = 7;

    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Scanning,
            2 => Self::CandidateFound,
            3 => Self::Connecting,
            4 => Self::ResolvingServices,
            5 => Self::Subscribed,
            6 => Self::Disconnected,
            _ => {
                debug_assert!(false, "invalid pairing state index: {idx}");
                Self::Idle
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::CandidateFound => "CandidateFound",
            Self::Connecting => "Connecting",
            Self::ResolvingServices => "ResolvingServices",
            Self::Subscribed => "Subscribed",
            Self::Disconnected => "Disconnected",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    /// Stop (any -> Idle) is always allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, Scanning)
                | (Scanning, CandidateFound)
                | (CandidateFound, Connecting)
                | (Connecting, ResolvingServices)
                | (Connecting, Disconnected)
                | (ResolvingServices, Subscribed)
                | (ResolvingServices, Disconnected)
                | (Subscribed, Disconnected)
                | (Disconnected, Scanning)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything a state handler can react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    Radio(RadioEvent),
    /// Issued by the machine right after a candidate is promoted.
    ConnectRequested,
    /// Subscribe or write was refused on an open link.
    TransferFailed { peer: BdAddr },
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

pub type StateActionFn = fn(&mut PairingContext);

/// Returns `Some(next)` to trigger a transition.
pub type StateEventFn = fn(&mut PairingContext, &PairingEvent) -> Option<ConnectionState>;

/// Maintenance-tick handler. Timeouts and retries live here.
pub type StateTickFn = fn(&mut PairingContext) -> Option<ConnectionState>;

/// One row in the state table.
pub struct StateDescriptor {
    pub id: ConnectionState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_event: StateEventFn,
    pub on_tick: StateTickFn,
}

/// A completed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    table: [StateDescriptor; ConnectionState::COUNT],
    current: usize,
    transitions: u32,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; ConnectionState::COUNT], initial: ConnectionState) -> Self {
        Self {
            table,
            current: initial as usize,
            transitions: 0,
        }
    }

    /// Run the initial `on_enter`. Call once after construction.
    pub fn start(&mut self, ctx: &mut PairingContext) {
        info!("PAIR: starting in {}", self.table[self.current].name);
        ctx.state_entered_ms = ctx.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Offer one event to the current state.
    pub fn dispatch(
        &mut self,
        ctx: &mut PairingContext,
        event: &PairingEvent,
    ) -> Option<Transition> {
        let next = (self.table[self.current].on_event)(ctx, event)?;
        self.transition(next, ctx)
    }

    /// Run the current state's maintenance handler.
    pub fn tick(&mut self, ctx: &mut PairingContext) -> Option<Transition> {
        let next = (self.table[self.current].on_tick)(ctx)?;
        self.transition(next, ctx)
    }

    /// Transition regardless of what the handlers would decide.
    pub fn force_transition(
        &mut self,
        next: ConnectionState,
        ctx: &mut PairingContext,
    ) -> Option<Transition> {
        self.transition(next, ctx)
    }

    pub fn current_state(&self) -> ConnectionState {
        self.table[self.current].id
    }

    /// Completed transitions since construction.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    fn transition(
        &mut self,
        next: ConnectionState,
        ctx: &mut PairingContext,
    ) -> Option<Transition> {
        let from = self.current_state();
        if next == from {
            return None;
        }
        debug_assert!(
            from.can_transition_to(next),
            "illegal pairing edge {from} -> {next}"
        );

        info!("PAIR transition: {} -> {}", from, next);

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next as usize;
        self.transitions = self.transitions.wrapping_add(1);
        ctx.state_entered_ms = ctx.now_ms;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
        Some(Transition { from, to: next })
    }
}
