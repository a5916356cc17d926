//! Outbound node events.
//!
//! The pairing machine and the [`NodeService`](super::service::NodeService)
//! emit these through the [`EventSink`](super::ports::EventSink) port.
//! Adapters decide where they go: the serial log, the diagnostics
//! channel, or both.

use core::fmt;

use serde::Serialize;

use crate::error::RadioError;
use crate::network::{NetTransition, NetworkState};
use crate::pairing::ConnectionState;
use crate::pairing::context::PairingNote;
use crate::pairing::device::BdAddr;
use crate::telemetry::PublisherStats;

/// Structured events emitted by the node core. Borrowed, never stored.
#[derive(Debug, Clone, Copy)]
pub enum NodeEvent<'a> {
    /// The service started its state machines.
    Started { device_id: &'a str },
    Stopped,
    /// The pairing machine changed state.
    PairingTransition {
        from: ConnectionState,
        to: ConnectionState,
        peer: Option<BdAddr>,
    },
    /// Pairing detail that is not a state change.
    Pairing(&'a PairingNote),
    /// The radio stack refused a request outright.
    RadioRequestFailed {
        request: &'static str,
        error: RadioError,
    },
    NetworkChanged(NetTransition),
    /// A callback queue overflowed since the last report.
    EventsDropped { queue: &'static str, total: u32 },
}

impl fmt::Display for NodeEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { device_id } => write!(f, "START {device_id}"),
            Self::Stopped => f.write_str("STOP"),
            Self::PairingTransition { from, to, peer } => {
                write!(f, "PAIR {from} -> {to}")?;
                if let Some(peer) = peer {
                    write!(f, " peer={peer}")?;
                }
                Ok(())
            }
            Self::Pairing(note) => write!(f, "PAIR {note}"),
            Self::RadioRequestFailed { request, error } => {
                write!(f, "RADIO {request} refused: {error}")
            }
            Self::NetworkChanged(t) => {
                write!(f, "NET {} -> {} retries={}", t.from, t.to, t.retries)
            }
            Self::EventsDropped { queue, total } => {
                write!(f, "QUEUE {queue} dropped {total} events")
            }
        }
    }
}

/// Periodic status report, published as JSON on the `status` channel.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot<'a> {
    pub uptime_ms: u64,
    pub network: NetworkState,
    pub network_retries: u8,
    pub pairing: ConnectionState,
    pub pairing_retries: u8,
    pub peer: Option<BdAddr>,
    pub peer_name: Option<&'a str>,
    pub epoch: u32,
    pub radio_events_dropped: u32,
    pub net_events_dropped: u32,
    pub telemetry: PublisherStats,
}
