//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every [`NodeEvent`] to the serial
//! logger, which is the node's only local observability. Severity follows
//! the event: failures warn, routine transitions are info, peripheral
//! payloads are debug.

use log::{debug, info, warn};

use crate::app::events::NodeEvent;
use crate::app::ports::EventSink;
use crate::network::NetworkState;
use crate::pairing::context::PairingNote;

/// Adapter that logs every [`NodeEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged since boot.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &NodeEvent<'_>) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            NodeEvent::Pairing(PairingNote::PeripheralData { .. }) => debug!("EVENT | {}", event),
            NodeEvent::Pairing(
                PairingNote::RetriesExhausted { .. }
                | PairingNote::ServiceMissing { .. }
                | PairingNote::ConnectTimedOut { .. }
                | PairingNote::ResolveTimedOut { .. }
                | PairingNote::UnexpectedConnection { .. },
            )
            | NodeEvent::RadioRequestFailed { .. }
            | NodeEvent::EventsDropped { .. } => warn!("EVENT | {}", event),
            NodeEvent::NetworkChanged(t) if t.to == NetworkState::Failed => {
                warn!("EVENT | {}", event);
            }
            _ => info!("EVENT | {}", event),
        }
    }
}
