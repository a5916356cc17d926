//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ NodeService (domain)
//! ```
//!
//! Driven adapters (radio, network link, telemetry transport, clock) implement
//! these traits. The [`NodeService`](super::service::NodeService) consumes them
//! via generics, so the domain core never touches hardware directly.
//!
//! Command-side ports (`PeripheralRadio`, `NetworkLink`) return quickly: they
//! *request* an operation and the outcome arrives later as a callback event.
//! Callback-side capability (`RadioCallbacks`) is implemented once, by the
//! event queue, and handed to each platform's radio shim.

use crate::error::{LinkError, RadioError, TransportError};
use crate::network::Credentials;
use crate::pairing::device::{BdAddr, DeviceRecord, ServiceId};
use crate::scheduler::TaskId;
use crate::telemetry::QoS;

// ───────────────────────────────────────────────────────────────
// Peripheral radio (domain → radio stack)
// ───────────────────────────────────────────────────────────────

/// Requests issued by the pairing machine. Every call is non-blocking; a
/// returned `Err` means the stack refused the request outright.
pub trait PeripheralRadio {
    /// Begin a scan epoch. Sightings arrive as `DeviceObserved`, the end
    /// of the window as `ScanComplete`.
    fn start_scan(&mut self) -> Result<(), RadioError>;

    /// Stop scanning. Safe to call when not scanning.
    fn stop_scan(&mut self);

    /// Open a connection to `peer`.
    fn connect(&mut self, peer: &BdAddr) -> Result<(), RadioError>;

    /// Start service discovery on the open connection.
    fn resolve_services(&mut self, peer: &BdAddr, target: ServiceId) -> Result<(), RadioError>;

    /// Enable notifications on `characteristic` within `service`.
    fn subscribe(
        &mut self,
        peer: &BdAddr,
        service: ServiceId,
        characteristic: ServiceId,
    ) -> Result<(), RadioError>;

    /// Write to the subscribed characteristic.
    fn write(&mut self, peer: &BdAddr, data: &[u8]) -> Result<(), RadioError>;

    /// Tear down any connection (open or pending) to `peer`. Idempotent.
    fn disconnect(&mut self, peer: &BdAddr);
}

// ───────────────────────────────────────────────────────────────
// Radio callbacks (radio stack → event queue)
// ───────────────────────────────────────────────────────────────

/// The one callback capability every platform radio shim drives.
/// Methods take `&self` because they run on the stack's own task.
pub trait RadioCallbacks {
    fn on_device_observed(&self, record: DeviceRecord);
    fn on_scan_complete(&self);
    /// `ok == false` reports a failed open.
    fn on_connected(&self, peer: BdAddr, ok: bool);
    fn on_disconnected(&self, peer: BdAddr);
    /// `None` reports discovery finished without the target service.
    fn on_service_resolved(&self, peer: BdAddr, service: Option<ServiceId>);
    fn on_notification(&self, peer: BdAddr, data: &[u8]);
}

// ───────────────────────────────────────────────────────────────
// Network link (domain → WiFi driver)
// ───────────────────────────────────────────────────────────────

/// Station-mode link. Up/down is reported through `NetEvent`s.
pub trait NetworkLink {
    /// Begin association with `creds`. Returns once the request is issued.
    fn connect(&mut self, creds: &Credentials) -> Result<(), LinkError>;

    /// Drop the association and stop any driver-side reconnect.
    fn disconnect(&mut self);
}

/// Readiness gate consumed by the telemetry publisher.
pub trait LinkStatus {
    fn is_ready(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Telemetry transport (domain → collector)
// ───────────────────────────────────────────────────────────────

/// Hands one message to the wire. Must not block beyond a bounded timeout.
pub trait TelemetryTransport {
    fn send(&mut self, channel: &str, body: &str, qos: QoS) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.
pub trait Clock {
    fn uptime_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`NodeEvent`](super::events::NodeEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::NodeEvent<'_>);
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate
// ───────────────────────────────────────────────────────────────

/// Receives periodic task activations from the [`Scheduler`](crate::scheduler::Scheduler).
pub trait TaskDelegate {
    fn on_task_due(&mut self, task: TaskId, now_ms: u64);
}
