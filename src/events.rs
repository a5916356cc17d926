//! Callback event queues.
//!
//! Radio and network stacks deliver callbacks on their own tasks. Those
//! callbacks never touch node state; they translate the stack event into
//! a [`RadioEvent`] or [`NetEvent`] and push it here. The runtime is the
//! single consumer and applies events one at a time.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GAP / GATTC  │────▶│ RADIO_EVENTS │────▶│              │
//! │ callbacks    │     └──────────────┘     │  Runtime     │
//! │              │     ┌──────────────┐     │  (consumer)  │
//! │ WiFi / IP    │────▶│  NET_EVENTS  │────▶│              │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! A full queue drops the newest event and counts it. The state machines
//! recover from lost callbacks through their maintenance timeouts.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::app::ports::RadioCallbacks;
use crate::pairing::device::{BdAddr, DeviceRecord, ServiceId};

/// Largest notification payload relayed from the peripheral.
pub const MAX_NOTIFY_LEN: usize = 64;

/// Depth of the radio callback queue.
pub const RADIO_QUEUE_DEPTH: usize = 16;
/// Depth of the network callback queue.
pub const NET_QUEUE_DEPTH: usize = 8;

// ── Event types ───────────────────────────────────────────────

/// Asynchronous notifications from the peripheral radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    /// One advertising report or inquiry result.
    DeviceObserved(DeviceRecord),
    /// The scan window elapsed; the epoch is over.
    ScanComplete,
    Connected { peer: BdAddr },
    ConnectFailed { peer: BdAddr },
    /// A service was found during resolution.
    ServiceFound { peer: BdAddr, service: ServiceId },
    /// Resolution finished without the expected service.
    ServiceNotFound { peer: BdAddr },
    /// The link dropped (remote, supervision timeout, or local teardown).
    LinkLost { peer: BdAddr },
    /// Inbound data on the subscribed characteristic.
    Notification {
        peer: BdAddr,
        data: heapless::Vec<u8, MAX_NOTIFY_LEN>,
    },
}

/// Asynchronous notifications from the network link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEvent {
    /// Associated and addressed; the transport may be used.
    LinkUp,
    /// Association or address lost.
    LinkDown,
}

// ── Queue ─────────────────────────────────────────────────────

/// Bounded multi-producer queue drained by a single consumer.
pub struct EventQueue<T, const N: usize> {
    chan: Channel<CriticalSectionRawMutex, T, N>,
    dropped: AtomicU32,
}

pub type RadioQueue = EventQueue<RadioEvent, RADIO_QUEUE_DEPTH>;
pub type NetQueue = EventQueue<NetEvent, NET_QUEUE_DEPTH>;

/// Radio callbacks → runtime.
pub static RADIO_EVENTS: RadioQueue = EventQueue::new();
/// Network callbacks → runtime.
pub static NET_EVENTS: NetQueue = EventQueue::new();

impl<T, const N: usize> EventQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            chan: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push from any context. Returns `false` if the queue was full and
    /// the event was dropped.
    pub fn push(&self, event: T) -> bool {
        if self.chan.try_send(event).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Pop the oldest event, if any.
    pub fn pop(&self) -> Option<T> {
        self.chan.try_receive().ok()
    }

    /// Drain all pending events in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(T)) {
        while let Some(event) = self.pop() {
            handler(event);
        }
    }

    /// Wait for the next event.
    pub async fn next(&self) -> T {
        self.chan.receive().await
    }

    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    /// Events lost to a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T, const N: usize> Default for EventQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Callback capability ───────────────────────────────────────

impl<const N: usize> RadioCallbacks for EventQueue<RadioEvent, N> {
    fn on_device_observed(&self, record: DeviceRecord) {
        self.push(RadioEvent::DeviceObserved(record));
    }

    fn on_scan_complete(&self) {
        self.push(RadioEvent::ScanComplete);
    }

    fn on_connected(&self, peer: BdAddr, ok: bool) {
        if ok {
            self.push(RadioEvent::Connected { peer });
        } else {
            self.push(RadioEvent::ConnectFailed { peer });
        }
    }

    fn on_disconnected(&self, peer: BdAddr) {
        self.push(RadioEvent::LinkLost { peer });
    }

    fn on_service_resolved(&self, peer: BdAddr, service: Option<ServiceId>) {
        match service {
            Some(service) => self.push(RadioEvent::ServiceFound { peer, service }),
            None => self.push(RadioEvent::ServiceNotFound { peer }),
        };
    }

    fn on_notification(&self, peer: BdAddr, data: &[u8]) {
        let mut buf = heapless::Vec::new();
        let n = data.len().min(MAX_NOTIFY_LEN);
        let _ = buf.extend_from_slice(&data[..n]);
        self.push(RadioEvent::Notification { peer, data: buf });
    }
}
