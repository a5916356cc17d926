//! Telemetry publisher.
//!
//! Formats `(channel, body, qos)` triples and hands them to a
//! [`TelemetryTransport`]. Delivery is best-effort and fire-and-forget:
//!
//! - while the network is not ready a publish is a silent drop, with no
//!   queueing and no transport call;
//! - transport failures are logged and counted, never returned;
//! - bodies longer than [`MAX_BODY_LEN`] are cut at a UTF-8 boundary.
//!
//! Channel names are `{device_id}/{suffix}`; diagnostics use the
//! [`DEBUG_SUFFIX`] suffix.

use core::fmt::Write;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{LinkStatus, TelemetryTransport};

/// Upper bound on a message body in bytes.
pub const MAX_BODY_LEN: usize = 1024;
/// Upper bound on a topic suffix in bytes.
pub const MAX_SUFFIX_LEN: usize = 32;
/// Device id + '/' + suffix.
pub const MAX_CHANNEL_LEN: usize = 32 + 1 + MAX_SUFFIX_LEN;

/// Literal suffix carrying free-text diagnostics.
pub const DEBUG_SUFFIX: &str = "debug";

pub type Channel = heapless::String<MAX_CHANNEL_LEN>;

// ── Quality of service ────────────────────────────────────────

/// Requested delivery guarantee, as understood by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum QoS {
    /// Best effort: may be lost.
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(other),
        }
    }
}

// ── Message ───────────────────────────────────────────────────

/// One outbound telemetry item. Borrowed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryMessage<'a> {
    pub topic_suffix: &'a str,
    pub body: &'a str,
    pub qos: QoS,
}

impl<'a> TelemetryMessage<'a> {
    pub fn new(topic_suffix: &'a str, body: &'a str, qos: QoS) -> Self {
        Self {
            topic_suffix,
            body,
            qos,
        }
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn suffix_is_valid(suffix: &str) -> bool {
    !suffix.is_empty()
        && suffix.len() <= MAX_SUFFIX_LEN
        && !suffix.contains(['/', '+', '#'])
        && suffix.bytes().all(|b| (0x21..=0x7E).contains(&b))
}

// ── Publisher ─────────────────────────────────────────────────

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    /// Handed to the transport successfully.
    pub sent: u32,
    /// Dropped because the network was not ready.
    pub dropped_not_ready: u32,
    /// Dropped because the suffix was unusable.
    pub dropped_invalid: u32,
    /// Transport reported failure.
    pub failed: u32,
    /// Body was cut to fit.
    pub truncated: u32,
}

pub struct TelemetryPublisher {
    device_id: heapless::String<32>,
    debug_qos: QoS,
    stats: PublisherStats,
}

impl TelemetryPublisher {
    /// `device_id` longer than 32 bytes is cut; config validation keeps
    /// that from happening in practice.
    pub fn new(device_id: &str, debug_qos: QoS) -> Self {
        let mut id = heapless::String::new();
        let _ = id.push_str(truncate_utf8(device_id, 32));
        Self {
            device_id: id,
            debug_qos,
            stats: PublisherStats::default(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn stats(&self) -> PublisherStats {
        self.stats
    }

    /// Build `{device_id}/{suffix}`.
    pub fn channel(&self, suffix: &str) -> Option<Channel> {
        if !suffix_is_valid(suffix) {
            return None;
        }
        let mut ch = Channel::new();
        write!(ch, "{}/{}", self.device_id, suffix).ok()?;
        Some(ch)
    }

    /// Publish one message. Silent no-op while `net` is not ready.
    pub fn publish(
        &mut self,
        net: &impl LinkStatus,
        transport: &mut impl TelemetryTransport,
        msg: &TelemetryMessage<'_>,
    ) {
        if !net.is_ready() {
            self.stats.dropped_not_ready = self.stats.dropped_not_ready.wrapping_add(1);
            return;
        }

        let Some(channel) = self.channel(msg.topic_suffix) else {
            warn!("TELEM: invalid topic suffix '{}', dropped", msg.topic_suffix);
            self.stats.dropped_invalid = self.stats.dropped_invalid.wrapping_add(1);
            return;
        };

        let body = truncate_utf8(msg.body, MAX_BODY_LEN);
        if body.len() < msg.body.len() {
            debug!("TELEM: body truncated {} -> {} bytes", msg.body.len(), body.len());
            self.stats.truncated = self.stats.truncated.wrapping_add(1);
        }

        match transport.send(&channel, body, msg.qos) {
            Ok(()) => self.stats.sent = self.stats.sent.wrapping_add(1),
            Err(e) => {
                warn!("TELEM: send on '{}' failed: {}", channel, e);
                self.stats.failed = self.stats.failed.wrapping_add(1);
            }
        }
    }

    /// Publish free text on the diagnostics channel.
    pub fn publish_debug(
        &mut self,
        net: &impl LinkStatus,
        transport: &mut impl TelemetryTransport,
        text: &str,
    ) {
        let msg = TelemetryMessage::new(DEBUG_SUFFIX, text, self.debug_qos);
        self.publish(net, transport, &msg);
    }
}
