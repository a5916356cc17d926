//! UDP datagram telemetry transport.
//!
//! One datagram per message, `"{channel}: {body}\n"`, sent to the
//! collector endpoint. The whole datagram fits [`MAX_DATAGRAM_LEN`], the
//! collector's receive buffer: the body is cut at a UTF-8 boundary to leave
//! room for the framing. QoS has no meaning over UDP and is ignored.
//!
//! A literal IP host is used as is. A hostname is resolved lazily on the
//! first send after the link comes up, since DNS is unavailable before
//! that. Lookups block the calling task, so a failed one is not repeated
//! until [`RESOLVE_BACKOFF`] has passed.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::app::ports::TelemetryTransport;
use crate::config::CollectorEndpoint;
use crate::error::TransportError;
use crate::telemetry::{MAX_BODY_LEN, QoS, truncate_utf8};

/// Collector receive buffer size.
pub const MAX_DATAGRAM_LEN: usize = MAX_BODY_LEN;

/// Minimum spacing between hostname lookups. One maintenance period.
pub const RESOLVE_BACKOFF: Duration = Duration::from_millis(2000);

pub struct UdpTransport {
    socket: UdpSocket,
    endpoint: CollectorEndpoint,
    target: Option<SocketAddr>,
    /// Host is an IP address; never looked up.
    literal: bool,
    /// Cached address failed a send and should be looked up again.
    stale: bool,
    last_lookup: Option<Instant>,
    backoff: Duration,
    lookups: u32,
    buf: Vec<u8>,
    sent: u32,
    truncated: u32,
}

impl UdpTransport {
    /// Bind an ephemeral local port. Hostnames are not resolved yet.
    pub fn new(endpoint: CollectorEndpoint) -> Result<Self, TransportError> {
        Self::with_resolve_backoff(endpoint, RESOLVE_BACKOFF)
    }

    pub fn with_resolve_backoff(
        endpoint: CollectorEndpoint,
        backoff: Duration,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| {
            warn!("TELEM: UDP bind failed: {}", e);
            TransportError::SocketFailed
        })?;
        socket.set_nonblocking(true).map_err(|_| TransportError::SocketFailed)?;
        info!(
            "TELEM: UDP transport for {}:{}",
            endpoint.host, endpoint.port
        );
        let target = endpoint
            .host
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, endpoint.port));
        Ok(Self {
            socket,
            literal: target.is_some(),
            target,
            endpoint,
            stale: false,
            last_lookup: None,
            backoff,
            lookups: 0,
            buf: Vec::with_capacity(MAX_DATAGRAM_LEN),
            sent: 0,
            truncated: 0,
        })
    }

    /// Datagrams handed to the socket.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Hostname lookups performed.
    pub fn lookups(&self) -> u32 {
        self.lookups
    }

    /// Bodies cut to fit the datagram.
    pub fn truncated(&self) -> u32 {
        self.truncated
    }

    fn resolve(&mut self) -> Result<SocketAddr, TransportError> {
        if self.literal || (self.target.is_some() && !self.stale) {
            return self.target.ok_or(TransportError::Unresolvable);
        }
        let due = self
            .last_lookup
            .is_none_or(|at| at.elapsed() >= self.backoff);
        if !due {
            // Keep using a stale address until the next lookup is allowed.
            return self.target.ok_or(TransportError::Unresolvable);
        }

        self.last_lookup = Some(Instant::now());
        self.lookups = self.lookups.wrapping_add(1);
        let found = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next());
        match found {
            Some(addr) => {
                debug!("TELEM: collector resolved to {}", addr);
                self.target = Some(addr);
                self.stale = false;
                Ok(addr)
            }
            None => {
                warn!(
                    "TELEM: cannot resolve '{}', next lookup in {}ms",
                    self.endpoint.host,
                    self.backoff.as_millis()
                );
                self.target.ok_or(TransportError::Unresolvable)
            }
        }
    }
}

/// `"{channel}: {body}\n"` into `buf`, at most `max` bytes. The body is
/// cut at a char boundary so the framing always survives. Returns whether
/// the body was cut.
pub fn frame_datagram(buf: &mut Vec<u8>, channel: &str, body: &str, max: usize) -> bool {
    let room = max.saturating_sub(channel.len() + 3);
    let fitted = truncate_utf8(body, room);
    buf.clear();
    buf.extend_from_slice(channel.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(fitted.as_bytes());
    buf.push(b'\n');
    buf.truncate(max);
    fitted.len() < body.len()
}

impl TelemetryTransport for UdpTransport {
    fn send(&mut self, channel: &str, body: &str, _qos: QoS) -> Result<(), TransportError> {
        let target = self.resolve()?;
        if frame_datagram(&mut self.buf, channel, body, MAX_DATAGRAM_LEN) {
            self.truncated = self.truncated.wrapping_add(1);
            debug!("TELEM: {} body cut to fit the datagram", channel);
        }
        match self.socket.send_to(&self.buf, target) {
            Ok(_) => {
                self.sent = self.sent.wrapping_add(1);
                Ok(())
            }
            Err(e) => {
                // The address may have moved; look it up again when allowed.
                if e.kind() != std::io::ErrorKind::WouldBlock {
                    self.stale = !self.literal;
                }
                debug!("TELEM: UDP send failed: {}", e);
                Err(TransportError::SendFailed)
            }
        }
    }
}
