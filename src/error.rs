//! Unified error types for the sensor node firmware.
//!
//! A single `Error` enum that every subsystem converts into, so `main`
//! handles startup failures uniformly. All variants are `Copy` so they
//! travel through ports and state machines without allocation.
//!
//! Runtime failures inside the pairing and network state machines are
//! NOT surfaced through these types to callers; they become transitions
//! and diagnostic telemetry. These errors describe what a port call
//! reported, or why startup was refused.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration rejected at startup.
    Config(ConfigError),
    /// The peripheral radio refused or failed a request.
    Radio(RadioError),
    /// The network link driver refused or failed a request.
    Link(LinkError),
    /// The telemetry transport failed to hand off a message.
    Transport(TransportError),
    /// Peripheral or driver initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Device identifier is empty.
    MissingDeviceId,
    /// Device identifier contains a channel separator or non-printable byte.
    InvalidDeviceId,
    /// SSID must be 1-32 printable ASCII bytes.
    InvalidSsid,
    /// Password must be empty (open network) or 8-64 bytes.
    InvalidPassword,
    /// Collector host is empty.
    MissingEndpoint,
    /// Collector port is zero.
    InvalidPort,
    /// Peripheral signature cannot match anything.
    InvalidSignature,
    /// A retry ceiling of zero would fail-stop before the first attempt.
    InvalidRetryCeiling,
    /// A task period or timeout is zero.
    InvalidTiming(&'static str),
    /// Heartbeat payload is empty.
    InvalidHeartbeat,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDeviceId => write!(f, "device id missing"),
            Self::InvalidDeviceId => {
                write!(f, "device id must be printable ASCII without '/', '+' or '#'")
            }
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes, or empty for open)")
            }
            Self::MissingEndpoint => write!(f, "collector endpoint missing"),
            Self::InvalidPort => write!(f, "collector port must be non-zero"),
            Self::InvalidSignature => write!(f, "peripheral signature invalid"),
            Self::InvalidRetryCeiling => write!(f, "retry ceiling must be at least 1"),
            Self::InvalidTiming(what) => write!(f, "{what} must be non-zero"),
            Self::InvalidHeartbeat => write!(f, "heartbeat payload must not be empty"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// Controller or host stack not initialised.
    StackUnavailable,
    /// Scan could not be started.
    ScanFailed,
    /// Connection request rejected by the stack.
    ConnectFailed,
    /// No open connection to the addressed peer.
    NotConnected,
    /// Service discovery could not be started.
    DiscoveryFailed,
    /// Characteristic lookup or notification registration failed.
    SubscribeFailed,
    /// Outbound write rejected.
    WriteFailed,
    /// Raw `esp_err_t` from the IDF stack.
    Esp(i32),
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnavailable => write!(f, "radio stack unavailable"),
            Self::ScanFailed => write!(f, "scan start failed"),
            Self::ConnectFailed => write!(f, "connect request failed"),
            Self::NotConnected => write!(f, "peer not connected"),
            Self::DiscoveryFailed => write!(f, "service discovery failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::Esp(code) => write!(f, "esp_err {code}"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Network link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Connect issued without credentials.
    NoCredentials,
    /// Driver rejected the station configuration.
    ConfigRejected,
    /// Driver refused to start the association.
    ConnectFailed,
    /// Raw `esp_err_t` from the IDF stack.
    Esp(i32),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no network credentials"),
            Self::ConfigRejected => write!(f, "station configuration rejected"),
            Self::ConnectFailed => write!(f, "connect request failed"),
            Self::Esp(code) => write!(f, "esp_err {code}"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Telemetry transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Collector endpoint did not resolve to an address.
    Unresolvable,
    /// Local socket or client could not be created.
    SocketFailed,
    /// Send or enqueue was rejected.
    SendFailed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolvable => write!(f, "collector endpoint unresolvable"),
            Self::SocketFailed => write!(f, "socket setup failed"),
            Self::SendFailed => write!(f, "send failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
