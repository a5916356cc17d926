//! Node configuration.
//!
//! The core receives one [`NodeConfig`] value and never parses raw
//! configuration formats itself. [`NodeConfig::validate`] runs before any
//! task starts; a rejected configuration is fatal.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::network::Credentials;
use crate::pairing::device::{PeripheralSignature, ServiceId};
use crate::telemetry::QoS;
use crate::util::is_printable_ascii;

/// Largest heartbeat payload written to the peripheral.
pub const MAX_HEARTBEAT_LEN: usize = 20;

/// BLE-MIDI packet carrying a single Active Sensing (0xFE) message.
const MIDI_ACTIVE_SENSING: [u8; 3] = [0x80, 0x80, 0xFE];

/// Core node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Prefix of every telemetry channel.
    pub device_id: heapless::String<32>,
    pub network: NetworkConfig,
    pub telemetry: TelemetryConfig,
    pub pairing: PairingConfig,
    pub timing: TimingConfig,
    /// Drive the indicator line. When false it is held low.
    pub indicator_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub credentials: Credentials,
    pub collector: CollectorEndpoint,
    /// Consecutive link failures before the session fail-stops.
    pub retry_ceiling: u8,
    /// Upper bound on one association attempt.
    pub connect_timeout_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollectorEndpoint {
    /// Hostname or dotted IPv4 address.
    pub host: heapless::String<64>,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// QoS for structured telemetry (uptime, peripheral data, status).
    pub telemetry_qos: QoS,
    /// QoS for free-text diagnostics.
    pub debug_qos: QoS,
    /// Publish a status snapshot every N maintenance ticks. 0 disables it.
    pub status_every: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingConfig {
    /// How the target peripheral is recognised in scan results.
    pub signature: PeripheralSignature,
    /// Service that must be found during resolution.
    pub target_service: ServiceId,
    /// Characteristic subscribed to (and written) within `target_service`.
    pub characteristic: ServiceId,
    /// Consecutive pairing failures before the machine returns to Idle.
    pub retry_ceiling: u8,
    pub connect_timeout_ms: u32,
    pub resolve_timeout_ms: u32,
    /// Restart the scan when nothing was heard for this long.
    pub scan_stall_ms: u32,
    /// Written on every maintenance tick while subscribed.
    pub heartbeat: Option<heapless::Vec<u8, MAX_HEARTBEAT_LEN>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub indicator_period_ms: u32,
    pub sensor_period_ms: u32,
    /// Discovery and session maintenance.
    pub maintenance_period_ms: u32,
}

// ── Defaults ──────────────────────────────────────────────────

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            telemetry_qos: QoS::AtMostOnce,
            debug_qos: QoS::AtMostOnce,
            status_every: 15, // 30 s at the default maintenance period
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            signature: PeripheralSignature::Service(ServiceId::MIDI),
            target_service: ServiceId::MIDI,
            characteristic: ServiceId::MIDI_IO,
            retry_ceiling: 3,
            connect_timeout_ms: 10_000,
            resolve_timeout_ms: 10_000,
            scan_stall_ms: 30_000,
            heartbeat: heapless::Vec::from_slice(&MIDI_ACTIVE_SENSING).ok(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            indicator_period_ms: 500,
            sensor_period_ms: 1000,
            maintenance_period_ms: 2000,
        }
    }
}

/// Everything except the site-specific network identity, which must be
/// supplied before the configuration validates.
impl Default for NodeConfig {
    fn default() -> Self {
        let mut device_id = heapless::String::new();
        let _ = device_id.push_str("sensornode");
        Self {
            device_id,
            network: NetworkConfig {
                retry_ceiling: 3,
                connect_timeout_ms: 15_000,
                ..NetworkConfig::default()
            },
            telemetry: TelemetryConfig::default(),
            pairing: PairingConfig::default(),
            timing: TimingConfig::default(),
            indicator_enabled: true,
        }
    }
}

// ── Validation ────────────────────────────────────────────────

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device_id)?;
        self.network.credentials.validate()?;

        if self.network.collector.host.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.network.collector.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.network.retry_ceiling == 0 || self.pairing.retry_ceiling == 0 {
            return Err(ConfigError::InvalidRetryCeiling);
        }

        let nonzero = [
            (self.network.connect_timeout_ms, "network connect timeout"),
            (self.pairing.connect_timeout_ms, "peripheral connect timeout"),
            (self.pairing.resolve_timeout_ms, "service resolve timeout"),
            (self.pairing.scan_stall_ms, "scan stall window"),
            (self.timing.indicator_period_ms, "indicator period"),
            (self.timing.sensor_period_ms, "sensor period"),
            (self.timing.maintenance_period_ms, "maintenance period"),
        ];
        if let Some((_, what)) = nonzero.iter().find(|(v, _)| *v == 0) {
            return Err(ConfigError::InvalidTiming(what));
        }

        match &self.pairing.signature {
            PeripheralSignature::Service(id) if id.0 == 0 => {
                return Err(ConfigError::InvalidSignature);
            }
            PeripheralSignature::ClassAndName { name: Some(n) } if n.is_empty() => {
                return Err(ConfigError::InvalidSignature);
            }
            _ => {}
        }
        if self.pairing.target_service.0 == 0 || self.pairing.characteristic.0 == 0 {
            return Err(ConfigError::InvalidSignature);
        }

        if self.pairing.heartbeat.as_ref().is_some_and(|h| h.is_empty()) {
            return Err(ConfigError::InvalidHeartbeat);
        }
        Ok(())
    }
}

pub fn validate_device_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::MissingDeviceId);
    }
    if !is_printable_ascii(id) || id.contains([' ', '/', '+', '#']) {
        return Err(ConfigError::InvalidDeviceId);
    }
    Ok(())
}
