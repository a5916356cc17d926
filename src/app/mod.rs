//! Application core — pure domain orchestration, zero I/O.
//!
//! [`service::NodeService`] ties the pairing machine, the network session
//! and the telemetry publisher together. All interaction with hardware
//! happens through the **port traits** in [`ports`], keeping this layer
//! fully testable without a radio or an access point.

pub mod events;
pub mod ports;
pub mod service;
