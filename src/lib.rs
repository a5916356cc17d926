//! Sensor node firmware library.
//!
//! Exposes the pure-logic modules for integration testing and host-side
//! simulation. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod pairing;
pub mod scheduler;
pub mod sensors;
pub mod telemetry;

mod util;

// Adapters and drivers carry their own cfg gates and simulation paths.
pub mod adapters;
pub mod drivers;
pub mod runtime;

mod esp_link_shims;

// Linked for its `critical-section` implementation only.
#[cfg(not(target_os = "espidf"))]
use critical_section as _;
