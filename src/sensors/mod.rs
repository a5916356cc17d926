//! Sensor subsystem.
//!
//! The node samples one value, its own uptime, and hands each reading to
//! the telemetry publisher on the `uptime` channel.

pub mod uptime;

pub use uptime::{UptimeReading, UptimeSensor};
