//! Uptime "sensor".
//!
//! Reads the monotonic clock and numbers each sample so gaps are visible
//! at the collector even though delivery is best-effort.

use core::fmt::Write;

use crate::app::ports::Clock;

/// Topic suffix for uptime telemetry.
pub const UPTIME_SUFFIX: &str = "uptime";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UptimeReading {
    pub uptime_ms: u64,
    /// Samples taken before this one.
    pub sequence: u32,
}

impl UptimeReading {
    /// Telemetry body: milliseconds since boot as a decimal string.
    pub fn body(&self) -> heapless::String<20> {
        let mut s = heapless::String::new();
        // u64::MAX has 20 digits, so this always fits.
        let _ = write!(s, "{}", self.uptime_ms);
        s
    }
}

#[derive(Debug, Default)]
pub struct UptimeSensor {
    samples: u32,
}

impl UptimeSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, clock: &impl Clock) -> UptimeReading {
        let reading = UptimeReading {
            uptime_ms: clock.uptime_ms(),
            sequence: self.samples,
        };
        self.samples = self.samples.wrapping_add(1);
        reading
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}
