//! Status indicator driver.
//!
//! A single binary output toggled on every indicator tick. Generic over
//! any `embedded-hal` output so the same driver runs on an ESP-IDF GPIO
//! and on a host mock.
//!
//! Pin errors are logged and otherwise ignored: the indicator is cosmetic
//! and must never disturb the tasks around it.

use embedded_hal::digital::OutputPin;
use log::{debug, warn};

pub struct Indicator<P: OutputPin> {
    pin: P,
    level: bool,
    enabled: bool,
    toggles: u32,
}

impl<P: OutputPin> Indicator<P> {
    /// Takes the pin and drives it low.
    pub fn new(pin: P, enabled: bool) -> Self {
        let mut ind = Self {
            pin,
            level: true,
            enabled,
            toggles: 0,
        };
        ind.drive(false);
        ind
    }

    /// Flip the line. While disabled the line is held low instead.
    /// Returns the new logical level.
    pub fn toggle(&mut self) -> bool {
        if !self.enabled {
            if self.level {
                self.drive(false);
            }
            return false;
        }
        self.drive(!self.level);
        self.toggles = self.toggles.wrapping_add(1);
        self.level
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        debug!("Indicator: {}", if enabled { "enabled" } else { "disabled" });
        self.enabled = enabled;
        if !enabled {
            self.drive(false);
        }
    }

    pub fn is_on(&self) -> bool {
        self.level
    }

    pub fn toggles(&self) -> u32 {
        self.toggles
    }

    fn drive(&mut self, high: bool) {
        let res = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match res {
            Ok(()) => self.level = high,
            Err(e) => warn!("Indicator: pin write failed: {:?}", e),
        }
    }
}
