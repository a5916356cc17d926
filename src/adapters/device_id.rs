//! Device identity derived from the factory MAC address.
//!
//! The id is `node-xxyyzz` (last three MAC bytes, lowercase hex). It is
//! stable across reboots and valid as a telemetry channel prefix, so it
//! serves as the fallback when no device id is configured at build time.

use core::fmt::Write;

/// Formatted device id, `node-` plus six hex digits.
pub type DeviceIdString = heapless::String<32>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a fixed, locally administered MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x02, 0x00, 0x5E, 0x10, 0x20, 0x30]
}

pub fn device_id(mac: &MacAddress) -> DeviceIdString {
    let mut id = DeviceIdString::new();
    let _ = write!(id, "node-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    id
}
