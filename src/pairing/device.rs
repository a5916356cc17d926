//! Peripheral identity: addresses, service ids, class-of-device codes and
//! the per-sighting [`DeviceRecord`].

use core::fmt;
use serde::{Deserialize, Serialize};

/// Longest display name kept from an advertisement.
pub const MAX_NAME_LEN: usize = 32;
/// Advertised service ids kept per record.
pub const MAX_ADVERTISED_SERVICES: usize = 4;
/// Discovered service ids kept per record during one session.
pub const MAX_DISCOVERED_SERVICES: usize = 8;

pub type DisplayName = heapless::String<MAX_NAME_LEN>;

// ───────────────────────────────────────────────────────────────
// Hardware address
// ───────────────────────────────────────────────────────────────

/// 48-bit radio hardware address, most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BdAddr(pub [u8; 6]);

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Service identifier
// ───────────────────────────────────────────────────────────────

/// A GATT service (or characteristic) UUID, always held in 128-bit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub u128);

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`.
const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

impl ServiceId {
    /// BLE-MIDI service `03B80E5A-EDE8-4B33-A751-6CE34EC4C700`.
    pub const MIDI: Self = Self(0x03B8_0E5A_EDE8_4B33_A751_6CE3_4EC4_C700);
    /// BLE-MIDI data I/O characteristic `7772E5DB-3868-4112-A1A9-F2669D106BF3`.
    pub const MIDI_IO: Self = Self(0x7772_E5DB_3868_4112_A1A9_F266_9D10_6BF3);

    /// Expand a 16-bit assigned number onto the base UUID.
    pub const fn from_short(short: u16) -> Self {
        Self(BASE_UUID | ((short as u128) << 96))
    }

    /// Build from the little-endian byte order used on the air.
    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// The 16-bit alias, if this id lives on the base UUID.
    pub fn as_short(self) -> Option<u16> {
        let mask = !(0xFFFF_u128 << 96);
        if self.0 & mask == BASE_UUID {
            Some((self.0 >> 96) as u16)
        } else {
            None
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(short) = self.as_short() {
            return write!(f, "0x{short:04X}");
        }
        let v = self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Class of device (classic radio)
// ───────────────────────────────────────────────────────────────

/// 24-bit class-of-device field from a classic inquiry result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClass(pub u32);

impl DeviceClass {
    /// Service class bit 18: rendering (printing, speakers).
    const SERVICE_RENDERING: u32 = 1 << 18;
    /// Service class bit 21: audio.
    const SERVICE_AUDIO: u32 = 1 << 21;
    /// Major device class 0x04: audio/video.
    const MAJOR_AUDIO_VIDEO: u32 = 0x04;

    pub fn major(self) -> u32 {
        (self.0 >> 8) & 0x1F
    }

    pub fn is_rendering(self) -> bool {
        self.0 & Self::SERVICE_RENDERING != 0
    }

    pub fn is_audio_video(self) -> bool {
        self.major() == Self::MAJOR_AUDIO_VIDEO || self.0 & Self::SERVICE_AUDIO != 0
    }
}

// ───────────────────────────────────────────────────────────────
// Device record
// ───────────────────────────────────────────────────────────────

/// One peripheral sighting within a scan epoch.
///
/// After promotion the identity fields are frozen; only
/// `discovered_services` grows during the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub address: BdAddr,
    pub display_name: Option<DisplayName>,
    pub advertised_services: heapless::Vec<ServiceId, MAX_ADVERTISED_SERVICES>,
    pub device_class: Option<DeviceClass>,
    /// Last seen RSSI in dBm.
    pub rssi: i8,
    pub discovered_services: heapless::Vec<ServiceId, MAX_DISCOVERED_SERVICES>,
}

impl DeviceRecord {
    pub fn new(address: BdAddr, rssi: i8) -> Self {
        Self {
            address,
            display_name: None,
            advertised_services: heapless::Vec::new(),
            device_class: None,
            rssi,
            discovered_services: heapless::Vec::new(),
        }
    }

    /// Set the display name, truncating at a character boundary.
    pub fn with_name(mut self, name: &str) -> Self {
        self.display_name = Some(truncated_name(name));
        self
    }

    pub fn with_service(mut self, service: ServiceId) -> Self {
        self.add_advertised(service);
        self
    }

    pub fn with_device_class(mut self, class: DeviceClass) -> Self {
        self.device_class = Some(class);
        self
    }

    /// Record an advertised service. Duplicates are ignored; overflow drops.
    pub fn add_advertised(&mut self, service: ServiceId) {
        if !self.advertised_services.contains(&service) {
            let _ = self.advertised_services.push(service);
        }
    }

    /// Record a service found during resolution. Returns `false` if the
    /// set is full and the id was dropped.
    pub fn add_discovered(&mut self, service: ServiceId) -> bool {
        if self.discovered_services.contains(&service) {
            return true;
        }
        self.discovered_services.push(service).is_ok()
    }

    /// Merge a later sighting of the same address into this record.
    pub fn refresh(&mut self, newer: &DeviceRecord) {
        self.rssi = newer.rssi;
        if self.display_name.is_none() {
            self.display_name.clone_from(&newer.display_name);
        }
        if self.device_class.is_none() {
            self.device_class = newer.device_class;
        }
        for s in &newer.advertised_services {
            self.add_advertised(*s);
        }
    }

    pub fn advertises(&self, service: ServiceId) -> bool {
        self.advertised_services.contains(&service)
    }
}

fn truncated_name(name: &str) -> DisplayName {
    let mut out = DisplayName::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ───────────────────────────────────────────────────────────────
// Identifying signature
// ───────────────────────────────────────────────────────────────

/// How the target peripheral is recognised among scan results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeripheralSignature {
    /// The peripheral advertises this service.
    Service(ServiceId),
    /// Classic-radio heuristic: rendering or audio/video class plus a
    /// resolvable name, optionally an exact name.
    ClassAndName { name: Option<DisplayName> },
}

impl PeripheralSignature {
    /// The filter predicate applied to every sighting.
    pub fn matches(&self, record: &DeviceRecord) -> bool {
        match self {
            Self::Service(id) => record.advertises(*id),
            Self::ClassAndName { name } => {
                let class_ok = record
                    .device_class
                    .is_some_and(|c| c.is_rendering() || c.is_audio_video());
                let name_ok = match (&record.display_name, name) {
                    (None, _) => false,
                    (Some(seen), None) => !seen.is_empty(),
                    (Some(seen), Some(want)) => seen == want,
                };
                class_ok && name_ok
            }
        }
    }
}

impl Default for PeripheralSignature {
    fn default() -> Self {
        Self::Service(ServiceId::MIDI)
    }
}
