//! Advertisement / EIR payload parsing.
//!
//! Both BLE advertising data and classic extended inquiry responses use
//! the same `[len][type][data...]` structure layout, so one walker serves
//! both radio variants.

use super::device::{BdAddr, DeviceRecord, ServiceId};

const AD_INCOMPLETE_16: u8 = 0x02;
const AD_COMPLETE_16: u8 = 0x03;
const AD_INCOMPLETE_128: u8 = 0x06;
const AD_COMPLETE_128: u8 = 0x07;
const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;

/// Iterator over `(ad_type, data)` structures.
///
/// Stops at the first zero length (padding) or at a structure that would
/// run past the end of the buffer.
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.data.get(self.pos)? as usize;
        if len == 0 || self.pos + len >= self.data.len() {
            return None;
        }
        let ad_type = self.data[self.pos + 1];
        let body = &self.data[self.pos + 2..=self.pos + len];
        self.pos += len + 1;
        Some((ad_type, body))
    }
}

/// Build a [`DeviceRecord`] from one advertising report.
///
/// Never fails: malformed trailing bytes are ignored, oversize service
/// lists are truncated, and a complete name wins over a shortened one.
pub fn parse_advertisement(address: BdAddr, rssi: i8, payload: &[u8]) -> DeviceRecord {
    let mut record = DeviceRecord::new(address, rssi);
    let mut have_complete_name = false;

    for (ad_type, body) in AdStructures::new(payload) {
        match ad_type {
            AD_INCOMPLETE_16 | AD_COMPLETE_16 => {
                for chunk in body.chunks_exact(2) {
                    let short = u16::from_le_bytes([chunk[0], chunk[1]]);
                    record.add_advertised(ServiceId::from_short(short));
                }
            }
            AD_INCOMPLETE_128 | AD_COMPLETE_128 => {
                for chunk in body.chunks_exact(16) {
                    let mut raw = [0u8; 16];
                    raw.copy_from_slice(chunk);
                    record.add_advertised(ServiceId::from_le_bytes(raw));
                }
            }
            AD_SHORT_NAME if !have_complete_name => {
                if let Some(name) = utf8_prefix(body) {
                    record = record.with_name(name);
                }
            }
            AD_COMPLETE_NAME => {
                if let Some(name) = utf8_prefix(body) {
                    record = record.with_name(name);
                    have_complete_name = true;
                }
            }
            _ => {}
        }
    }

    record
}

/// The longest valid UTF-8 prefix, or `None` if it is empty.
fn utf8_prefix(bytes: &[u8]) -> Option<&str> {
    let s = match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).ok()?,
    };
    let s = s.trim_end_matches('\0');
    (!s.is_empty()).then_some(s)
}
