//! Fuzz target: `parse_advertisement`
//!
//! Feeds arbitrary advertising payloads to the parser and checks that the
//! resulting record respects its fixed capacities.
//!
//! cargo fuzz run fuzz_adv_parser

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensornode::pairing::adv::{AdStructures, parse_advertisement};
use sensornode::pairing::device::{BdAddr, MAX_ADVERTISED_SERVICES, MAX_NAME_LEN};

fuzz_target!(|data: &[u8]| {
    let addr = BdAddr([0xC4, 0x4F, 0x33, 0x0A, 0x1B, 0x2C]);
    let record = parse_advertisement(addr, -60, data);

    assert!(record.advertised_services.len() <= MAX_ADVERTISED_SERVICES);
    if let Some(name) = &record.display_name {
        assert!(name.len() <= MAX_NAME_LEN);
        assert!(!name.is_empty());
    }

    // Every structure the walker yields lies inside the payload.
    let mut consumed = 0;
    for (_, body) in AdStructures::new(data) {
        consumed += body.len() + 2;
    }
    assert!(consumed <= data.len());
});
