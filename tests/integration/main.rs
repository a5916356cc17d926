//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem against
//! recording mock ports. All tests run on the host with no radio, access
//! point or collector required.

mod mock_ports;
mod node_service_tests;
mod pairing_flow_tests;
mod runtime_tests;
mod telemetry_tests;
