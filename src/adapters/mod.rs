//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements         | Connects to                   |
//! |------------------|--------------------|-------------------------------|
//! | `ble_central`    | PeripheralRadio    | Bluedroid GAP / GATT client   |
//! | `wifi`           | NetworkLink        | ESP-IDF WiFi STA              |
//! | `udp_transport`  | TelemetryTransport | UDP datagrams to collector    |
//! | `mqtt_transport` | TelemetryTransport | MQTT broker (feature `mqtt`)  |
//! | `time`           | Clock              | ESP32 high-resolution timer   |
//! | `log_sink`       | EventSink          | Serial log output             |
//! | `device_id`      | —                  | eFuse factory MAC             |

pub mod ble_central;
pub mod device_id;
pub mod log_sink;
#[cfg(all(feature = "mqtt", target_os = "espidf"))]
pub mod mqtt_transport;
pub mod time;
pub mod udp_transport;
pub mod wifi;
