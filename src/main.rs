//! Sensor node firmware — main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BleCentral        WifiLink        UdpTransport / MqttTransport│
//! │  (PeripheralRadio) (NetworkLink)   (TelemetryTransport)        │
//! │  SystemClock       LogEventSink    GPIO indicator pin          │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              NodeService (pure logic)                  │    │
//! │  │  PairingMachine · NetworkSession · TelemetryPublisher  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  runtime: Scheduler task · radio pump · net pump · watchdog    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Site configuration comes from build-time environment variables:
//! `SENSORNODE_DEVICE_ID`, `SENSORNODE_WIFI_SSID`, `SENSORNODE_WIFI_PASS`,
//! `SENSORNODE_COLLECTOR_HOST` and `SENSORNODE_COLLECTOR_PORT`.

#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::info;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::PinDriver;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use sensornode::adapters::ble_central::BleCentral;
use sensornode::adapters::device_id;
use sensornode::adapters::log_sink::LogEventSink;
use sensornode::adapters::time::SystemClock;
use sensornode::adapters::wifi::WifiLink;
use sensornode::app::service::{NodePorts, NodeService};
use sensornode::config::NodeConfig;
use sensornode::drivers::watchdog::Watchdog;
use sensornode::error::{ConfigError, Error};
use sensornode::events::RADIO_EVENTS;
use sensornode::network::Credentials;
use sensornode::runtime;

#[cfg(feature = "mqtt")]
use sensornode::adapters::mqtt_transport::MqttTransport;
#[cfg(not(feature = "mqtt"))]
use sensornode::adapters::udp_transport::UdpTransport;

const DEFAULT_COLLECTOR_PORT: u16 = 5005;

/// Assemble the node configuration from build-time values.
fn site_config(mac: &device_id::MacAddress) -> core::result::Result<NodeConfig, ConfigError> {
    let mut config = NodeConfig::default();

    config.device_id.clear();
    match option_env!("SENSORNODE_DEVICE_ID") {
        Some(id) => config
            .device_id
            .push_str(id)
            .map_err(|()| ConfigError::InvalidDeviceId)?,
        None => config
            .device_id
            .push_str(&device_id::device_id(mac))
            .map_err(|()| ConfigError::InvalidDeviceId)?,
    }

    config.network.credentials = Credentials::new(
        option_env!("SENSORNODE_WIFI_SSID").unwrap_or(""),
        option_env!("SENSORNODE_WIFI_PASS").unwrap_or(""),
    )?;

    config
        .network
        .collector
        .host
        .push_str(option_env!("SENSORNODE_COLLECTOR_HOST").unwrap_or(""))
        .map_err(|()| ConfigError::MissingEndpoint)?;
    config.network.collector.port = match option_env!("SENSORNODE_COLLECTOR_PORT") {
        Some(p) => p.parse().map_err(|_| ConfigError::InvalidPort)?,
        None => DEFAULT_COLLECTOR_PORT,
    };

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  SensorNode v{:<24}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration (fatal if invalid) ───────────────────
    let mac = device_id::read_mac();
    let config = site_config(&mac)
        .map_err(Error::from)
        .context("site configuration rejected")?;
    info!(
        "Device ID: {} → collector {}:{}",
        config.device_id, config.network.collector.host, config.network.collector.port
    );

    // ── 3. Platform handles ───────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── 4. Adapters ───────────────────────────────────────────
    let radio = BleCentral::new(
        &RADIO_EVENTS,
        config.pairing.target_service,
        config.pairing.characteristic,
    )
    .map_err(Error::from)
    .context("BLE central init")?;
    let link = WifiLink::new(peripherals.modem, sysloop, Some(nvs))
        .map_err(Error::from)
        .context("WiFi init")?;

    #[cfg(not(feature = "mqtt"))]
    let transport = UdpTransport::new(config.network.collector.clone()).map_err(Error::from)?;
    #[cfg(feature = "mqtt")]
    let transport =
        MqttTransport::new(&config.network.collector, &config.device_id).map_err(Error::from)?;

    let indicator_pin = PinDriver::output(peripherals.pins.gpio2)?;

    // ── 5. Node service ───────────────────────────────────────
    let node = NodeService::new(
        config,
        NodePorts {
            radio,
            link,
            transport,
            indicator_pin,
            clock: SystemClock::new(),
            sink: LogEventSink::new(),
        },
    )
    .map_err(Error::from)?;

    info!(
        "Pairing target service {}, characteristic {}",
        node.config().pairing.target_service,
        node.config().pairing.characteristic
    );

    // ── 6. Run ────────────────────────────────────────────────
    let watchdog = Watchdog::default();
    info!("System ready. Entering runtime.");
    runtime::run(node, watchdog);
    Ok(())
}
