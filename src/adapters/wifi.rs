//! WiFi station-mode adapter.
//!
//! Implements [`NetworkLink`]. `connect` only issues the association;
//! the outcome arrives as [`NetEvent::LinkUp`] / [`NetEvent::LinkDown`]
//! on the network event queue, and the session manager decides whether
//! to retry. The driver's own auto-reconnect is never used.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi`, with system
//!   event loop subscriptions forwarding disconnects and DHCP leases to
//!   [`NET_EVENTS`](crate::events::NET_EVENTS).
//! - **all other targets**: a simulated access point that answers each
//!   connect immediately, optionally refusing the first few.
//!
//! Both report a local `disconnect` as a link-down; the session manager
//! knows which of those it caused.

use log::{info, warn};

use crate::app::ports::NetworkLink;
use crate::error::LinkError;
use crate::network::Credentials;

#[cfg(not(target_os = "espidf"))]
use crate::events::{NetEvent, NetQueue};

// ───────────────────────────────────────────────────────────────
// ESP-IDF
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiLink {
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
    _wifi_events: esp_idf_svc::eventloop::EspSubscription<'static, esp_idf_svc::eventloop::System>,
    _ip_events: esp_idf_svc::eventloop::EspSubscription<'static, esp_idf_svc::eventloop::System>,
}

#[cfg(target_os = "espidf")]
impl WifiLink {
    pub fn new(
        modem: esp_idf_svc::hal::modem::Modem,
        sysloop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: Option<esp_idf_svc::nvs::EspDefaultNvsPartition>,
    ) -> Result<Self, LinkError> {
        use esp_idf_svc::netif::IpEvent;
        use esp_idf_svc::wifi::{EspWifi, WifiEvent};

        use crate::events::{NET_EVENTS, NetEvent};

        let wifi = EspWifi::new(modem, sysloop.clone(), nvs).map_err(|e| LinkError::Esp(e.code()))?;

        let wifi_events = sysloop
            .subscribe::<WifiEvent, _>(|event| {
                if let WifiEvent::StaDisconnected(..) = event {
                    NET_EVENTS.push(NetEvent::LinkDown);
                }
            })
            .map_err(|e| LinkError::Esp(e.code()))?;
        let ip_events = sysloop
            .subscribe::<IpEvent, _>(|event| {
                if let IpEvent::DhcpIpAssigned(_) = event {
                    NET_EVENTS.push(NetEvent::LinkUp);
                }
            })
            .map_err(|e| LinkError::Esp(e.code()))?;

        info!("WiFi: driver ready");
        Ok(Self {
            wifi,
            _wifi_events: wifi_events,
            _ip_events: ip_events,
        })
    }
}

#[cfg(target_os = "espidf")]
impl NetworkLink for WifiLink {
    fn connect(&mut self, creds: &Credentials) -> Result<(), LinkError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        if creds.ssid.is_empty() {
            return Err(LinkError::NoCredentials);
        }
        let auth_method = if creds.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: creds.ssid.as_str().try_into().map_err(|_| LinkError::ConfigRejected)?,
            password: creds
                .password
                .as_str()
                .try_into()
                .map_err(|_| LinkError::ConfigRejected)?,
            auth_method,
            ..Default::default()
        });

        self.wifi
            .set_configuration(&config)
            .map_err(|_| LinkError::ConfigRejected)?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|e| LinkError::Esp(e.code()))?;
        }
        info!("WiFi: associating with '{}'", creds.ssid);
        self.wifi.connect().map_err(|e| {
            warn!("WiFi: connect refused ({})", e);
            LinkError::ConnectFailed
        })
    }

    fn disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: disconnect failed ({})", e);
        }
        info!("WiFi: disconnected");
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub struct WifiLink {
    events: &'static NetQueue,
    /// Connect attempts that report LinkDown before one succeeds.
    sim_failures: u32,
    sim_connect_counter: u32,
    associated: bool,
}

#[cfg(not(target_os = "espidf"))]
impl WifiLink {
    pub fn new(events: &'static NetQueue) -> Self {
        Self::with_failures(events, 0)
    }

    /// Simulated AP that rejects the first `failures` association attempts.
    pub fn with_failures(events: &'static NetQueue, failures: u32) -> Self {
        Self {
            events,
            sim_failures: failures,
            sim_connect_counter: 0,
            associated: false,
        }
    }

    pub fn is_associated(&self) -> bool {
        self.associated
    }

    pub fn connect_attempts(&self) -> u32 {
        self.sim_connect_counter
    }

    /// Simulation: the access point drops the station.
    pub fn sim_drop(&mut self) {
        if self.associated {
            self.associated = false;
            warn!("WiFi(sim): AP dropped the station");
            self.events.push(NetEvent::LinkDown);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl NetworkLink for WifiLink {
    fn connect(&mut self, creds: &Credentials) -> Result<(), LinkError> {
        if creds.ssid.is_empty() {
            return Err(LinkError::NoCredentials);
        }
        self.sim_connect_counter = self.sim_connect_counter.wrapping_add(1);
        if self.sim_connect_counter <= self.sim_failures {
            warn!(
                "WiFi(sim): simulated auth failure (attempt {})",
                self.sim_connect_counter
            );
            self.events.push(NetEvent::LinkDown);
            return Ok(());
        }
        self.associated = true;
        info!(
            "WiFi(sim): connected to '{}' (attempt {})",
            creds.ssid, self.sim_connect_counter
        );
        self.events.push(NetEvent::LinkUp);
        Ok(())
    }

    /// Leaving an association is reported as a link-down, as the ESP-IDF
    /// driver posts `StaDisconnected` for local teardowns too.
    fn disconnect(&mut self) {
        if self.associated {
            self.associated = false;
            info!("WiFi(sim): disconnected");
            self.events.push(NetEvent::LinkDown);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
