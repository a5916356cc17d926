//! Network session manager.
//!
//! Owns the wide-area link state and the fail-stop retry policy:
//!
//! ```text
//!  Disconnected ──start──▶ Connecting ──link up──▶ Connected
//!                              ▲  │                    │
//!                   retries <  │  │ link down          │ link down
//!                   ceiling    └──┤◀───────────────────┘
//!                                 │ retries ≥ ceiling
//!                                 ▼
//!                              Failed   (until reset)
//! ```
//!
//! Nothing here blocks. The link driver reports up/down through
//! [`NetEvent`]s and the rest of the node polls [`NetworkSession::is_ready`].
//!
//! A teardown the session requests itself (connect timeout, reset) is
//! reported back by the driver as a link-down like any other. The session
//! expects that echo and does not count it as a failure.

use core::fmt;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{LinkStatus, NetworkLink};
use crate::error::ConfigError;
use crate::events::NetEvent;
use crate::util::is_printable_ascii;

// ── Credentials ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ConfigError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut c = Self::default();
        c.ssid.push_str(ssid).map_err(|()| ConfigError::InvalidSsid)?;
        c.password
            .push_str(password)
            .map_err(|()| ConfigError::InvalidPassword)?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ssid(&self.ssid)?;
        validate_password(&self.password)
    }
}

pub fn validate_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConfigError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ConfigError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConfigError::InvalidPassword);
    }
    Ok(())
}

// ── State ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NetworkState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// A state change worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetTransition {
    pub from: NetworkState,
    pub to: NetworkState,
    pub retries: u8,
}

// ── Session ───────────────────────────────────────────────────

pub struct NetworkSession {
    state: NetworkState,
    retries: u8,
    ceiling: u8,
    connect_timeout_ms: u64,
    /// Uptime at which the current connect attempt was issued.
    attempt_started_ms: u64,
    credentials: Option<Credentials>,
    /// A locally requested disconnect whose link-down has not arrived yet.
    teardown_pending: bool,
}

impl NetworkSession {
    pub fn new(ceiling: u8, connect_timeout_ms: u64) -> Self {
        Self {
            state: NetworkState::Disconnected,
            retries: 0,
            ceiling,
            connect_timeout_ms,
            attempt_started_ms: 0,
            credentials: None,
            teardown_pending: false,
        }
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn retries(&self) -> u8 {
        self.retries
    }

    pub fn is_ready(&self) -> bool {
        self.state == NetworkState::Connected
    }

    /// Store credentials and issue the first connect.
    ///
    /// Ignored unless the session is Disconnected: a running session is
    /// already connecting, and a Failed one needs [`reset`](Self::reset).
    pub fn start(
        &mut self,
        credentials: Credentials,
        link: &mut impl NetworkLink,
        now_ms: u64,
    ) -> Option<NetTransition> {
        if self.state != NetworkState::Disconnected {
            warn!("NET: start ignored in {}", self.state);
            return None;
        }
        info!("NET: starting session for '{}'", credentials.ssid);
        self.credentials = Some(credentials);
        self.retries = 0;
        self.connect(link, now_ms)
    }

    /// Link reported up: clear the failure streak.
    pub fn on_link_up(&mut self) -> Option<NetTransition> {
        match self.state {
            NetworkState::Connecting | NetworkState::Connected => {
                self.retries = 0;
                self.teardown_pending = false;
                self.set_state(NetworkState::Connected)
            }
            NetworkState::Disconnected | NetworkState::Failed => {
                warn!("NET: link up ignored in {}", self.state);
                None
            }
        }
    }

    /// Link reported down: count it and either reconnect or fail-stop.
    pub fn on_link_down(
        &mut self,
        link: &mut impl NetworkLink,
        now_ms: u64,
    ) -> Option<NetTransition> {
        match self.state {
            NetworkState::Connecting if self.teardown_pending => {
                self.teardown_pending = false;
                debug!("NET: link down from our own teardown, not counted");
                None
            }
            NetworkState::Connecting | NetworkState::Connected => self.retry(link, now_ms),
            NetworkState::Disconnected | NetworkState::Failed => None,
        }
    }

    pub fn handle(
        &mut self,
        event: NetEvent,
        link: &mut impl NetworkLink,
        now_ms: u64,
    ) -> Option<NetTransition> {
        match event {
            NetEvent::LinkUp => self.on_link_up(),
            NetEvent::LinkDown => self.on_link_down(link, now_ms),
        }
    }

    /// Maintenance hook: an attempt that has produced neither up nor down
    /// within the connect timeout counts as a failure.
    pub fn poll_timeout(
        &mut self,
        link: &mut impl NetworkLink,
        now_ms: u64,
    ) -> Option<NetTransition> {
        if self.state == NetworkState::Connecting
            && now_ms.saturating_sub(self.attempt_started_ms) >= self.connect_timeout_ms
        {
            warn!("NET: connect timed out after {}ms", self.connect_timeout_ms);
            link.disconnect();
            self.teardown_pending = true;
            return self.retry(link, now_ms);
        }
        None
    }

    /// External reset: drop the link and forget the failure streak.
    pub fn reset(&mut self, link: &mut impl NetworkLink) -> Option<NetTransition> {
        link.disconnect();
        // Only a live or associating link reports the teardown.
        self.teardown_pending = matches!(
            self.state,
            NetworkState::Connecting | NetworkState::Connected
        );
        self.retries = 0;
        self.set_state(NetworkState::Disconnected)
    }

    // ── Internal ──────────────────────────────────────────────

    fn retry(&mut self, link: &mut impl NetworkLink, now_ms: u64) -> Option<NetTransition> {
        self.retries = self.retries.saturating_add(1);
        if self.retries >= self.ceiling {
            error!(
                "NET: {} consecutive failures (ceiling {}), giving up",
                self.retries, self.ceiling
            );
            link.disconnect();
            self.teardown_pending = false;
            return self.set_state(NetworkState::Failed);
        }
        warn!("NET: link down, retry {}/{}", self.retries, self.ceiling);
        self.connect(link, now_ms)
    }

    /// Issue a connect. An immediate refusal is handled like a link-down,
    /// iteratively so a persistently failing driver still hits the ceiling.
    fn connect(&mut self, link: &mut impl NetworkLink, now_ms: u64) -> Option<NetTransition> {
        let from = self.state;
        loop {
            let Some(creds) = self.credentials.as_ref() else {
                error!("NET: connect without credentials");
                return self.set_state(NetworkState::Failed);
            };
            self.attempt_started_ms = now_ms;
            match link.connect(creds) {
                Ok(()) => {
                    self.state = NetworkState::Connecting;
                    break;
                }
                Err(e) => {
                    self.retries = self.retries.saturating_add(1);
                    warn!("NET: connect refused ({}), failure {}", e, self.retries);
                    if self.retries >= self.ceiling {
                        link.disconnect();
                        self.state = NetworkState::Failed;
                        break;
                    }
                }
            }
        }
        self.transition_from(from)
    }

    fn set_state(&mut self, next: NetworkState) -> Option<NetTransition> {
        let from = self.state;
        self.state = next;
        self.transition_from(from)
    }

    fn transition_from(&self, from: NetworkState) -> Option<NetTransition> {
        if from == self.state {
            return None;
        }
        info!("NET: {} -> {} (retries={})", from, self.state, self.retries);
        Some(NetTransition {
            from,
            to: self.state,
            retries: self.retries,
        })
    }
}

impl LinkStatus for NetworkSession {
    fn is_ready(&self) -> bool {
        NetworkSession::is_ready(self)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
