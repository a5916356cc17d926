//! Blackboard threaded through every pairing handler.
//!
//! Handlers read the configuration and current target from here and write
//! back radio commands and notes. They never hold the radio themselves.

use core::fmt;

use log::{debug, warn};

use crate::config::PairingConfig;
use crate::events::MAX_NOTIFY_LEN;

use super::device::{BdAddr, DeviceRecord, ServiceId};

/// Sightings remembered within one scan epoch.
pub const MAX_EPOCH_DEVICES: usize = 8;
/// Addresses excluded after failing service resolution.
pub const MAX_REJECTED: usize = 4;
pub const MAX_COMMANDS: usize = 4;
pub const MAX_NOTES: usize = 4;

/// A request for the radio, applied by the machine after the handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioCommand {
    StartScan,
    StopScan,
    Connect(BdAddr),
    ResolveServices(BdAddr),
    Subscribe(BdAddr),
    /// Write the configured heartbeat.
    Heartbeat(BdAddr),
    Disconnect(BdAddr),
}

/// Things worth reporting that are not state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingNote {
    CandidatePromoted(DeviceRecord),
    ServiceResolved { peer: BdAddr, service: ServiceId },
    /// Resolution finished without the target service; address excluded.
    ServiceMissing { peer: BdAddr },
    ConnectTimedOut { peer: BdAddr },
    ResolveTimedOut { peer: BdAddr },
    /// Nothing heard for the stall window; scan restarted.
    ScanStalled,
    EpochEnded { epoch: u32, seen: usize },
    RetryScheduled { attempt: u8 },
    RetriesExhausted { attempts: u8 },
    /// A connection nobody asked for; torn down.
    UnexpectedConnection { peer: BdAddr },
    PeripheralData {
        peer: BdAddr,
        data: heapless::Vec<u8, MAX_NOTIFY_LEN>,
    },
}

impl fmt::Display for PairingNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CandidatePromoted(r) => {
                write!(f, "candidate {} rssi={}", r.address, r.rssi)?;
                if let Some(name) = &r.display_name {
                    write!(f, " name={name}")?;
                }
                Ok(())
            }
            Self::ServiceResolved { peer, service } => write!(f, "{peer} service {service}"),
            Self::ServiceMissing { peer } => write!(f, "{peer} lacks target service, excluded"),
            Self::ConnectTimedOut { peer } => write!(f, "{peer} connect timed out"),
            Self::ResolveTimedOut { peer } => write!(f, "{peer} service resolution timed out"),
            Self::ScanStalled => f.write_str("scan stalled, restarting"),
            Self::EpochEnded { epoch, seen } => write!(f, "epoch {epoch} ended, {seen} seen"),
            Self::RetryScheduled { attempt } => write!(f, "retry {attempt}"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "giving up after {attempts} attempts")
            }
            Self::UnexpectedConnection { peer } => write!(f, "unexpected connection {peer}"),
            Self::PeripheralData { peer, data } => write!(f, "{peer} {} bytes", data.len()),
        }
    }
}

pub struct PairingContext {
    pub config: PairingConfig,

    // -- Timing --
    pub now_ms: u64,
    /// Set by the engine on every transition.
    pub state_entered_ms: u64,
    /// Last sighting or scan (re)start.
    pub last_scan_activity_ms: u64,

    // -- Discovery --
    /// Per-epoch sightings, cleared when a new scan starts.
    pub epoch: heapless::Vec<DeviceRecord, MAX_EPOCH_DEVICES>,
    pub epoch_count: u32,
    /// The one promoted record for the current session.
    pub target: Option<DeviceRecord>,
    pub rejected: heapless::Deque<BdAddr, MAX_REJECTED>,

    // -- Session --
    /// Consecutive failures since the last successful connect.
    pub retries: u8,
    /// A connection to `target` is open or pending.
    pub link_open: bool,

    // -- Outputs --
    pub commands: heapless::Deque<RadioCommand, MAX_COMMANDS>,
    pub notes: heapless::Deque<PairingNote, MAX_NOTES>,
}

impl PairingContext {
    pub fn new(config: PairingConfig) -> Self {
        Self {
            config,
            now_ms: 0,
            state_entered_ms: 0,
            last_scan_activity_ms: 0,
            epoch: heapless::Vec::new(),
            epoch_count: 0,
            target: None,
            rejected: heapless::Deque::new(),
            retries: 0,
            link_open: false,
            commands: heapless::Deque::new(),
            notes: heapless::Deque::new(),
        }
    }

    pub fn ms_in_state(&self) -> u64 {
        self.now_ms.saturating_sub(self.state_entered_ms)
    }

    pub fn queue(&mut self, cmd: RadioCommand) {
        if self.commands.push_back(cmd).is_err() {
            warn!("PAIR: command queue full, dropped {:?}", cmd);
        }
    }

    /// Notes are informational; the oldest is dropped on overflow.
    pub fn note(&mut self, note: PairingNote) {
        if self.notes.is_full() {
            self.notes.pop_front();
        }
        let _ = self.notes.push_back(note);
    }

    pub fn target_addr(&self) -> Option<BdAddr> {
        self.target.as_ref().map(|t| t.address)
    }

    pub fn is_target(&self, peer: &BdAddr) -> bool {
        self.target_addr().as_ref() == Some(peer)
    }

    /// Exclude `peer` from later epochs. The oldest exclusion is forgotten
    /// when the list is full.
    pub fn reject(&mut self, peer: BdAddr) {
        if self.is_rejected(&peer) {
            return;
        }
        if self.rejected.is_full() {
            self.rejected.pop_front();
        }
        let _ = self.rejected.push_back(peer);
    }

    pub fn is_rejected(&self, peer: &BdAddr) -> bool {
        self.rejected.iter().any(|a| a == peer)
    }

    /// Fold a sighting into the epoch table and return the merged record.
    pub fn observe(&mut self, record: &DeviceRecord) -> DeviceRecord {
        self.last_scan_activity_ms = self.now_ms;
        if let Some(known) = self.epoch.iter_mut().find(|r| r.address == record.address) {
            known.refresh(record);
            return known.clone();
        }
        if self.epoch.push(record.clone()).is_err() {
            debug!("PAIR: epoch table full, {} not tracked", record.address);
        }
        record.clone()
    }

    /// Begin a fresh epoch.
    pub fn new_epoch(&mut self) {
        self.epoch.clear();
        self.epoch_count = self.epoch_count.wrapping_add(1);
        self.last_scan_activity_ms = self.now_ms;
    }

    /// Tear down the link to the target if one is open or pending.
    pub fn release_link(&mut self) {
        if self.link_open {
            if let Some(peer) = self.target_addr() {
                self.queue(RadioCommand::Disconnect(peer));
            }
            self.link_open = false;
        }
    }
}
