//! Pairing state handlers and table builder.
//!
//! ```text
//!  IDLE ──[start]──▶ SCANNING ──[signature match]──▶ CANDIDATE_FOUND
//!                      ▲                                   │
//!                      │                            [connect requested]
//!                      │                                   ▼
//!                      │   ┌────[failed / lost]──────── CONNECTING
//!                      │   │                               │
//!                      │   │                          [connected]
//!                      │   ▼                               ▼
//!   [retries left]── DISCONNECTED ◀──[not found]── RESOLVING_SERVICES
//!                      │   ▲                               │
//!            [exhausted]   └──────[lost]──── SUBSCRIBED ◀──[found]
//!                      ▼
//!                    IDLE
//!
//!  Any state ──[stop]──▶ IDLE
//! ```

use log::{debug, info, warn};

use super::context::{PairingContext, PairingNote, RadioCommand};
use super::{ConnectionState, PairingEvent, StateDescriptor};
use crate::events::RadioEvent;

/// Build the state table. Called once per machine.
pub fn build_state_table() -> [StateDescriptor; ConnectionState::COUNT] {
    [
        StateDescriptor {
            id: ConnectionState::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_event: idle_event,
            on_tick: no_tick,
        },
        StateDescriptor {
            id: ConnectionState::Scanning,
            name: "Scanning",
            on_enter: Some(scanning_enter),
            on_exit: Some(scanning_exit),
            on_event: scanning_event,
            on_tick: scanning_tick,
        },
        StateDescriptor {
            id: ConnectionState::CandidateFound,
            name: "CandidateFound",
            on_enter: Some(candidate_enter),
            on_exit: None,
            on_event: candidate_event,
            on_tick: candidate_tick,
        },
        StateDescriptor {
            id: ConnectionState::Connecting,
            name: "Connecting",
            on_enter: None,
            on_exit: None,
            on_event: connecting_event,
            on_tick: connecting_tick,
        },
        StateDescriptor {
            id: ConnectionState::ResolvingServices,
            name: "ResolvingServices",
            on_enter: None,
            on_exit: None,
            on_event: resolving_event,
            on_tick: resolving_tick,
        },
        StateDescriptor {
            id: ConnectionState::Subscribed,
            name: "Subscribed",
            on_enter: Some(subscribed_enter),
            on_exit: None,
            on_event: subscribed_event,
            on_tick: subscribed_tick,
        },
        StateDescriptor {
            id: ConnectionState::Disconnected,
            name: "Disconnected",
            on_enter: Some(disconnected_enter),
            on_exit: None,
            on_event: disconnected_event,
            on_tick: disconnected_tick,
        },
    ]
}

fn no_tick(_ctx: &mut PairingContext) -> Option<ConnectionState> {
    None
}

/// Tear down any connection that is not the one being opened.
fn refuse_connection(ctx: &mut PairingContext, event: &PairingEvent) {
    if let PairingEvent::Radio(RadioEvent::Connected { peer }) = event {
        warn!("PAIR: unexpected connection from {}, tearing down", peer);
        ctx.queue(RadioCommand::Disconnect(*peer));
        ctx.note(PairingNote::UnexpectedConnection { peer: *peer });
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut PairingContext) {
    ctx.release_link();
    ctx.target = None;
    ctx.epoch.clear();
    info!("IDLE: radio quiet");
}

fn idle_event(ctx: &mut PairingContext, event: &PairingEvent) -> Option<ConnectionState> {
    refuse_connection(ctx, event);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SCANNING
// ═══════════════════════════════════════════════════════════════════════════

fn scanning_enter(ctx: &mut PairingContext) {
    ctx.target = None;
    ctx.new_epoch();
    ctx.queue(RadioCommand::StartScan);
    info!("SCANNING: epoch {}", ctx.epoch_count);
}

fn scanning_exit(ctx: &mut PairingContext) {
    ctx.queue(RadioCommand::StopScan);
}

fn scanning_event(ctx: &mut PairingContext, event: &PairingEvent) -> Option<ConnectionState> {
    match event {
        PairingEvent::Radio(RadioEvent::DeviceObserved(record)) => {
            if ctx.is_rejected(&record.address) {
                return None;
            }
            let merged = ctx.observe(record);
            if !ctx.config.signature.matches(&merged) {
                return None;
            }
            info!("SCANNING: {} matches, promoting", merged.address);
            ctx.note(PairingNote::CandidatePromoted(merged.clone()));
            ctx.target = Some(merged);
            Some(ConnectionState::CandidateFound)
        }
        PairingEvent::Radio(RadioEvent::ScanComplete) => {
            ctx.note(PairingNote::EpochEnded {
                epoch: ctx.epoch_count,
                seen: ctx.epoch.len(),
            });
            ctx.new_epoch();
            ctx.queue(RadioCommand::StartScan);
            None
        }
        other => {
            refuse_connection(ctx, other);
            None
        }
    }
}

fn scanning_tick(ctx: &mut PairingContext) -> Option<ConnectionState> {
    let quiet = ctx.now_ms.saturating_sub(ctx.last_scan_activity_ms);
    if quiet >= u64::from(ctx.config.scan_stall_ms) {
        warn!("SCANNING: nothing heard for {} ms, restarting scan", quiet);
        ctx.note(PairingNote::ScanStalled);
        ctx.queue(RadioCommand::StopScan);
        ctx.new_epoch();
        ctx.queue(RadioCommand::StartScan);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CANDIDATE_FOUND — one record promoted, nothing else considered
// ═══════════════════════════════════════════════════════════════════════════

fn candidate_enter(ctx: &mut PairingContext) {
    if let Some(t) = &ctx.target {
        info!("CANDIDATE: {} rssi {}", t.address, t.rssi);
    }
}

fn request_connect(ctx: &mut PairingContext) -> Option<ConnectionState> {
    let Some(peer) = ctx.target_addr() else {
        warn!("CANDIDATE: no target recorded");
        return Some(ConnectionState::Idle);
    };
    ctx.queue(RadioCommand::Connect(peer));
    ctx.link_open = true;
    Some(ConnectionState::Connecting)
}

fn candidate_event(ctx: &mut PairingContext, event: &PairingEvent) -> Option<ConnectionState> {
    match event {
        PairingEvent::ConnectRequested => request_connect(ctx),
        other => {
            refuse_connection(ctx, other);
            None
        }
    }
}

fn candidate_tick(ctx: &mut PairingContext) -> Option<ConnectionState> {
    request_connect(ctx)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_event(ctx: &mut PairingContext, event: &PairingEvent) -> Option<ConnectionState> {
    match event {
        PairingEvent::Radio(RadioEvent::Connected { peer }) if ctx.is_target(peer) => {
            ctx.retries = 0;
            ctx.queue(RadioCommand::ResolveServices(*peer));
            info!("CONNECTING: {} connected, resolving services", peer);
            Some(ConnectionState::ResolvingServices)
        }
        PairingEvent::Radio(RadioEvent::ConnectFailed { peer } | RadioEvent::LinkLost { peer })
            if ctx.is_target(peer) =>
        {
            warn!("CONNECTING: {} failed", peer);
            ctx.link_open = false;
            Some(ConnectionState::Disconnected)
        }
        other => {
            refuse_connection(ctx, other);
            None
        }
    }
}

fn connecting_tick(ctx: &mut PairingContext) -> Option<ConnectionState> {
    if ctx.ms_in_state() < u64::from(ctx.config.connect_timeout_ms) {
        return None;
    }
    if let Some(peer) = ctx.target_addr() {
        warn!("CONNECTING: {} timed out", peer);
        ctx.note(PairingNote::ConnectTimedOut { peer });
    }
    // link_open is still set, so the pending open is cancelled on entry.
    Some(ConnectionState::Disconnected)
}

// ═══════════════════════════════════════════════════════════════════════════
//  RESOLVING_SERVICES
// ═══════════════════════════════════════════════════════════════════════════

fn resolving_event(ctx: &mut PairingContext, event: &PairingEvent) -> Option<ConnectionState> {
    match event {
        PairingEvent::Radio(RadioEvent::ServiceFound { peer, service }) if ctx.is_target(peer) => {
            let wanted = ctx.config.target_service;
            if let Some(t) = ctx.target.as_mut() {
                t.add_discovered(*service);
            }
            if *service != wanted {
                debug!("RESOLVING: {} also offers {}", peer, service);
                return None;
            }
            ctx.note(PairingNote::ServiceResolved {
                peer: *peer,
                service: *service,
            });
            ctx.queue(RadioCommand::Subscribe(*peer));
            Some(ConnectionState::Subscribed)
        }
        PairingEvent::Radio(RadioEvent::ServiceNotFound { peer }) if ctx.is_target(peer) => {
            warn!("RESOLVING: {} lacks {}", peer, ctx.config.target_service);
            ctx.reject(*peer);
            ctx.note(PairingNote::ServiceMissing { peer: *peer });
            Some(ConnectionState::Disconnected)
        }
        PairingEvent::Radio(RadioEvent::LinkLost { peer }) if ctx.is_target(peer) => {
            ctx.link_open = false;
            Some(ConnectionState::Disconnected)
        }
        PairingEvent::TransferFailed { peer } if ctx.is_target(peer) => {
            Some(ConnectionState::Disconnected)
        }
        other => {
            refuse_connection(ctx, other);
            None
        }
    }
}

fn resolving_tick(ctx: &mut PairingContext) -> Option<ConnectionState> {
    if ctx.ms_in_state() < u64::from(ctx.config.resolve_timeout_ms) {
        return None;
    }
    if let Some(peer) = ctx.target_addr() {
        warn!("RESOLVING: {} timed out", peer);
        ctx.note(PairingNote::ResolveTimedOut { peer });
    }
    Some(ConnectionState::Disconnected)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SUBSCRIBED — steady state
// ═══════════════════════════════════════════════════════════════════════════

fn subscribed_enter(ctx: &mut PairingContext) {
    if let Some(t) = &ctx.target {
        info!(
            "SUBSCRIBED: {} ({} services known)",
            t.address,
            t.discovered_services.len()
        );
    }
}

fn subscribed_event(ctx: &mut PairingContext, event: &PairingEvent) -> Option<ConnectionState> {
    match event {
        PairingEvent::Radio(RadioEvent::LinkLost { peer }) if ctx.is_target(peer) => {
            warn!("SUBSCRIBED: {} link lost", peer);
            ctx.link_open = false;
            Some(ConnectionState::Disconnected)
        }
        PairingEvent::TransferFailed { peer } if ctx.is_target(peer) => {
            warn!("SUBSCRIBED: transfer to {} refused, dropping link", peer);
            Some(ConnectionState::Disconnected)
        }
        PairingEvent::Radio(RadioEvent::Notification { peer, data }) if ctx.is_target(peer) => {
            ctx.note(PairingNote::PeripheralData {
                peer: *peer,
                data: data.clone(),
            });
            None
        }
        other => {
            refuse_connection(ctx, other);
            None
        }
    }
}

fn subscribed_tick(ctx: &mut PairingContext) -> Option<ConnectionState> {
    if ctx.config.heartbeat.is_some() {
        if let Some(peer) = ctx.target_addr() {
            ctx.queue(RadioCommand::Heartbeat(peer));
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTED — counts the failure, decides on the next maintenance tick
// ═══════════════════════════════════════════════════════════════════════════

fn disconnected_enter(ctx: &mut PairingContext) {
    ctx.release_link();
    ctx.retries = ctx.retries.saturating_add(1);
    info!(
        "DISCONNECTED: attempt {} of {}",
        ctx.retries, ctx.config.retry_ceiling
    );
}

fn disconnected_event(ctx: &mut PairingContext, event: &PairingEvent) -> Option<ConnectionState> {
    refuse_connection(ctx, event);
    None
}

fn disconnected_tick(ctx: &mut PairingContext) -> Option<ConnectionState> {
    if ctx.retries >= ctx.config.retry_ceiling {
        warn!("DISCONNECTED: retry ceiling reached, stopping");
        ctx.note(PairingNote::RetriesExhausted {
            attempts: ctx.retries,
        });
        return Some(ConnectionState::Idle);
    }
    ctx.note(PairingNote::RetryScheduled {
        attempt: ctx.retries,
    });
    Some(ConnectionState::Scanning)
}
