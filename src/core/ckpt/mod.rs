// src/core/ckpt/mod.rs

//! AvD-to-AvD checkpoint replication.
//!
//! This module orchestrates the checkpoint subsystem: the active peer
//! produces records, the standby consumes them through an explicit
//! cold/warm/data-request sync state machine. Role changes are explicit
//! (triggered by the external availability supervisor) and re-enter the
//! matching worker without losing the record queue.

pub mod active;
pub mod records;
pub mod standby;

use crate::config::{CheckpointConfig, HaRole};
use crate::core::alarm::AlarmService;
use crate::core::bus::codec::WireKind;
use crate::core::bus::{MessageBus, SVC_CKPT, VDest};
use crate::core::ckpt::records::{CkptEnvelope, CkptRecord};
use crate::core::events::EventQueue;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

impl WireKind for CkptEnvelope {
    const KIND: u8 = 0x02;
}

/// Well-known virtual destinations for the checkpoint session. Roles move
/// between processes; the names do not.
pub fn active_dest() -> VDest {
    VDest::new("amfd-ckpt-active")
}
pub fn standby_dest() -> VDest {
    VDest::new("amfd-ckpt-standby")
}

/// Spawns the replicator supervisor: runs the role-appropriate worker and
/// switches workers when the director announces a role change. The record
/// queue survives switches; a fresh standby always cold-syncs.
#[allow(clippy::too_many_arguments)]
pub fn spawn_replicator(
    role: HaRole,
    bus: Arc<dyn MessageBus>,
    events: EventQueue,
    cfg: CheckpointConfig,
    alarms: AlarmService,
    record_rx: mpsc::UnboundedReceiver<CkptRecord>,
    role_rx: broadcast::Receiver<HaRole>,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(run_replicator(
        role, bus, events, cfg, alarms, record_rx, role_rx, shutdown_rx,
    ))
}

#[allow(clippy::too_many_arguments)]
async fn run_replicator(
    mut role: HaRole,
    bus: Arc<dyn MessageBus>,
    events: EventQueue,
    cfg: CheckpointConfig,
    alarms: AlarmService,
    mut record_rx: mpsc::UnboundedReceiver<CkptRecord>,
    mut role_rx: broadcast::Receiver<HaRole>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        match role {
            HaRole::Active => {
                info!("replicator entering ACTIVE role");
                let bus_rx = match bus.register(SVC_CKPT, active_dest()).await {
                    Ok(rx) => rx,
                    Err(e) => {
                        warn!(error = %e, "checkpoint registration failed");
                        return;
                    }
                };
                let worker = active::CkptActive::new(bus.clone(), events.clone(), bus_rx);
                tokio::select! {
                    _ = worker.run(&mut record_rx) => return,
                    new_role = role_rx.recv() => {
                        match new_role {
                            Ok(r) => role = r,
                            Err(_) => return,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("replicator shutting down");
                        return;
                    }
                }
            }
            HaRole::Standby => {
                info!("replicator entering STANDBY role");
                let bus_rx = match bus.register(SVC_CKPT, standby_dest()).await {
                    Ok(rx) => rx,
                    Err(e) => {
                        warn!(error = %e, "checkpoint registration failed");
                        return;
                    }
                };
                let worker = standby::CkptStandby::new(
                    bus.clone(),
                    events.clone(),
                    cfg.clone(),
                    alarms.clone(),
                    bus_rx,
                );
                tokio::select! {
                    _ = worker.run() => return,
                    new_role = role_rx.recv() => {
                        match new_role {
                            Ok(r) => role = r,
                            Err(_) => return,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("replicator shutting down");
                        return;
                    }
                }
            }
        }
    }
}
