// src/core/ckpt/standby.rs

//! Standby-side checkpoint consumer.
//!
//! Per peer session the standby runs an explicit sync state machine:
//!
//! WAIT-FOR-COLD-SYNC -> COLD-SYNC-IN-PROGRESS -> STEADY-IN-SYNC
//!   <-> WAIT-TO-WARM-SYNC <-> VERIFY-WARM-SYNC-DATA -> WAIT-FOR-DATA-RESP
//!
//! Undecodable cold-sync records restart the cold sync; an undecodable
//! warm-sync response escalates to a data request; a data-response timeout
//! declares the peer unreachable.

use super::records::{CkptEnvelope, CkptMsg, CkptRecord, CKPT_MIN_VERSION};
use crate::config::CheckpointConfig;
use crate::core::alarm::{Alarm, AlarmService};
use crate::core::bus::{codec, BusEnvelope, MessageBus, SVC_CKPT, VDest};
use crate::core::events::{Event, EventQueue};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum SyncState {
    WaitForColdSync,
    ColdSyncInProgress,
    SteadyInSync,
    WaitToWarmSync,
    VerifyWarmSyncData,
    WaitForDataResp,
}

pub struct CkptStandby {
    bus: Arc<dyn MessageBus>,
    events: EventQueue,
    cfg: CheckpointConfig,
    alarms: AlarmService,
    bus_rx: mpsc::Receiver<BusEnvelope>,
    my_dest: VDest,
    peer: VDest,
    state: SyncState,
    /// Highest counter value observed from the active.
    sync_count: u64,
    /// Deadline for the current cold-sync or data-response wait.
    deadline: Option<Instant>,
}

impl CkptStandby {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        events: EventQueue,
        cfg: CheckpointConfig,
        alarms: AlarmService,
        bus_rx: mpsc::Receiver<BusEnvelope>,
    ) -> Self {
        Self {
            bus,
            events,
            cfg,
            alarms,
            bus_rx,
            my_dest: super::standby_dest(),
            peer: super::active_dest(),
            state: SyncState::WaitForColdSync,
            sync_count: 0,
            deadline: None,
        }
    }

    /// Runs until cancelled by the replicator supervisor.
    pub async fn run(mut self) {
        info!("checkpoint consumer running");
        self.request_cold_sync().await;

        let mut warm_tick = tokio::time::interval(self.cfg.warm_sync_interval);
        warm_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            // A disabled deadline parks the timer branch far in the future.
            let far = Instant::now() + Duration::from_secs(3600);
            let next_deadline = self.deadline.unwrap_or(far);

            tokio::select! {
                Some(envelope) = self.bus_rx.recv() => {
                    self.handle_peer(envelope).await;
                }
                _ = warm_tick.tick(), if self.state == SyncState::SteadyInSync => {
                    self.warm_sync_probe().await;
                }
                _ = sleep_until(next_deadline), if self.deadline.is_some() => {
                    self.handle_deadline().await;
                }
            }
        }
    }

    async fn request_cold_sync(&mut self) {
        self.state = SyncState::WaitForColdSync;
        self.deadline = Some(Instant::now() + self.cfg.cold_sync_timeout);
        self.events.post(Event::CkptReset).await;
        self.send(CkptMsg::ColdSyncReq).await;
        info!(state = %self.state, "cold sync requested");
    }

    async fn request_data_resync(&mut self) {
        self.state = SyncState::WaitForDataResp;
        self.deadline = Some(Instant::now() + self.cfg.data_resp_timeout);
        self.events.post(Event::CkptReset).await;
        self.send(CkptMsg::DataReq).await;
        info!(state = %self.state, "data resync requested");
    }

    async fn handle_deadline(&mut self) {
        self.deadline = None;
        match self.state {
            SyncState::WaitForColdSync | SyncState::ColdSyncInProgress => {
                warn!("cold sync incomplete; re-requesting");
                self.request_cold_sync().await;
            }
            SyncState::WaitForDataResp => {
                warn!("data response overdue; peer declared unreachable");
                self.alarms.emit(Alarm::PeerUnreachable);
                self.state = SyncState::WaitForColdSync;
                self.request_cold_sync().await;
            }
            _ => {}
        }
    }

    /// Periodic warm sync: ask the active for its counter and compare.
    async fn warm_sync_probe(&mut self) {
        self.state = SyncState::WaitToWarmSync;
        let request = CkptEnvelope::new(CkptMsg::WarmSyncReq);
        let Ok(payload) = codec::encode(&request) else {
            self.state = SyncState::SteadyInSync;
            return;
        };
        let reply = self
            .bus
            .sync_send(
                &self.my_dest,
                &self.peer,
                SVC_CKPT,
                payload,
                self.cfg.warm_sync_interval,
            )
            .await;
        self.state = SyncState::VerifyWarmSyncData;
        match reply {
            Ok(bytes) => match codec::decode::<CkptEnvelope>(&bytes) {
                Ok(CkptEnvelope {
                    msg: CkptMsg::WarmSyncResp { sync_count },
                    ..
                }) => {
                    if sync_count == self.sync_count {
                        debug!(sync_count, "warm sync verified");
                        self.state = SyncState::SteadyInSync;
                    } else {
                        warn!(
                            active = sync_count,
                            standby = self.sync_count,
                            "warm sync mismatch; discarding model for resync"
                        );
                        self.request_data_resync().await;
                    }
                }
                _ => {
                    warn!("undecodable warm sync response; requesting data resync");
                    self.request_data_resync().await;
                }
            },
            Err(e) => {
                debug!(error = %e, "warm sync probe failed; staying in sync state");
                self.state = SyncState::SteadyInSync;
            }
        }
    }

    async fn handle_peer(&mut self, mut envelope: BusEnvelope) {
        let msg: CkptEnvelope = match codec::decode(&envelope.payload) {
            Ok(m) => m,
            Err(e) => {
                // An undecodable record mid cold sync restarts the whole
                // transfer; in steady state it escalates to a data request.
                warn!(error = %e, state = %self.state, "undecodable checkpoint record");
                match self.state {
                    SyncState::WaitForColdSync | SyncState::ColdSyncInProgress => {
                        self.request_cold_sync().await
                    }
                    _ => self.request_data_resync().await,
                }
                return;
            }
        };
        if msg.peer_version < CKPT_MIN_VERSION {
            warn!(
                peer = msg.peer_version,
                minimum = CKPT_MIN_VERSION,
                "record from incompatible peer dropped; initiating full resync"
            );
            self.request_cold_sync().await;
            return;
        }

        match msg.msg {
            CkptMsg::AsyncUpdate { record, sync_count } => {
                self.apply(vec![record]).await;
                self.sync_count = sync_count;
                // Confirm receipt so the active's send completes.
                envelope.respond(Bytes::new());
            }
            CkptMsg::ColdSyncResp { records } => {
                self.state = SyncState::ColdSyncInProgress;
                self.deadline = Some(Instant::now() + self.cfg.cold_sync_timeout);
                self.apply(records).await;
            }
            CkptMsg::ColdSyncComplete { sync_count } => {
                self.sync_count = sync_count;
                self.state = SyncState::SteadyInSync;
                self.deadline = None;
                info!(sync_count, "cold sync complete; standby in sync");
            }
            CkptMsg::DataResp { records } => {
                self.deadline = Some(Instant::now() + self.cfg.data_resp_timeout);
                self.apply(records).await;
            }
            CkptMsg::DataRespComplete { sync_count } => {
                self.sync_count = sync_count;
                self.state = SyncState::SteadyInSync;
                self.deadline = None;
                info!(sync_count, "data resync complete; standby in sync");
            }
            other => {
                debug!(?other, "ignoring checkpoint message not meant for the standby");
            }
        }
    }

    async fn apply(&self, records: Vec<CkptRecord>) {
        if records.is_empty() {
            return;
        }
        self.events.post(Event::CkptApply { records }).await;
    }

    async fn send(&self, msg: CkptMsg) {
        let envelope = CkptEnvelope::new(msg);
        let Ok(payload) = codec::encode(&envelope) else { return };
        if let Err(e) = self
            .bus
            .async_send(&self.my_dest, &self.peer, SVC_CKPT, payload)
            .await
        {
            debug!(error = %e, "checkpoint control message not delivered");
        }
    }
}
