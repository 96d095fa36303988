// src/core/ckpt/active.rs

//! Active-side checkpoint producer.
//!
//! State-affecting model changes arrive on a FIFO from the director and are
//! drained in order to the standby as confirmed sends. Cold-sync, warm-sync
//! and data requests from the standby are served from a fresh model
//! snapshot obtained through the director queue.

use super::records::{CkptEnvelope, CkptMsg, CkptRecord, CKPT_MIN_VERSION};
use super::standby_dest;
use crate::core::bus::{codec, BusEnvelope, MessageBus, SVC_CKPT, VDest};
use crate::core::events::{Event, EventQueue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Per-record confirmation deadline toward the standby.
const UPDATE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);
/// Cold-sync transfer batch size.
const COLD_SYNC_BATCH: usize = 64;

pub struct CkptActive {
    bus: Arc<dyn MessageBus>,
    events: EventQueue,
    bus_rx: mpsc::Receiver<BusEnvelope>,
    my_dest: VDest,
    peer: VDest,
    /// Post-increment counter stamped on every async update; the standby
    /// verifies it during warm sync.
    sync_count: u64,
}

impl CkptActive {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        events: EventQueue,
        bus_rx: mpsc::Receiver<BusEnvelope>,
    ) -> Self {
        Self {
            bus,
            events,
            bus_rx,
            my_dest: super::active_dest(),
            peer: standby_dest(),
            sync_count: 0,
        }
    }

    /// Runs until cancelled by the replicator supervisor (role change or
    /// process shutdown drops the future).
    pub async fn run(mut self, record_rx: &mut mpsc::UnboundedReceiver<CkptRecord>) {
        info!("checkpoint producer running");
        loop {
            tokio::select! {
                Some(record) = record_rx.recv() => {
                    self.forward_update(record).await;
                }
                Some(envelope) = self.bus_rx.recv() => {
                    self.handle_peer(envelope, record_rx).await;
                }
            }
        }
    }

    async fn forward_update(&mut self, record: CkptRecord) {
        self.sync_count += 1;
        let msg = CkptEnvelope::new(CkptMsg::AsyncUpdate {
            record,
            sync_count: self.sync_count,
        });
        let Ok(payload) = codec::encode(&msg) else {
            warn!("failed to encode async update; record skipped");
            return;
        };
        // A missing or silent standby is not an error here: it will learn
        // the backlog through the next cold sync.
        if let Err(e) = self
            .bus
            .sync_send(
                &self.my_dest,
                &self.peer,
                SVC_CKPT,
                payload,
                UPDATE_CONFIRM_TIMEOUT,
            )
            .await
        {
            debug!(error = %e, "async update not confirmed by standby");
        }
    }

    async fn handle_peer(
        &mut self,
        mut envelope: BusEnvelope,
        record_rx: &mut mpsc::UnboundedReceiver<CkptRecord>,
    ) {
        let msg: CkptEnvelope = match codec::decode(&envelope.payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "undecodable checkpoint message from peer");
                return;
            }
        };
        if msg.peer_version < CKPT_MIN_VERSION {
            warn!(
                peer = msg.peer_version,
                minimum = CKPT_MIN_VERSION,
                "dropping message from incompatible peer"
            );
            return;
        }
        match msg.msg {
            CkptMsg::ColdSyncReq => {
                info!("cold sync requested by standby");
                self.serve_full_transfer(false, record_rx).await;
            }
            CkptMsg::DataReq => {
                info!("data request from standby");
                self.serve_full_transfer(true, record_rx).await;
            }
            CkptMsg::WarmSyncReq => {
                let reply = CkptEnvelope::new(CkptMsg::WarmSyncResp {
                    sync_count: self.sync_count,
                });
                if let Ok(payload) = codec::encode(&reply) {
                    if !envelope.respond(payload) {
                        debug!("warm sync reply arrived after the standby's deadline");
                    }
                }
            }
            other => {
                debug!(?other, "ignoring checkpoint message not meant for the active");
            }
        }
    }

    /// Serves a cold-sync or data-request transfer: pending async updates
    /// are folded into the counter first (the snapshot supersedes them),
    /// then the model image streams over in batches, leaves first.
    async fn serve_full_transfer(
        &mut self,
        data_req: bool,
        record_rx: &mut mpsc::UnboundedReceiver<CkptRecord>,
    ) {
        while let Ok(_superseded) = record_rx.try_recv() {
            self.sync_count += 1;
        }

        let (tx, rx) = oneshot::channel();
        self.events.post(Event::CkptSnapshot { reply: tx }).await;
        let records = match rx.await {
            Ok(records) => records,
            Err(_) => {
                warn!("director did not produce a snapshot; transfer aborted");
                return;
            }
        };
        let total = records.len();

        for chunk in records.chunks(COLD_SYNC_BATCH.max(1)) {
            let msg = if data_req {
                CkptMsg::DataResp { records: chunk.to_vec() }
            } else {
                CkptMsg::ColdSyncResp { records: chunk.to_vec() }
            };
            if !self.send_async(msg).await {
                return;
            }
        }
        let complete = if data_req {
            CkptMsg::DataRespComplete { sync_count: self.sync_count }
        } else {
            CkptMsg::ColdSyncComplete { sync_count: self.sync_count }
        };
        if self.send_async(complete).await {
            info!(records = total, sync_count = self.sync_count, "full transfer served");
        }
    }

    async fn send_async(&self, msg: CkptMsg) -> bool {
        let envelope = CkptEnvelope::new(msg);
        let Ok(payload) = codec::encode(&envelope) else {
            warn!("failed to encode checkpoint transfer message");
            return false;
        };
        if let Err(e) = self
            .bus
            .async_send(&self.my_dest, &self.peer, SVC_CKPT, payload)
            .await
        {
            warn!(error = %e, "checkpoint transfer send failed");
            return false;
        }
        true
    }
}
