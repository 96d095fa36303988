// src/core/bus/mod.rs

//! The message bus adapter: reliable datagram delivery between virtual
//! destinations, hiding physical node identity so active/standby roles can
//! move without address renegotiation.
//!
//! Three primitives: a deadline-bounded sync send with reply correlation,
//! a fire-and-forget async send, and a best-effort broadcast to all
//! subscribers of a service id.

pub mod codec;
pub mod local;

use crate::core::errors::AmfResult;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Service identifiers multiplexed over one bus.
pub const SVC_AVND: u16 = 1;
pub const SVC_CKPT: u16 = 2;

/// A location-transparent destination name.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct VDest(pub String);

impl VDest {
    pub fn new(name: impl Into<String>) -> Self {
        VDest(name.into())
    }
}

impl fmt::Display for VDest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One delivered message. `reply` is present exactly when the sender used
/// `sync_send` and is still waiting.
#[derive(Debug)]
pub struct BusEnvelope {
    pub service: u16,
    pub from: VDest,
    pub payload: Bytes,
    pub reply: Option<oneshot::Sender<Bytes>>,
}

impl BusEnvelope {
    /// Answers a sync send; returns false when the caller already timed out.
    pub fn respond(&mut self, payload: Bytes) -> bool {
        match self.reply.take() {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }
}

/// The transport abstraction. The in-process [`local::LocalBus`] is the
/// only implementation shipped; a networked transport plugs in here.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Registers a destination for a service and returns its delivery queue.
    /// Re-registering an existing destination replaces the queue, which is
    /// how a restarted endpoint reconnects.
    async fn register(
        &self,
        service: u16,
        dest: VDest,
    ) -> AmfResult<mpsc::Receiver<BusEnvelope>>;

    async fn unregister(&self, dest: &VDest) -> AmfResult<()>;

    /// One request, one correlated response, bounded by `timeout`.
    async fn sync_send(
        &self,
        from: &VDest,
        to: &VDest,
        service: u16,
        payload: Bytes,
        timeout: Duration,
    ) -> AmfResult<Bytes>;

    /// Reliable fire-and-forget to one destination.
    async fn async_send(
        &self,
        from: &VDest,
        to: &VDest,
        service: u16,
        payload: Bytes,
    ) -> AmfResult<()>;

    /// Best-effort delivery to every registered destination of `service`
    /// except the sender.
    async fn broadcast(&self, from: &VDest, service: u16, payload: Bytes) -> AmfResult<()>;
}
