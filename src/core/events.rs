// src/core/events.rs

//! The director's inbound event queue.
//!
//! Every external stimulus — CCB callbacks, admin operations, node director
//! messages, timer expiries, replicator requests — is serialized through
//! one channel and processed to completion by the director task, which is
//! the only owner of the entity model.

use crate::core::admin::AdminRequest;
use crate::core::avnd::msg::AvndToAvd;
use crate::core::ckpt::records::CkptRecord;
use crate::core::errors::AmfResult;
use crate::core::imm::ccb::CcbOp;
use crate::core::model::ModelSnapshot;
use crate::core::model::dn::Dn;
use crate::config::HaRole;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Queue depth for the director task. Bursts beyond this apply natural
/// backpressure on the producers.
const EVENT_QUEUE_CAPACITY: usize = 4096;

/// A synthetic timer expiry posted back onto the queue.
#[derive(Debug, Clone)]
pub enum TimerEvent {
    /// A dependent SI's sponsor outage tolerance ran out.
    SiDepTolerance { si: Dn },
    /// An admin operation exceeded its completion budget.
    AdminOpTimeout { invocation: u64 },
    /// A node's SU-failover probation window closed.
    SuFailoverProbation { node: Dn },
    /// An SU's restart probation window closed.
    SuRestartProbation { su: Dn },
    /// An SU's component-restart probation window closed.
    CompRestartProbation { su: Dn },
    /// A component's delayed instantiation attempt is due.
    CompInstantiateDelay { comp: Dn },
}

/// Everything the director task can be asked to do.
#[derive(Debug)]
pub enum Event {
    /// A configuration change bundle: validate, then apply or abort.
    Ccb {
        ccb_id: u64,
        ops: Vec<CcbOp>,
        reply: oneshot::Sender<AmfResult<()>>,
    },
    /// Synchronous runtime-attribute read from the object store.
    RuntimeRead {
        dn: Dn,
        attr: String,
        reply: oneshot::Sender<AmfResult<String>>,
    },
    /// Administrative operation on a named object.
    AdminOp {
        req: AdminRequest,
        reply: oneshot::Sender<AmfResult<()>>,
    },
    /// A message from a node director.
    Avnd(AvndToAvd),
    Timer(TimerEvent),
    /// Replicator requests the cold-sync image of the model.
    CkptSnapshot {
        reply: oneshot::Sender<Vec<CkptRecord>>,
    },
    /// Standby only: apply replicated records to the local model.
    CkptApply { records: Vec<CkptRecord> },
    /// Standby only: discard the model ahead of a full resync.
    CkptReset,
    RoleChange(HaRole),
    /// Write one record to a log stream.
    LogWrite {
        stream: String,
        severity: u32,
        record: String,
        reply: oneshot::Sender<AmfResult<()>>,
    },
    /// Full-model image for verification and peer comparison.
    ModelInspect {
        reply: oneshot::Sender<ModelSnapshot>,
    },
    Shutdown,
}

/// Cloneable handle used by every producer to reach the director task.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<Event>,
}

impl EventQueue {
    pub fn new() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    pub async fn post(&self, event: Event) {
        if self.tx.send(event).await.is_err() {
            warn!("director queue closed; event dropped");
        }
    }

    pub fn try_post(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            warn!("director queue full or closed; event dropped");
        }
    }

    /// Arms a one-shot timer that posts `event` after `delay`. There is no
    /// pre-emptive cancellation; stale expiries are filtered by the state
    /// machines that consume them.
    pub fn arm_timer(&self, delay: Duration, event: TimerEvent) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Event::Timer(event)).await;
        });
    }
}
