// src/core/alarm.rs

//! Alarm and state-change notification emission.
//!
//! The director has no NTF broker of its own; alarms are structured log
//! events plus a broadcast channel that tests and an external notification
//! forwarder can subscribe to.

use crate::core::model::dn::Dn;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

const ALARM_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Alarm {
    /// An SI lost all of its assignments.
    SiUnassigned(Dn),
    /// A previously raised SI-unassigned alarm is cleared.
    SiUnassignedCleared(Dn),
    CompInstantiationFailed(Dn),
    CompTerminationFailed(Dn),
    /// A proxied component lost its proxy.
    CompOrphaned(Dn),
    SuAdminOperationFailed(Dn),
    /// The repair escalation decided to reboot a node.
    NodeRebootOrdered(Dn),
    ClusterResetOrdered,
    /// The checkpoint peer stopped answering.
    PeerUnreachable,
}

impl Alarm {
    fn is_clear(&self) -> bool {
        matches!(self, Alarm::SiUnassignedCleared(_))
    }
}

/// Fans alarms out to log output and any registered subscribers.
#[derive(Debug, Clone)]
pub struct AlarmService {
    tx: broadcast::Sender<Alarm>,
}

impl Default for AlarmService {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmService {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(ALARM_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn emit(&self, alarm: Alarm) {
        if alarm.is_clear() {
            info!(?alarm, "notification");
        } else {
            warn!(?alarm, "alarm");
        }
        // No subscribers is fine; the log line above is the primary sink.
        let _ = self.tx.send(alarm);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alarm> {
        self.tx.subscribe()
    }
}
