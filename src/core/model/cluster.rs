// src/core/model/cluster.rs

//! The cluster singleton.

use crate::core::model::dn::Dn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cluster-wide configuration object. Exactly one exists in a valid model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Cluster {
    pub dn: Dn,
    /// How long the director waits for nodes to join before declaring the
    /// initial cluster view complete.
    pub startup_timeout: Duration,
    /// Timestamp (SaTimeT nanoseconds) of the initial view; 0 until formed.
    pub init_view_time: i64,
}

impl Cluster {
    pub fn new(dn: Dn, startup_timeout: Duration) -> Self {
        Self {
            dn,
            startup_timeout,
            init_view_time: 0,
        }
    }
}
