// src/core/model/node.rs

//! Cluster node entities.

use crate::core::model::dn::Dn;
use crate::core::model::states::{AdminState, NodeState, OperState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cluster node. Hosted SUs are not owned here; they are resolved through
/// the model by the `sus_on_node` query so that ownership stays with the
/// per-kind tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Node {
    pub dn: Dn,
    /// Reference to the CLM membership object for this node.
    pub clm_node: Option<Dn>,
    pub admin_state: AdminState,
    pub oper_state: OperState,
    pub node_state: NodeState,
    /// SU failover escalation: probation window and maximum count.
    pub su_failover_prob: Duration,
    pub su_failover_max: u32,
    /// Failovers observed inside the current probation window.
    pub su_failover_count: u32,
    pub auto_repair: bool,
    pub failfast_on_termination_failure: bool,
    pub failfast_on_instantiation_failure: bool,
    /// Invocation id of an admin operation currently in progress, if any.
    pub admin_pending: Option<u64>,
}

impl Node {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            clm_node: None,
            admin_state: AdminState::Unlocked,
            oper_state: OperState::Disabled,
            node_state: NodeState::Absent,
            su_failover_prob: Duration::from_secs(0),
            su_failover_max: 0,
            su_failover_count: 0,
            auto_repair: true,
            failfast_on_termination_failure: false,
            failfast_on_instantiation_failure: false,
            admin_pending: None,
        }
    }

    /// Whether the node can be removed: requires LOCKED-INSTANTIATION and no
    /// hosted SUs (the SU check lives in the model, which owns the SU table).
    pub fn is_removable(&self) -> bool {
        self.admin_state == AdminState::LockedInstantiation
    }
}
