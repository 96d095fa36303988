// src/core/model/nodegroup.rs

//! Node groups: named sets of node references with group-wide admin state.

use crate::core::model::dn::Dn;
use crate::core::model::states::AdminState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct NodeGroup {
    pub dn: Dn,
    pub admin_state: AdminState,
    /// Member node references, insertion order preserved.
    pub nodes: Vec<Dn>,
    /// Nodes still being walked by an in-flight group-wide admin operation.
    pub oper_list: Vec<Dn>,
    pub admin_pending: Option<u64>,
}

impl NodeGroup {
    pub fn new(dn: Dn, nodes: Vec<Dn>) -> Self {
        Self {
            dn,
            admin_state: AdminState::Unlocked,
            nodes,
            oper_list: Vec::new(),
            admin_pending: None,
        }
    }

    pub fn contains(&self, node: &Dn) -> bool {
        self.nodes.iter().any(|n| n == node)
    }
}
