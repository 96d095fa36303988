// src/core/model/assignment.rs

//! SU-SI assignment edges. Created by the assignment engine, destroyed on
//! unassign confirmation; neither endpoint owns them.

use crate::core::model::dn::Dn;
use crate::core::model::states::{AssignFsmState, HaState};
use serde::{Deserialize, Serialize};

/// Key of an assignment edge in the model's edge table.
pub type AssignmentKey = (Dn, Dn); // (su, si)

/// Pending CSI delta on an edge while a single-CSI add or remove is in
/// flight toward the node director.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum PendingCsiOp {
    Add,
    Remove,
}

/// Per-component-CSI edge nested inside an SU-SI assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct CompCsi {
    pub comp: Dn,
    pub csi: Dn,
    pub ha_state: HaState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SuSiAssignment {
    pub su: Dn,
    pub si: Dn,
    pub ha_state: HaState,
    pub fsm: AssignFsmState,
    pub pending_csi: Option<PendingCsiOp>,
    pub comp_csis: Vec<CompCsi>,
}

impl SuSiAssignment {
    pub fn new(su: Dn, si: Dn, ha_state: HaState) -> Self {
        Self {
            su,
            si,
            ha_state,
            fsm: AssignFsmState::Assigning,
            pending_csi: None,
            comp_csis: Vec::new(),
        }
    }

    pub fn key(&self) -> AssignmentKey {
        (self.su.clone(), self.si.clone())
    }

    /// An edge still waiting on the node director's acknowledgement.
    pub fn in_flight(&self) -> bool {
        self.fsm != AssignFsmState::Assigned
    }
}
