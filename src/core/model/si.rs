// src/core/model/si.rs

//! Service instances: units of workload distributed across an SG's SUs.

use crate::core::model::dn::Dn;
use crate::core::model::states::{AdminState, AssignmentState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A sponsor dependency: this SI may only be assigned active once the
/// sponsor is fully assigned active. `tolerance` bounds how long dependents
/// survive a sponsor outage before being unassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SiDependency {
    pub sponsor: Dn,
    pub tolerance: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Si {
    pub dn: Dn,
    pub sg: Dn,
    pub svc_type: Option<Dn>,
    /// `0` is lowest priority; otherwise lower numeric value ranks first.
    pub rank: u32,
    pub pref_active_assignments: u32,
    pub pref_standby_assignments: u32,
    pub num_curr_active: u32,
    pub num_curr_standby: u32,
    pub admin_state: AdminState,
    pub assignment_state: AssignmentState,
    pub deps: Vec<SiDependency>,
    /// Explicitly ranked preferred SUs, (su, rank) pairs.
    pub ranked_sus: Vec<(Dn, u32)>,
    /// True while the SI-unassigned alarm is outstanding.
    pub alarm_sent: bool,
    pub admin_pending: Option<u64>,
}

impl Si {
    pub fn new(dn: Dn, sg: Dn) -> Self {
        Self {
            dn,
            sg,
            svc_type: None,
            rank: 0,
            pref_active_assignments: 1,
            pref_standby_assignments: 1,
            num_curr_active: 0,
            num_curr_standby: 0,
            admin_state: AdminState::Unlocked,
            assignment_state: AssignmentState::Unassigned,
            deps: Vec::new(),
            ranked_sus: Vec::new(),
            alarm_sent: false,
            admin_pending: None,
        }
    }

    /// Sort key honoring the convention that rank 0 means lowest priority.
    pub fn effective_rank(&self) -> u32 {
        if self.rank == 0 { u32::MAX } else { self.rank }
    }

    pub fn is_assigned(&self) -> bool {
        self.assignment_state != AssignmentState::Unassigned
    }

    pub fn depends_on(&self, sponsor: &Dn) -> bool {
        self.deps.iter().any(|d| &d.sponsor == sponsor)
    }
}
