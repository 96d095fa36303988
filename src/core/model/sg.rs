// src/core/model/sg.rs

//! Service groups: redundancy domains owning sets of SUs and SIs.

use crate::core::model::dn::Dn;
use crate::core::model::states::{AdminState, RedundancyModel, SgFsmState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Sg {
    pub dn: Dn,
    pub app: Option<Dn>,
    pub redundancy_model: RedundancyModel,
    pub pref_inservice_sus: u32,
    pub pref_assigned_sus: u32,
    pub pref_active_sus: u32,
    pub pref_standby_sus: u32,
    /// SU restart escalation: probation window and maximum count.
    pub su_restart_prob: Duration,
    pub su_restart_max: u32,
    /// Component restart escalation within SUs of this group.
    pub comp_restart_prob: Duration,
    pub comp_restart_max: u32,
    pub auto_adjust: bool,
    pub auto_repair: bool,
    pub admin_state: AdminState,
    pub fsm_state: SgFsmState,
    /// SUs with an outstanding assignment operation; the SG stays in
    /// SG-REALIGN until every one of them has replied or timed out.
    pub su_oper_list: Vec<Dn>,
    /// SI under an SI-scoped operation (SI-OPER / ADMIN states).
    pub admin_si: Option<Dn>,
    /// True for middleware (NCS) groups hosting the infrastructure itself.
    pub middleware: bool,
    pub admin_pending: Option<u64>,
}

impl Sg {
    pub fn new(dn: Dn, redundancy_model: RedundancyModel) -> Self {
        Self {
            dn,
            app: None,
            redundancy_model,
            pref_inservice_sus: 0,
            pref_assigned_sus: 0,
            pref_active_sus: 1,
            pref_standby_sus: 1,
            su_restart_prob: Duration::from_secs(0),
            su_restart_max: 0,
            comp_restart_prob: Duration::from_secs(0),
            comp_restart_max: 0,
            auto_adjust: false,
            auto_repair: true,
            admin_state: AdminState::Unlocked,
            fsm_state: SgFsmState::Stable,
            su_oper_list: Vec::new(),
            admin_si: None,
            middleware: false,
            admin_pending: None,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.fsm_state == SgFsmState::Stable
    }

    /// Records an SU on the operation list, keeping entries unique.
    pub fn oper_list_add(&mut self, su: &Dn) {
        if !self.su_oper_list.iter().any(|d| d == su) {
            self.su_oper_list.push(su.clone());
        }
    }

    /// Removes an SU from the operation list; returns true when the list
    /// drained to empty with this removal.
    pub fn oper_list_remove(&mut self, su: &Dn) -> bool {
        self.su_oper_list.retain(|d| d != su);
        self.su_oper_list.is_empty()
    }
}
