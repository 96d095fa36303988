// src/core/model/su.rs

//! Service units: the smallest failover unit inside a service group.

use crate::core::model::dn::Dn;
use crate::core::model::states::{AdminState, OperState, PresenceState, ReadinessState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Su {
    pub dn: Dn,
    pub sg: Dn,
    pub node: Dn,
    /// Set when the hosting node was resolved through a node group; the
    /// group cannot be deleted while this mapping exists.
    pub node_group: Option<Dn>,
    /// SU type reference, used for component cardinality limits.
    pub su_type: Option<Dn>,
    /// Rank within the SG; lower value is preferred.
    pub rank: u32,
    /// Derived from the contained component categories.
    pub preinstantiable: bool,
    /// Middleware (NCS) SU flag, inherited from its SG.
    pub middleware: bool,
    pub admin_state: AdminState,
    pub oper_state: OperState,
    pub presence_state: PresenceState,
    pub readiness_state: ReadinessState,
    pub restart_count: u32,
    /// Set while the SU is being administratively terminated.
    pub term_state: bool,
    /// Transient marker set mid-restart so intermediate presence changes are
    /// not treated as faults.
    pub surestart: bool,
    pub admin_pending: Option<u64>,
}

impl Su {
    pub fn new(dn: Dn, sg: Dn, node: Dn, rank: u32) -> Self {
        Self {
            dn,
            sg,
            node,
            node_group: None,
            su_type: None,
            rank,
            preinstantiable: false,
            middleware: false,
            admin_state: AdminState::Unlocked,
            oper_state: OperState::Disabled,
            presence_state: PresenceState::Uninstantiated,
            readiness_state: ReadinessState::OutOfService,
            restart_count: 0,
            term_state: false,
            surestart: false,
            admin_pending: None,
        }
    }

    pub fn is_in_service(&self) -> bool {
        self.readiness_state == ReadinessState::InService
    }
}
