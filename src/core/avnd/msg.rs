// src/core/avnd/msg.rs

//! Director-to-node and node-to-director messages.

use crate::core::bus::codec::WireKind;
use crate::core::engine::AssignOp;
use crate::core::model::comp::Component;
use crate::core::model::dn::Dn;
use crate::core::model::states::{HaState, OperState, PresenceState, Recovery};
use serde::{Deserialize, Serialize};

/// Orders from the availability director to a node director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum AvdToAvnd {
    /// Push (or refresh) the configuration of one component on this node.
    CompConfig(Box<Component>),
    /// Drop a component from the node registry.
    CompDelete { comp: Dn },
    /// Bring up every component of the SU, in instantiation-level order.
    InstantiateSu { su: Dn },
    /// Take down every component of the SU, highest level first.
    TerminateSu { su: Dn },
    /// One SU-SI assignment change.
    SuAssign {
        su: Dn,
        si: Dn,
        ha: HaState,
        op: AssignOp,
    },
    RestartComp { comp: Dn },
    CleanupComp { comp: Dn },
    /// Escalated repair: reboot the node.
    Reboot,
}

impl WireKind for AvdToAvnd {
    const KIND: u8 = 0x10;
}

/// Reports from a node director back to the availability director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum AvndToAvd {
    /// First contact after the node director starts.
    NodeUp { node: Dn },
    CompPresence {
        node: Dn,
        comp: Dn,
        state: PresenceState,
    },
    CompOperState {
        node: Dn,
        comp: Dn,
        state: OperState,
    },
    SuPresence {
        node: Dn,
        su: Dn,
        state: PresenceState,
    },
    /// Completion of an [`AvdToAvnd::SuAssign`] order.
    SuAssignResult {
        node: Dn,
        su: Dn,
        si: Dn,
        op: AssignOp,
        ok: bool,
    },
    /// Completion of an SU termination order.
    SuTerminated { node: Dn, su: Dn, ok: bool },
    /// Completion of an SU instantiation order.
    SuInstantiated { node: Dn, su: Dn, ok: bool },
    /// Completion of a component restart order.
    CompRestarted { node: Dn, comp: Dn, ok: bool },
    /// A component error with the recommended recovery.
    ErrorReport {
        node: Dn,
        comp: Dn,
        recovery: Recovery,
    },
    /// A proxy took (or re-took) responsibility for a proxied component.
    ProxyRegistered {
        node: Dn,
        proxy: Dn,
        proxied: Dn,
    },
    /// A proxied component lost its proxy.
    CompOrphaned { node: Dn, comp: Dn },
}

impl WireKind for AvndToAvd {
    const KIND: u8 = 0x11;
}
