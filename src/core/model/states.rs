// src/core/model/states.rs

//! The state enums shared across the entity model. Values and transitions
//! follow the AMF information model; every enum is wire-visible and carried
//! in checkpoint records.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, strum_macros::EnumString, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum AdminState {
    #[default]
    Unlocked,
    Locked,
    LockedInstantiation,
    ShuttingDown,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum OperState {
    Enabled,
    #[default]
    Disabled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum ReadinessState {
    #[default]
    OutOfService,
    InService,
    Stopping,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum PresenceState {
    #[default]
    Uninstantiated,
    Instantiating,
    Instantiated,
    Terminating,
    Restarting,
    InstantiationFailed,
    TerminationFailed,
}

impl PresenceState {
    /// Terminal-repair states: the entity stays here until repaired.
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            PresenceState::InstantiationFailed | PresenceState::TerminationFailed
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum NodeState {
    #[default]
    Absent,
    NoConfig,
    Present,
    GoDown,
    ShuttingDown,
    NcsInit,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum HaState {
    Active,
    #[default]
    Standby,
    Quiesced,
    Quiescing,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum AssignmentState {
    #[default]
    Unassigned,
    PartiallyAssigned,
    FullyAssigned,
}

/// Per-edge FSM state of an SU-SI assignment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum AssignFsmState {
    #[default]
    Assigned,
    Assigning,
    Unassigning,
    Modifying,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum SgFsmState {
    #[default]
    Stable,
    SgRealign,
    SuOper,
    SiOper,
    Admin,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, strum_macros::EnumString, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum RedundancyModel {
    #[default]
    TwoN,
    NPlusM,
    NWay,
    NWayActive,
    NoRedundancy,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, strum_macros::EnumString, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum CompCategory {
    #[default]
    SaAware,
    ProxiedLocalPreInst,
    ProxiedLocalNonPreInst,
    ExternalPreInst,
    ExternalNonPreInst,
    NonSaf,
}

impl CompCategory {
    /// Pre-instantiable components are brought up before any workload is
    /// assigned; the SU-level flag is derived from this.
    pub fn is_preinstantiable(self) -> bool {
        matches!(
            self,
            CompCategory::SaAware
                | CompCategory::ProxiedLocalPreInst
                | CompCategory::ExternalPreInst
        )
    }

    pub fn is_proxied(self) -> bool {
        matches!(
            self,
            CompCategory::ProxiedLocalPreInst
                | CompCategory::ProxiedLocalNonPreInst
                | CompCategory::ExternalPreInst
                | CompCategory::ExternalNonPreInst
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, strum_macros::EnumString, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum CompCapability {
    #[default]
    OneActiveOrOneStandby,
    OneActiveOrYStandby,
    XActiveAndYStandby,
    OneActive,
    XActive,
    NonPreInstantiable,
}

impl CompCapability {
    /// Whether this capability model admits standby assignments at all.
    pub fn supports_standby(self) -> bool {
        matches!(
            self,
            CompCapability::OneActiveOrOneStandby
                | CompCapability::OneActiveOrYStandby
                | CompCapability::XActiveAndYStandby
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, strum_macros::EnumString, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum Recovery {
    NoRecommendation,
    #[default]
    ComponentRestart,
    ComponentFailover,
    NodeSwitchover,
    NodeFailover,
    NodeFailfast,
    ClusterReset,
}

impl Recovery {
    /// NO-RECOMMENDATION is never stored; it is promoted at load and on
    /// every modify.
    pub fn normalized(self) -> Recovery {
        if self == Recovery::NoRecommendation {
            Recovery::ComponentFailover
        } else {
            self
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Display, Default,
)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum ProxyStatus {
    #[default]
    Unproxied,
    Proxied,
}
