// src/core/model/comp.rs

//! Components and component types.
//!
//! A component materializes its attributes at create time, inheriting
//! anything it does not set from its component type. The `inherited` bitmap
//! records which attributes came from the type, so later type modifications
//! cascade only to instances that never overrode them.

use crate::core::model::dn::Dn;
use crate::core::model::states::{
    CompCapability, CompCategory, OperState, PresenceState, ProxyStatus, ReadinessState, Recovery,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

bitflags::bitflags! {
    /// Which component attributes were inherited from the component type.
    /// Stored on the component as a raw `u32` to keep the entity plainly
    /// serializable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InheritedAttrs: u32 {
        const INSTANTIATE_CMD   = 1 << 0;
        const TERMINATE_CMD     = 1 << 1;
        const CLEANUP_CMD       = 1 << 2;
        const AM_START_CMD      = 1 << 3;
        const AM_STOP_CMD       = 1 << 4;
        const HEALTHCHECK_CMD   = 1 << 5;
        const RECOVERY          = 1 << 6;
        const DISABLE_RESTART   = 1 << 7;
        const INST_NO_DELAY_MAX = 1 << 8;
        const INST_DELAY        = 1 << 9;
        const QUIESCING_TIMEOUT = 1 << 10;
        const CATEGORY          = 1 << 11;
        const CAPABILITY        = 1 << 12;
    }
}

/// One CLC-CLI command: executable, arguments, and per-step timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ClcCommand {
    pub cmd: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ClcCommand {
    pub fn new(cmd: impl Into<String>, timeout: Duration) -> Self {
        Self {
            cmd: cmd.into(),
            args: Vec::new(),
            timeout,
        }
    }
}

/// The full CLC-CLI command set of a component or component type.
#[derive(
    Debug, Clone, PartialEq, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct ClcCommands {
    pub instantiate: Option<ClcCommand>,
    pub terminate: Option<ClcCommand>,
    pub cleanup: Option<ClcCommand>,
    pub am_start: Option<ClcCommand>,
    pub am_stop: Option<ClcCommand>,
    pub healthcheck: Option<ClcCommand>,
}

/// Template holding defaults a component inherits when it sets nothing of
/// its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ComponentType {
    pub dn: Dn,
    pub category: CompCategory,
    pub capability: CompCapability,
    pub clc: ClcCommands,
    /// CS types instances of this type can take assignments for.
    pub cs_types: Vec<Dn>,
    pub default_recovery: Recovery,
    pub quiescing_complete_timeout: Duration,
    pub disable_restart: bool,
    pub max_instantiate_without_delay: Option<u32>,
    pub delay_between_instantiate_attempts: Option<Duration>,
}

impl ComponentType {
    pub fn new(dn: Dn, category: CompCategory, capability: CompCapability) -> Self {
        Self {
            dn,
            category,
            capability,
            clc: ClcCommands::default(),
            cs_types: Vec::new(),
            default_recovery: Recovery::ComponentFailover,
            quiescing_complete_timeout: Duration::from_secs(10),
            disable_restart: false,
            max_instantiate_without_delay: None,
            delay_between_instantiate_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Component {
    pub dn: Dn,
    pub su: Dn,
    pub comp_type: Dn,
    pub category: CompCategory,
    pub capability: CompCapability,
    pub clc: ClcCommands,
    /// CS types this component can take assignments for.
    pub cs_types: Vec<Dn>,
    /// Components of the same SU instantiate in ascending level order.
    pub instantiation_level: u32,
    pub max_instantiate_without_delay: u32,
    pub max_instantiate_with_delay: u32,
    pub delay_between_instantiate_attempts: Duration,
    /// How long a QUIESCING assignment may take before it is treated as
    /// failed.
    pub quiescing_complete_timeout: Duration,
    pub recovery_on_error: Recovery,
    pub disable_restart: bool,
    pub presence_state: PresenceState,
    pub oper_state: OperState,
    pub readiness_state: ReadinessState,
    pub restart_count: u32,
    pub proxy_status: ProxyStatus,
    pub current_proxy: Option<Dn>,
    /// Raw bits of [`InheritedAttrs`].
    pub inherited: u32,
}

impl Component {
    /// Builds a component from explicit attributes plus its type's defaults,
    /// recording in the bitmap which values were inherited.
    pub fn from_type(dn: Dn, su: Dn, ctype: &ComponentType) -> Self {
        let inherited = InheritedAttrs::INSTANTIATE_CMD
            | InheritedAttrs::TERMINATE_CMD
            | InheritedAttrs::CLEANUP_CMD
            | InheritedAttrs::AM_START_CMD
            | InheritedAttrs::AM_STOP_CMD
            | InheritedAttrs::HEALTHCHECK_CMD
            | InheritedAttrs::RECOVERY
            | InheritedAttrs::DISABLE_RESTART
            | InheritedAttrs::INST_NO_DELAY_MAX
            | InheritedAttrs::INST_DELAY
            | InheritedAttrs::QUIESCING_TIMEOUT
            | InheritedAttrs::CATEGORY
            | InheritedAttrs::CAPABILITY;
        Self {
            dn,
            su,
            comp_type: ctype.dn.clone(),
            category: ctype.category,
            capability: ctype.capability,
            clc: ctype.clc.clone(),
            cs_types: ctype.cs_types.clone(),
            instantiation_level: 0,
            max_instantiate_without_delay: 0,
            max_instantiate_with_delay: 0,
            delay_between_instantiate_attempts: Duration::from_secs(0),
            quiescing_complete_timeout: ctype.quiescing_complete_timeout,
            recovery_on_error: ctype.default_recovery.normalized(),
            disable_restart: ctype.disable_restart,
            presence_state: PresenceState::Uninstantiated,
            oper_state: OperState::Disabled,
            readiness_state: ReadinessState::OutOfService,
            restart_count: 0,
            proxy_status: ProxyStatus::Unproxied,
            current_proxy: None,
            inherited: inherited.bits(),
        }
    }

    pub fn inherited_attrs(&self) -> InheritedAttrs {
        InheritedAttrs::from_bits_truncate(self.inherited)
    }

    /// Marks an attribute as locally overridden.
    pub fn clear_inherited(&mut self, attr: InheritedAttrs) {
        self.inherited = (self.inherited_attrs() - attr).bits();
    }

    pub fn inherits(&self, attr: InheritedAttrs) -> bool {
        self.inherited_attrs().contains(attr)
    }
}
