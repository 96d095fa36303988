// src/core/avnd/presence.rs

//! The per-component presence-state machine and its retry policy.
//!
//! UNINSTANTIATED -> INSTANTIATING -> INSTANTIATED -> TERMINATING -> UNINSTANTIATED
//! INSTANTIATED <-> RESTARTING, and the terminal-repair states
//! INSTANTIATION-FAILED / TERMINATION-FAILED.
//!
//! Instantiation retries run back-to-back up to the component's
//! `max-instantiate-without-delay`, then with `delay-between-instantiate-
//! attempts` between further tries, then give up into the failed state.

use super::clc::{ClcOutcome, ClcStep};
use crate::core::model::comp::Component;
use crate::core::model::states::PresenceState;
use std::time::Duration;
use tracing::{debug, warn};

/// Node-side record of one component.
#[derive(Debug, Clone)]
pub struct AvndComp {
    pub config: Component,
    pub presence: PresenceState,
    /// Instantiation attempts since the last successful instantiation.
    pub inst_attempts: u32,
    /// A restart is in flight: after termination completes, instantiate
    /// again instead of staying down.
    pub restarting: bool,
}

impl AvndComp {
    pub fn new(config: Component) -> Self {
        Self {
            config,
            presence: PresenceState::Uninstantiated,
            inst_attempts: 0,
            restarting: false,
        }
    }
}

/// What the node director must do after a state-machine step.
#[derive(Debug, Clone, PartialEq)]
pub enum CompEffect {
    /// Run the named CLC step for this component.
    Exec(ClcStep),
    /// Schedule a delayed instantiation attempt.
    RetryAfter(Duration),
    /// The presence state changed; report it upward.
    Became(PresenceState),
    /// A healthcheck failed; report an error with the default recovery.
    HealthcheckFailed,
}

/// Kick off instantiation of an uninstantiated component.
pub fn start_instantiate(comp: &mut AvndComp) -> Vec<CompEffect> {
    match comp.presence {
        PresenceState::Uninstantiated => {
            comp.presence = PresenceState::Instantiating;
            comp.inst_attempts = 0;
            vec![
                CompEffect::Became(PresenceState::Instantiating),
                CompEffect::Exec(ClcStep::Instantiate),
            ]
        }
        other => {
            debug!(comp = %comp.config.dn, state = %other, "instantiate ignored");
            Vec::new()
        }
    }
}

/// Kick off termination of an instantiated component.
pub fn start_terminate(comp: &mut AvndComp) -> Vec<CompEffect> {
    match comp.presence {
        PresenceState::Instantiated | PresenceState::Restarting => {
            comp.presence = PresenceState::Terminating;
            vec![
                CompEffect::Became(PresenceState::Terminating),
                CompEffect::Exec(ClcStep::Terminate),
            ]
        }
        PresenceState::Instantiating => {
            // Abort an in-flight instantiation with cleanup.
            comp.presence = PresenceState::Terminating;
            vec![
                CompEffect::Became(PresenceState::Terminating),
                CompEffect::Exec(ClcStep::Cleanup),
            ]
        }
        other => {
            debug!(comp = %comp.config.dn, state = %other, "terminate ignored");
            Vec::new()
        }
    }
}

/// Kick off a component restart: terminate, then instantiate again.
pub fn start_restart(comp: &mut AvndComp) -> Vec<CompEffect> {
    match comp.presence {
        PresenceState::Instantiated => {
            comp.presence = PresenceState::Restarting;
            comp.restarting = true;
            vec![
                CompEffect::Became(PresenceState::Restarting),
                CompEffect::Exec(ClcStep::Terminate),
            ]
        }
        other => {
            debug!(comp = %comp.config.dn, state = %other, "restart ignored");
            Vec::new()
        }
    }
}

/// The delayed instantiation attempt fell due.
pub fn retry_instantiate(comp: &mut AvndComp) -> Vec<CompEffect> {
    if comp.presence == PresenceState::Instantiating {
        vec![CompEffect::Exec(ClcStep::Instantiate)]
    } else {
        Vec::new()
    }
}

/// Feed one CLC outcome through the state machine.
pub fn on_clc(comp: &mut AvndComp, outcome: &ClcOutcome) -> Vec<CompEffect> {
    match (outcome.step, outcome.ok) {
        (ClcStep::Instantiate, true) => {
            comp.presence = PresenceState::Instantiated;
            comp.inst_attempts = 0;
            comp.restarting = false;
            vec![CompEffect::Became(PresenceState::Instantiated)]
        }
        (ClcStep::Instantiate, false) => instantiate_failed(comp),
        (ClcStep::Terminate, true) => terminated(comp),
        (ClcStep::Terminate, false) => {
            warn!(comp = %comp.config.dn, "terminate failed; escalating to cleanup");
            vec![CompEffect::Exec(ClcStep::Cleanup)]
        }
        (ClcStep::Cleanup, true) => terminated(comp),
        (ClcStep::Cleanup, false) => {
            comp.presence = PresenceState::TerminationFailed;
            comp.restarting = false;
            vec![CompEffect::Became(PresenceState::TerminationFailed)]
        }
        (ClcStep::Healthcheck, true) => Vec::new(),
        (ClcStep::Healthcheck, false) => vec![CompEffect::HealthcheckFailed],
        (ClcStep::AmStart, _) | (ClcStep::AmStop, _) => Vec::new(),
    }
}

fn instantiate_failed(comp: &mut AvndComp) -> Vec<CompEffect> {
    comp.inst_attempts += 1;
    let without_delay = comp.config.max_instantiate_without_delay.max(1);
    let with_delay = comp.config.max_instantiate_with_delay;
    if comp.inst_attempts < without_delay {
        debug!(comp = %comp.config.dn, attempt = comp.inst_attempts, "instantiate retry");
        vec![CompEffect::Exec(ClcStep::Instantiate)]
    } else if comp.inst_attempts < without_delay + with_delay {
        debug!(comp = %comp.config.dn, attempt = comp.inst_attempts, "delayed instantiate retry");
        vec![CompEffect::RetryAfter(
            comp.config.delay_between_instantiate_attempts,
        )]
    } else {
        comp.presence = PresenceState::InstantiationFailed;
        comp.restarting = false;
        vec![CompEffect::Became(PresenceState::InstantiationFailed)]
    }
}

fn terminated(comp: &mut AvndComp) -> Vec<CompEffect> {
    if comp.restarting {
        comp.presence = PresenceState::Instantiating;
        comp.inst_attempts = 0;
        vec![
            CompEffect::Became(PresenceState::Instantiating),
            CompEffect::Exec(ClcStep::Instantiate),
        ]
    } else {
        comp.presence = PresenceState::Uninstantiated;
        vec![CompEffect::Became(PresenceState::Uninstantiated)]
    }
}
