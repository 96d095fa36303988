// src/core/imm/mod.rs

//! The configuration adapter: the sole bridge between the external object
//! store and the entity model. Initial load, CCB validate/apply routing,
//! runtime-attribute reads, and the implementer/applier role handshake all
//! live here.

pub mod ccb;
pub mod handlers;
pub mod loader;
pub mod store;

use crate::core::errors::{AmfError, AmfResult};
use crate::core::model::Model;
use crate::core::model::dn::Dn;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use store::ObjectStore;
use tracing::{info, warn};

/// Role of this process toward the object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum OiRole {
    #[default]
    None,
    /// Owns the configuration classes: receives CCBs, answers runtime reads.
    Implementer,
    /// Standby shadow: observes applies without owning the classes.
    Applier,
}

const CLAIM_MAX_ATTEMPTS: u32 = 8;
const CLAIM_BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Tracks the store-role handshake. Re-entry after a role change uses
/// bounded retry with exponential back-off and jitter.
pub struct OiHandle {
    pub name: String,
    pub role: OiRole,
    store: Arc<ObjectStore>,
}

impl OiHandle {
    pub fn new(name: impl Into<String>, store: Arc<ObjectStore>) -> Self {
        Self {
            name: name.into(),
            role: OiRole::None,
            store,
        }
    }

    /// NONE/APPLIER -> IMPLEMENTER. Called when this director goes active.
    pub async fn become_implementer(&mut self) -> AmfResult<()> {
        if self.role == OiRole::Implementer {
            return Ok(());
        }
        let mut backoff = CLAIM_BASE_BACKOFF;
        for attempt in 1..=CLAIM_MAX_ATTEMPTS {
            match self.store.try_claim_implementer(&self.name) {
                Ok(()) => {
                    info!(name = %self.name, "implementer role acquired");
                    self.role = OiRole::Implementer;
                    return Ok(());
                }
                Err(AmfError::TryAgain(reason)) => {
                    let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 2);
                    let wait = backoff + Duration::from_millis(jitter);
                    warn!(attempt, %reason, ?wait, "implementer claim busy; backing off");
                    tokio::time::sleep(wait).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                }
                Err(e) => return Err(e),
            }
        }
        Err(AmfError::TryAgain(
            "implementer role not acquired within retry budget".to_string(),
        ))
    }

    /// ANY -> APPLIER. Called when this director goes standby.
    pub fn become_applier(&mut self) {
        if self.role == OiRole::Implementer {
            self.store.release_implementer(&self.name);
        }
        self.role = OiRole::Applier;
        info!(name = %self.name, "running as applier");
    }
}

/// Answers a synchronous runtime-attribute read against the live model.
/// The store calls this for attributes the director owns.
pub fn runtime_read(model: &Model, dn: &Dn, attr: &str) -> AmfResult<String> {
    let value = match attr {
        "saAmfNodeAdminState" => model.nodes.get(dn).map(|n| n.admin_state.to_string()),
        "saAmfNodeOperState" => model.nodes.get(dn).map(|n| n.oper_state.to_string()),
        "saAmfSGAdminState" => model.sgs.get(dn).map(|s| s.admin_state.to_string()),
        "saAmfSUAdminState" => model.sus.get(dn).map(|s| s.admin_state.to_string()),
        "saAmfSUOperState" => model.sus.get(dn).map(|s| s.oper_state.to_string()),
        "saAmfSUPresenceState" => model.sus.get(dn).map(|s| s.presence_state.to_string()),
        "saAmfSUReadinessState" => model.sus.get(dn).map(|s| s.readiness_state.to_string()),
        "saAmfSURestartCount" => model.sus.get(dn).map(|s| s.restart_count.to_string()),
        "saAmfSIAdminState" => model.sis.get(dn).map(|s| s.admin_state.to_string()),
        "saAmfSIAssignmentState" => model.sis.get(dn).map(|s| s.assignment_state.to_string()),
        "saAmfSINumCurrActiveAssignments" => {
            model.sis.get(dn).map(|s| s.num_curr_active.to_string())
        }
        "saAmfSINumCurrStandbyAssignments" => {
            model.sis.get(dn).map(|s| s.num_curr_standby.to_string())
        }
        "saAmfCompPresenceState" => model.comps.get(dn).map(|c| c.presence_state.to_string()),
        "saAmfCompOperState" => model.comps.get(dn).map(|c| c.oper_state.to_string()),
        "saAmfCompRestartCount" => model.comps.get(dn).map(|c| c.restart_count.to_string()),
        "saAmfCompCurrProxyName" => model
            .comps
            .get(dn)
            .map(|c| c.current_proxy.as_ref().map(|p| p.to_string()).unwrap_or_default()),
        _ => None,
    };
    value.ok_or_else(|| AmfError::NotExist(format!("{dn} / {attr}")))
}
