// src/core/engine/nplusm.rs

//! N+M redundancy: the first `preferred-num-active-SUs` in-service SUs form
//! the active pool, the next `preferred-num-standby-SUs` the standby pool.
//! Every SI gets exactly one active and one standby assignment; selection
//! favors the lowest-ranked pool member with the least load.

use crate::core::model::Model;
use crate::core::model::dn::Dn;
use crate::core::model::sg::Sg;
use crate::core::model::si::Si;
use crate::core::model::states::{AssignFsmState, HaState};

fn load(model: &Model, su: &Dn, ha: HaState) -> usize {
    model
        .assignments
        .values()
        .filter(|a| &a.su == su && a.ha_state == ha)
        .count()
}

/// The SU already holding a confirmed edge of `ha` for this SI, if it is
/// still usable from the given pool.
fn sticky(model: &Model, si: &Dn, ha: HaState, pool: &[Dn]) -> Option<Dn> {
    model
        .assignments
        .values()
        .find(|a| {
            &a.si == si
                && a.ha_state == ha
                && a.fsm == AssignFsmState::Assigned
                && pool.contains(&a.su)
        })
        .map(|a| a.su.clone())
}

pub(super) fn desired(model: &Model, sg: &Sg, si: &Si) -> (Vec<Dn>, Vec<Dn>) {
    let in_service = super::in_service_by_rank(model, &sg.dn);
    let n = sg.pref_active_sus.max(1) as usize;
    let m = sg.pref_standby_sus.max(1) as usize;
    let active_pool: Vec<Dn> = in_service.iter().take(n).cloned().collect();
    let standby_pool: Vec<Dn> = in_service.iter().skip(n).take(m).cloned().collect();

    let active = sticky(model, &si.dn, HaState::Active, &active_pool).or_else(|| {
        active_pool
            .iter()
            .min_by_key(|su| load(model, su, HaState::Active))
            .cloned()
    });
    // The standby pool starts past the active pool, so the two never
    // overlap; the least-loaded member wins.
    let standby = sticky(model, &si.dn, HaState::Standby, &standby_pool).or_else(|| {
        standby_pool
            .iter()
            .min_by_key(|su| load(model, su, HaState::Standby))
            .cloned()
    });
    (
        active.map(|a| vec![a]).unwrap_or_default(),
        standby.map(|s| vec![s]).unwrap_or_default(),
    )
}
