// src/core/engine/nway.rs

//! N-way redundancy: each SI holds one active assignment and up to
//! `preferred-standby-assignments` standbys, distributed across distinct
//! SUs in rank order. An SU may serve several SIs at once.

use crate::core::model::Model;
use crate::core::model::dn::Dn;
use crate::core::model::sg::Sg;
use crate::core::model::si::Si;
use crate::core::model::states::{AssignFsmState, HaState};

/// Candidate order for one SI: its explicitly ranked SUs first, then the
/// SG's in-service SUs by rank.
fn candidates(model: &Model, sg: &Sg, si: &Si) -> Vec<Dn> {
    let mut out: Vec<Dn> = si
        .ranked_sus
        .iter()
        .map(|(su, _)| su.clone())
        .filter(|su| model.sus.get(su).map(|s| s.is_in_service()).unwrap_or(false))
        .collect();
    for su in super::in_service_by_rank(model, &sg.dn) {
        if !out.contains(&su) {
            out.push(su);
        }
    }
    out
}

pub(super) fn desired(model: &Model, sg: &Sg, si: &Si) -> (Vec<Dn>, Vec<Dn>) {
    let candidates = candidates(model, sg, si);
    if candidates.is_empty() {
        return (Vec::new(), Vec::new());
    }

    // Keep the confirmed active where it is; otherwise the best candidate.
    let active = model
        .assignments
        .values()
        .find(|a| {
            a.si == si.dn
                && a.ha_state == HaState::Active
                && a.fsm == AssignFsmState::Assigned
                && candidates.contains(&a.su)
        })
        .map(|a| a.su.clone())
        .unwrap_or_else(|| candidates[0].clone());

    // Standbys on distinct SUs, sticky first, then rank order.
    let mut standbys: Vec<Dn> = model
        .assignments
        .values()
        .filter(|a| {
            a.si == si.dn
                && a.ha_state == HaState::Standby
                && a.fsm == AssignFsmState::Assigned
                && a.su != active
                && candidates.contains(&a.su)
        })
        .map(|a| a.su.clone())
        .collect();
    for su in &candidates {
        if standbys.len() >= si.pref_standby_assignments as usize {
            break;
        }
        if *su != active && !standbys.contains(su) {
            standbys.push(su.clone());
        }
    }
    standbys.truncate(si.pref_standby_assignments as usize);
    (vec![active], standbys)
}
