// src/core/engine/nway_active.rs

//! N-way-active redundancy: up to `preferred-active-assignments` active
//! assignments per SI on distinct SUs, never any standby. Shrinking the
//! preference quiesces and removes the excess; growing re-selects.

use crate::core::model::Model;
use crate::core::model::dn::Dn;
use crate::core::model::sg::Sg;
use crate::core::model::si::Si;
use crate::core::model::states::{AssignFsmState, HaState};

pub(super) fn desired(model: &Model, sg: &Sg, si: &Si) -> (Vec<Dn>, Vec<Dn>) {
    let in_service = super::in_service_by_rank(model, &sg.dn);
    let want = si.pref_active_assignments as usize;

    // Existing confirmed actives keep their place, in SU rank order, so a
    // shrink sheds the highest-ranked (least preferred) SUs first.
    let mut chosen: Vec<Dn> = in_service
        .iter()
        .filter(|su| {
            model
                .assignments
                .values()
                .any(|a| {
                    a.si == si.dn
                        && &a.su == *su
                        && a.ha_state == HaState::Active
                        && a.fsm == AssignFsmState::Assigned
                })
        })
        .cloned()
        .collect();
    chosen.truncate(want);
    for su in &in_service {
        if chosen.len() >= want {
            break;
        }
        if !chosen.contains(su) {
            chosen.push(su.clone());
        }
    }
    (chosen, Vec::new())
}
