// src/core/engine/no_redundancy.rs

//! No-redundancy: exactly one active assignment per SI and at most one SI
//! per SU. Losing the active is unrecoverable unless a spare SU exists.

use crate::core::model::Model;
use crate::core::model::dn::Dn;
use crate::core::model::sg::Sg;
use crate::core::model::si::Si;
use crate::core::model::states::{AssignFsmState, HaState};

pub(super) fn desired(model: &Model, sg: &Sg, si: &Si) -> (Vec<Dn>, Vec<Dn>) {
    // Sticky: keep the confirmed active if its SU is still in service.
    let existing = model
        .assignments
        .values()
        .find(|a| {
            a.si == si.dn
                && a.ha_state == HaState::Active
                && a.fsm == AssignFsmState::Assigned
                && model.sus.get(&a.su).map(|s| s.is_in_service()).unwrap_or(false)
        })
        .map(|a| a.su.clone());
    if let Some(su) = existing {
        return (vec![su], Vec::new());
    }

    // Otherwise the first in-service SU not serving any other SI.
    let spare = super::in_service_by_rank(model, &sg.dn)
        .into_iter()
        .find(|su| {
            !model
                .assignments
                .values()
                .any(|a| &a.su == su && a.si != si.dn)
        });
    (spare.map(|s| vec![s]).unwrap_or_default(), Vec::new())
}
