// src/core/engine/two_n.rs

//! 2N redundancy: one SU carries every active assignment of the SG, the
//! second-ranked in-service SU carries every standby. Also hosts the
//! SI-SWAP continuation logic, which only exists for this model.

use super::{AssignOp, AssignmentOrder, track_orders};
use crate::core::errors::{AmfError, AmfResult};
use crate::core::model::Model;
use crate::core::model::dn::Dn;
use crate::core::model::sg::Sg;
use crate::core::model::si::Si;
use crate::core::model::states::{AdminState, AssignFsmState, HaState, SgFsmState};
use tracing::debug;

/// The SU currently holding confirmed assignments of `ha` anywhere in the
/// SG; 2N keeps all SIs on the same pair.
fn current_holder(model: &Model, sg: &Dn, ha: HaState) -> Option<Dn> {
    model
        .assignments
        .values()
        .filter(|a| {
            a.ha_state == ha
                && a.fsm == AssignFsmState::Assigned
                && model.sis.get(&a.si).map(|s| &s.sg == sg).unwrap_or(false)
                && model.sus.get(&a.su).map(|s| s.is_in_service()).unwrap_or(false)
        })
        .map(|a| a.su.clone())
        .next()
}

pub(super) fn desired(model: &Model, sg: &Sg, _si: &Si) -> (Vec<Dn>, Vec<Dn>) {
    let in_service = super::in_service_by_rank(model, &sg.dn);
    let active = current_holder(model, &sg.dn, HaState::Active)
        .or_else(|| in_service.first().cloned());
    let Some(active) = active else {
        return (Vec::new(), Vec::new());
    };
    let standby = current_holder(model, &sg.dn, HaState::Standby)
        .filter(|s| s != &active)
        .or_else(|| in_service.iter().find(|s| **s != active).cloned());
    (
        vec![active],
        standby.map(|s| vec![s]).unwrap_or_default(),
    )
}

/// Starts an SI-SWAP: quiesce the active side first.
pub(super) fn swap_start(
    model: &mut Model,
    sg_dn: &Dn,
    si: &Dn,
) -> AmfResult<Vec<AssignmentOrder>> {
    let active_edge = model
        .assignments
        .values()
        .find(|a| &a.si == si && a.ha_state == HaState::Active && a.fsm == AssignFsmState::Assigned)
        .map(|a| a.su.clone());
    let standby_edge = model
        .assignments
        .values()
        .find(|a| &a.si == si && a.ha_state == HaState::Standby && a.fsm == AssignFsmState::Assigned)
        .map(|a| a.su.clone());
    let (Some(active_su), Some(_)) = (active_edge, standby_edge) else {
        return Err(AmfError::BadOperation(format!(
            "SI '{si}' is not fully assigned; swap needs an active and a standby"
        )));
    };

    model.modify_assignment_ha(&active_su, si, HaState::Quiesced)?;
    let orders = vec![AssignmentOrder {
        su: active_su,
        si: si.clone(),
        ha: HaState::Quiesced,
        op: AssignOp::Modify,
    }];
    {
        let sg = model.sgs.get_mut(sg_dn).unwrap();
        sg.admin_si = Some(si.clone());
    }
    track_orders(model, sg_dn, &orders, SgFsmState::SiOper)?;
    Ok(orders)
}

/// Drives the next swap step after each acknowledgement. The step is
/// inferred from the edge states, so no extra bookkeeping survives a
/// failover:
///   active quiesced + standby -> promote the standby
///   new active + old quiesced -> make the old side the standby
///   active + standby          -> swap finished
pub(super) fn swap_continue(
    model: &mut Model,
    sg_dn: &Dn,
    si: &Dn,
) -> AmfResult<Vec<AssignmentOrder>> {
    let swapping = model
        .sgs
        .get(sg_dn)
        .map(|sg| {
            sg.admin_si.as_ref() == Some(si)
                && model
                    .sis
                    .get(si)
                    .map(|s| s.admin_state == AdminState::Unlocked)
                    .unwrap_or(false)
        })
        .unwrap_or(false);
    if !swapping {
        return Ok(Vec::new());
    }

    let confirmed: Vec<(Dn, HaState)> = model
        .assignments
        .values()
        .filter(|a| &a.si == si && a.fsm == AssignFsmState::Assigned)
        .map(|a| (a.su.clone(), a.ha_state))
        .collect();
    let in_flight = model
        .assignments
        .values()
        .any(|a| &a.si == si && a.in_flight());
    if in_flight {
        return Ok(Vec::new());
    }

    let su_with = |ha: HaState| confirmed.iter().find(|(_, h)| *h == ha).map(|(s, _)| s.clone());
    let mut orders = Vec::new();
    if let (Some(quiesced), Some(standby)) = (su_with(HaState::Quiesced), su_with(HaState::Standby))
    {
        debug!(si = %si, from = %quiesced, to = %standby, "swap: promoting standby");
        model.modify_assignment_ha(&standby, si, HaState::Active)?;
        orders.push(AssignmentOrder {
            su: standby,
            si: si.clone(),
            ha: HaState::Active,
            op: AssignOp::Modify,
        });
    } else if let (Some(quiesced), Some(_active)) =
        (su_with(HaState::Quiesced), su_with(HaState::Active))
    {
        debug!(si = %si, "swap: demoting old active to standby");
        model.modify_assignment_ha(&quiesced, si, HaState::Standby)?;
        orders.push(AssignmentOrder {
            su: quiesced,
            si: si.clone(),
            ha: HaState::Standby,
            op: AssignOp::Modify,
        });
    } else if su_with(HaState::Active).is_some() && su_with(HaState::Standby).is_some() {
        debug!(si = %si, "swap complete");
        model.sgs.get_mut(sg_dn).unwrap().admin_si = None;
    }
    if !orders.is_empty() {
        track_orders(model, sg_dn, &orders, SgFsmState::SiOper)?;
    }
    Ok(orders)
}
