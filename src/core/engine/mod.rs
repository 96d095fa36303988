// src/core/engine/mod.rs

//! The assignment engine: one finite state machine per service group.
//!
//! Every public operation requires the SG to be STABLE (else TRY-AGAIN),
//! mutates the model's assignment edges, records the touched SUs on the
//! SG's operation list, and returns the orders the director must forward to
//! the node directors. Acknowledgements come back through [`assign_done`];
//! when the operation list drains, the SG returns to STABLE and a
//! re-balance pass grants whatever is still missing.

pub mod no_redundancy;
pub mod nplusm;
pub mod nway;
pub mod nway_active;
pub mod sidep;
pub mod two_n;

use crate::core::errors::{AmfError, AmfResult};
use crate::core::model::Model;
use crate::core::model::dn::Dn;
use crate::core::model::states::{
    AdminState, AssignFsmState, HaState, OperState, RedundancyModel, SgFsmState,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What the director should tell a node director to do with one edge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum AssignOp {
    Add,
    Modify,
    Remove,
}

/// One instruction toward the SU's hosting node director. The model edge
/// has already been put into the matching in-flight state.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentOrder {
    pub su: Dn,
    pub si: Dn,
    pub ha: HaState,
    pub op: AssignOp,
}

fn sg_of_si(model: &Model, si: &Dn) -> AmfResult<Dn> {
    model
        .sis
        .get(si)
        .map(|s| s.sg.clone())
        .ok_or_else(|| AmfError::NotExist(si.to_string()))
}

fn sg_of_su(model: &Model, su: &Dn) -> AmfResult<Dn> {
    model
        .sus
        .get(su)
        .map(|s| s.sg.clone())
        .ok_or_else(|| AmfError::NotExist(su.to_string()))
}

fn require_stable(model: &Model, sg: &Dn) -> AmfResult<()> {
    let sg = model
        .sgs
        .get(sg)
        .ok_or_else(|| AmfError::NotExist(sg.to_string()))?;
    if !sg.is_stable() {
        return Err(AmfError::TryAgain(format!(
            "SG '{}' is in {} state",
            sg.dn, sg.fsm_state
        )));
    }
    Ok(())
}

/// The per-model placement decision for one SI: which SUs should hold its
/// active assignments and which its standbys.
fn desired_assignments(model: &Model, sg_dn: &Dn, si_dn: &Dn) -> (Vec<Dn>, Vec<Dn>) {
    let Some(sg) = model.sgs.get(sg_dn) else {
        return (Vec::new(), Vec::new());
    };
    let Some(si) = model.sis.get(si_dn) else {
        return (Vec::new(), Vec::new());
    };
    // A locked or shutting-down SI, or a locked SG, converges to no
    // assignments at all.
    if si.admin_state != AdminState::Unlocked || sg.admin_state != AdminState::Unlocked {
        return (Vec::new(), Vec::new());
    }
    match sg.redundancy_model {
        RedundancyModel::TwoN => two_n::desired(model, sg, si),
        RedundancyModel::NPlusM => nplusm::desired(model, sg, si),
        RedundancyModel::NWay => nway::desired(model, sg, si),
        RedundancyModel::NWayActive => nway_active::desired(model, sg, si),
        RedundancyModel::NoRedundancy => no_redundancy::desired(model, sg, si),
    }
}

/// Issues the orders that move one SI toward its desired placement.
fn rebalance_si(model: &mut Model, sg_dn: &Dn, si_dn: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    let (want_active, want_standby) = desired_assignments(model, sg_dn, si_dn);
    let shutdown = model
        .sis
        .get(si_dn)
        .map(|s| s.admin_state == AdminState::ShuttingDown)
        .unwrap_or(false);
    let mut orders = Vec::new();

    // Current edges of this SI, snapshotted up front.
    let edges: Vec<(Dn, HaState, AssignFsmState)> = model
        .assignments
        .values()
        .filter(|a| &a.si == si_dn)
        .map(|a| (a.su.clone(), a.ha_state, a.fsm))
        .collect();

    // Pass 1: demote or remove what no longer belongs.
    for (su, ha, fsm) in &edges {
        if *fsm != AssignFsmState::Assigned {
            continue; // still in flight; its ack will re-enter the engine
        }
        match ha {
            HaState::Active if !want_active.contains(su) => {
                let target = if shutdown { HaState::Quiescing } else { HaState::Quiesced };
                model.modify_assignment_ha(su, si_dn, target)?;
                orders.push(AssignmentOrder {
                    su: su.clone(),
                    si: si_dn.clone(),
                    ha: target,
                    op: AssignOp::Modify,
                });
            }
            HaState::Standby if !want_standby.contains(su) => {
                model.begin_unassign(su, si_dn)?;
                orders.push(AssignmentOrder {
                    su: su.clone(),
                    si: si_dn.clone(),
                    ha: HaState::Standby,
                    op: AssignOp::Remove,
                });
            }
            HaState::Quiesced | HaState::Quiescing => {
                // Quiesce confirmed earlier; finish the removal now.
                model.begin_unassign(su, si_dn)?;
                orders.push(AssignmentOrder {
                    su: su.clone(),
                    si: si_dn.clone(),
                    ha: *ha,
                    op: AssignOp::Remove,
                });
            }
            _ => {}
        }
    }

    // Pass 2: grant what is missing. Active assignments are gated on the
    // SI's sponsors being fully assigned.
    let sponsors_ready = model.si_sponsors_ready(si_dn);
    for su in &want_active {
        let key = (su.clone(), si_dn.clone());
        match model.assignments.get(&key) {
            None if sponsors_ready => {
                model.create_assignment(su, si_dn, HaState::Active)?;
                orders.push(AssignmentOrder {
                    su: su.clone(),
                    si: si_dn.clone(),
                    ha: HaState::Active,
                    op: AssignOp::Add,
                });
            }
            None => {
                debug!(si = %si_dn, "active assignment deferred: sponsors not ready");
            }
            Some(edge)
                if edge.ha_state == HaState::Standby && edge.fsm == AssignFsmState::Assigned =>
            {
                model.modify_assignment_ha(su, si_dn, HaState::Active)?;
                orders.push(AssignmentOrder {
                    su: su.clone(),
                    si: si_dn.clone(),
                    ha: HaState::Active,
                    op: AssignOp::Modify,
                });
            }
            Some(_) => {}
        }
    }
    for su in &want_standby {
        let key = (su.clone(), si_dn.clone());
        if model.assignments.get(&key).is_none() {
            model.create_assignment(su, si_dn, HaState::Standby)?;
            orders.push(AssignmentOrder {
                su: su.clone(),
                si: si_dn.clone(),
                ha: HaState::Standby,
                op: AssignOp::Add,
            });
        }
    }
    Ok(orders)
}

/// Re-balances every SI of the SG in rank order. Used when the SG enters or
/// re-enters STABLE and after preference changes.
fn rebalance_sg(model: &mut Model, sg_dn: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    let mut orders = Vec::new();
    for si in model.sis_of_sg(sg_dn) {
        orders.extend(rebalance_si(model, sg_dn, &si)?);
    }
    Ok(orders)
}

/// Registers issued orders on the SG operation list and moves the FSM.
fn track_orders(
    model: &mut Model,
    sg_dn: &Dn,
    orders: &[AssignmentOrder],
    state: SgFsmState,
) -> AmfResult<()> {
    if orders.is_empty() {
        return Ok(());
    }
    {
        let sg = model
            .sgs
            .get_mut(sg_dn)
            .ok_or_else(|| AmfError::NotExist(sg_dn.to_string()))?;
        for order in orders {
            sg.oper_list_add(&order.su);
        }
    }
    model.sg_set_fsm_state(sg_dn, state)
}

// --- public operations ----------------------------------------------------

/// A new SI appeared: place it on suitable SUs.
pub fn si_new(model: &mut Model, si: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    let sg_dn = sg_of_si(model, si)?;
    require_stable(model, &sg_dn)?;
    let orders = rebalance_si(model, &sg_dn, si)?;
    track_orders(model, &sg_dn, &orders, SgFsmState::SgRealign)?;
    Ok(orders)
}

/// An SU just became in-service: grant it whatever it can carry.
pub fn su_insvc(model: &mut Model, su: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    let sg_dn = sg_of_su(model, su)?;
    require_stable(model, &sg_dn)?;
    let orders = rebalance_sg(model, &sg_dn)?;
    track_orders(model, &sg_dn, &orders, SgFsmState::SgRealign)?;
    Ok(orders)
}

/// The SU failed: fail over its active assignments and drop the rest.
pub fn su_fault(model: &mut Model, su: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    let sg_dn = sg_of_su(model, su)?;
    {
        let sg = model
            .sgs
            .get(&sg_dn)
            .ok_or_else(|| AmfError::NotExist(sg_dn.to_string()))?;
        // A fault pre-empts anything except another fault already running.
        if !matches!(sg.fsm_state, SgFsmState::Stable | SgFsmState::SgRealign | SgFsmState::SuOper)
        {
            return Err(AmfError::TryAgain(format!(
                "SG '{sg_dn}' is in {} state",
                sg.fsm_state
            )));
        }
    }
    model.su_set_oper_state(su, OperState::Disabled)?;

    let redundancy = model.sgs[&sg_dn].redundancy_model;
    let mut orders = Vec::new();
    let edges = model.assignments_of_su(su);
    for (su_dn, si_dn) in &edges {
        let ha = model.assignments[&(su_dn.clone(), si_dn.clone())].ha_state;
        if ha == HaState::Active {
            // Promote a standby of this SI if the model has one in service.
            let promote = promotion_target(model, redundancy, si_dn);
            if let Some(standby_su) = promote {
                model.modify_assignment_ha(&standby_su, si_dn, HaState::Active)?;
                orders.push(AssignmentOrder {
                    su: standby_su,
                    si: si_dn.clone(),
                    ha: HaState::Active,
                    op: AssignOp::Modify,
                });
            } else {
                info!(si = %si_dn, "no in-service standby; SI will go unassigned");
            }
        }
        // The faulted SU's own edge is torn down unconditionally.
        model.begin_unassign(su_dn, si_dn)?;
        orders.push(AssignmentOrder {
            su: su_dn.clone(),
            si: si_dn.clone(),
            ha,
            op: AssignOp::Remove,
        });
    }
    track_orders(model, &sg_dn, &orders, SgFsmState::SgRealign)?;
    Ok(orders)
}

/// The standby to promote when `si`'s active SU failed.
fn promotion_target(model: &Model, redundancy: RedundancyModel, si: &Dn) -> Option<Dn> {
    if redundancy == RedundancyModel::NWayActive || redundancy == RedundancyModel::NoRedundancy {
        return None;
    }
    model
        .assignments
        .values()
        .filter(|a| {
            &a.si == si
                && a.ha_state == HaState::Standby
                && a.fsm == AssignFsmState::Assigned
                && model.sus.get(&a.su).map(|s| s.is_in_service()).unwrap_or(false)
        })
        .min_by_key(|a| model.sus.get(&a.su).map(|s| s.rank).unwrap_or(u32::MAX))
        .map(|a| a.su.clone())
}

/// SI locked or shut down: quiesce the actives, drop the standbys.
pub fn si_admin_down(model: &mut Model, si: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    let sg_dn = sg_of_si(model, si)?;
    require_stable(model, &sg_dn)?;
    let orders = rebalance_si(model, &sg_dn, si)?;
    if !orders.is_empty() {
        let sg = model.sgs.get_mut(&sg_dn).unwrap();
        sg.admin_si = Some(si.clone());
        for order in &orders {
            sg.oper_list_add(&order.su);
        }
        model.sg_set_fsm_state(&sg_dn, SgFsmState::SiOper)?;
    }
    Ok(orders)
}

/// SU locked or shut down, optionally as part of a node-scoped operation.
pub fn su_admin_down(
    model: &mut Model,
    su: &Dn,
    node: Option<&Dn>,
) -> AmfResult<Vec<AssignmentOrder>> {
    let sg_dn = sg_of_su(model, su)?;
    require_stable(model, &sg_dn)?;
    let shutdown = model
        .sus
        .get(su)
        .map(|s| s.admin_state == AdminState::ShuttingDown)
        .unwrap_or(false)
        || node
            .and_then(|n| model.nodes.get(n))
            .map(|n| n.admin_state == AdminState::ShuttingDown)
            .unwrap_or(false);

    let mut orders = Vec::new();
    for (su_dn, si_dn) in model.assignments_of_su(su) {
        let ha = model.assignments[&(su_dn.clone(), si_dn.clone())].ha_state;
        match ha {
            HaState::Active => {
                let target = if shutdown { HaState::Quiescing } else { HaState::Quiesced };
                model.modify_assignment_ha(&su_dn, &si_dn, target)?;
                orders.push(AssignmentOrder {
                    su: su_dn,
                    si: si_dn,
                    ha: target,
                    op: AssignOp::Modify,
                });
            }
            _ => {
                model.begin_unassign(&su_dn, &si_dn)?;
                orders.push(AssignmentOrder {
                    su: su_dn,
                    si: si_dn,
                    ha,
                    op: AssignOp::Remove,
                });
            }
        }
    }
    let state = if node.is_some() { SgFsmState::SgRealign } else { SgFsmState::SuOper };
    track_orders(model, &sg_dn, &orders, state)?;
    Ok(orders)
}

/// SG-wide admin takedown: quiesce every active edge, drop every standby.
/// The SG admin state must already be set; the FSM parks in ADMIN until
/// the acknowledgements drain.
pub fn sg_admin_down(model: &mut Model, sg_dn: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    require_stable(model, sg_dn)?;
    let shutdown = model
        .sgs
        .get(sg_dn)
        .map(|s| s.admin_state == AdminState::ShuttingDown)
        .unwrap_or(false);
    let mut orders = Vec::new();
    for si in model.sis_of_sg(sg_dn) {
        for (su_dn, si_dn) in model.assignments_of_si(&si) {
            let ha = model.assignments[&(su_dn.clone(), si_dn.clone())].ha_state;
            if ha == HaState::Active {
                let target = if shutdown { HaState::Quiescing } else { HaState::Quiesced };
                model.modify_assignment_ha(&su_dn, &si_dn, target)?;
                orders.push(AssignmentOrder { su: su_dn, si: si_dn, ha: target, op: AssignOp::Modify });
            } else {
                model.begin_unassign(&su_dn, &si_dn)?;
                orders.push(AssignmentOrder { su: su_dn, si: si_dn, ha, op: AssignOp::Remove });
            }
        }
    }
    track_orders(model, sg_dn, &orders, SgFsmState::Admin)?;
    Ok(orders)
}

/// Swap active and standby of a 2N SI.
pub fn swap(model: &mut Model, si: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    let sg_dn = sg_of_si(model, si)?;
    require_stable(model, &sg_dn)?;
    two_n::swap_start(model, &sg_dn, si)
}

/// An unassign forced by SI-SI dependency tolerance expiry: the dependent
/// loses its assignments without an admin-state change.
pub fn unassign_si(model: &mut Model, si: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    let sg_dn = sg_of_si(model, si)?;
    require_stable(model, &sg_dn)?;
    let mut orders = Vec::new();
    for (su_dn, si_dn) in model.assignments_of_si(si) {
        let ha = model.assignments[&(su_dn.clone(), si_dn.clone())].ha_state;
        if ha == HaState::Active {
            model.modify_assignment_ha(&su_dn, &si_dn, HaState::Quiesced)?;
            orders.push(AssignmentOrder {
                su: su_dn,
                si: si_dn,
                ha: HaState::Quiesced,
                op: AssignOp::Modify,
            });
        } else {
            model.begin_unassign(&su_dn, &si_dn)?;
            orders.push(AssignmentOrder {
                su: su_dn,
                si: si_dn,
                ha,
                op: AssignOp::Remove,
            });
        }
    }
    track_orders(model, &sg_dn, &orders, SgFsmState::SgRealign)?;
    Ok(orders)
}

/// Preferred-count change on an SI (e.g. N-way-active PrefActive): shrink
/// or grow toward the new target.
pub fn si_pref_changed(model: &mut Model, si: &Dn) -> AmfResult<Vec<AssignmentOrder>> {
    si_new(model, si)
}

/// Acknowledgement of one order from a node director. Returns follow-up
/// orders (swap continuations, removal of confirmed quiesces, re-grants).
pub fn assign_done(
    model: &mut Model,
    su: &Dn,
    si: &Dn,
    op: AssignOp,
    ok: bool,
) -> AmfResult<Vec<AssignmentOrder>> {
    let sg_dn = sg_of_si(model, si).or_else(|_| sg_of_su(model, su))?;
    let key = (su.clone(), si.clone());

    if ok {
        match op {
            AssignOp::Add | AssignOp::Modify => {
                if model.assignments.contains_key(&key) {
                    model.confirm_assignment(su, si)?;
                }
            }
            AssignOp::Remove => {
                if model.assignments.contains_key(&key) {
                    model.delete_assignment(su, si)?;
                }
            }
        }
    } else {
        // Roll back the in-memory state for this pair and take the SU out
        // of service; the SG stays in realign until the list drains.
        warn!(%su, %si, ?op, "assignment failed on node; rolling back");
        if model.assignments.contains_key(&key) {
            model.delete_assignment(su, si)?;
        }
        model.su_set_oper_state(su, OperState::Disabled)?;
    }

    let mut orders = two_n::swap_continue(model, &sg_dn, si)?;

    // Drop the SU from the operation list only when it has nothing left in
    // flight; an SU can carry several edges of one operation.
    let su_still_busy = model
        .assignments
        .values()
        .any(|a| &a.su == su && a.in_flight());
    let drained = {
        let sg = model
            .sgs
            .get_mut(&sg_dn)
            .ok_or_else(|| AmfError::NotExist(sg_dn.to_string()))?;
        if !su_still_busy {
            sg.oper_list_remove(su);
        }
        sg.su_oper_list.is_empty()
    };

    if drained && orders.is_empty() {
        let admin_si_done = {
            let sg = model.sgs.get_mut(&sg_dn).unwrap();
            match &sg.admin_si {
                Some(dn) => {
                    let finished = model
                        .assignments
                        .values()
                        .all(|a| &a.si != dn || !a.in_flight());
                    if finished {
                        sg.admin_si = None;
                    }
                    finished
                }
                None => true,
            }
        };
        if admin_si_done {
            model.sg_set_fsm_state(&sg_dn, SgFsmState::Stable)?;
            // Back to STABLE: grant anything still missing (new standbys
            // after a failover, refills after a lock, pref-count deltas).
            let followups = rebalance_sg(model, &sg_dn)?;
            track_orders(model, &sg_dn, &followups, SgFsmState::SgRealign)?;
            orders.extend(followups);
        }
    }
    Ok(orders)
}

/// In-service SUs of an SG by rank; the shared candidate pool for every
/// placement function.
pub(crate) fn in_service_by_rank(model: &Model, sg: &Dn) -> Vec<Dn> {
    model.in_service_sus_of_sg(sg)
}
