mod common;

use amfd::core::engine::{self, AssignOp};
use amfd::core::errors::AmfError;
use amfd::core::model::states::{
    AssignFsmState, AssignmentState, HaState, SgFsmState,
};
use common::{ack_all, model_with_sg, sg1, si, su};

use amfd::core::model::states::RedundancyModel::TwoN;

#[test]
fn test_2n_initial_placement_active_and_standby() {
    let mut model = model_with_sg(TwoN, 2, 1);
    let orders = engine::si_new(&mut model, &si(1)).unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders.iter().any(|o| o.su == su(1) && o.ha == HaState::Active));
    assert!(orders.iter().any(|o| o.su == su(2) && o.ha == HaState::Standby));
    assert_eq!(model.sgs[&sg1()].fsm_state, SgFsmState::SgRealign);

    ack_all(&mut model);
    assert_eq!(model.sgs[&sg1()].fsm_state, SgFsmState::Stable);
    let s = &model.sis[&si(1)];
    assert_eq!(s.assignment_state, AssignmentState::FullyAssigned);
    assert_eq!(s.num_curr_active, 1);
    assert_eq!(s.num_curr_standby, 1);
}

#[test]
fn test_2n_operations_require_stable_sg() {
    let mut model = model_with_sg(TwoN, 2, 2);
    engine::si_new(&mut model, &si(1)).unwrap();
    // The SG is in SG-REALIGN until the orders are acknowledged.
    let err = engine::si_new(&mut model, &si(2)).unwrap_err();
    assert!(matches!(err, AmfError::TryAgain(_)));
}

#[test]
fn test_2n_failover_promotes_standby() {
    // Three SUs so a fresh standby can be chosen after the failover.
    let mut model = model_with_sg(TwoN, 3, 1);
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);

    let orders = engine::su_fault(&mut model, &su(1)).unwrap();
    // Promotion of the standby plus removal of the faulted edge.
    assert!(orders
        .iter()
        .any(|o| o.su == su(2) && o.ha == HaState::Active && o.op == AssignOp::Modify));
    assert!(orders.iter().any(|o| o.su == su(1) && o.op == AssignOp::Remove));

    ack_all(&mut model);
    let s = &model.sis[&si(1)];
    assert_eq!(s.num_curr_active, 1, "exactly one active after failover");
    assert_eq!(s.num_curr_standby, 1, "su3 took over as standby");
    assert_eq!(s.assignment_state, AssignmentState::FullyAssigned);
    assert_eq!(
        model.assignments[&(su(2), si(1))].ha_state,
        HaState::Active
    );
    assert_eq!(model.sgs[&sg1()].fsm_state, SgFsmState::Stable);
}

#[test]
fn test_2n_failover_without_standby_unassigns() {
    let mut model = model_with_sg(TwoN, 1, 1);
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);
    assert_eq!(model.sis[&si(1)].num_curr_active, 1);

    engine::su_fault(&mut model, &su(1)).unwrap();
    ack_all(&mut model);
    let s = &model.sis[&si(1)];
    assert_eq!(s.assignment_state, AssignmentState::Unassigned);
    assert!(s.alarm_sent, "unassigned SI raises the alarm");
}

#[test]
fn test_2n_swap_exchanges_roles() {
    let mut model = model_with_sg(TwoN, 2, 1);
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);
    assert_eq!(model.assignments[&(su(1), si(1))].ha_state, HaState::Active);

    let orders = engine::swap(&mut model, &si(1)).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].ha, HaState::Quiesced);

    ack_all(&mut model);
    assert_eq!(
        model.assignments[&(su(2), si(1))].ha_state,
        HaState::Active,
        "old standby is the new active"
    );
    assert_eq!(
        model.assignments[&(su(1), si(1))].ha_state,
        HaState::Standby,
        "old active is the new standby"
    );
    assert_eq!(model.sgs[&sg1()].fsm_state, SgFsmState::Stable);
    assert!(model.sgs[&sg1()].admin_si.is_none());
}

#[test]
fn test_2n_swap_needs_full_assignment() {
    let mut model = model_with_sg(TwoN, 1, 1);
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);
    let err = engine::swap(&mut model, &si(1)).unwrap_err();
    assert!(matches!(err, AmfError::BadOperation(_)));
}

#[test]
fn test_assignment_failure_rolls_back_and_disables_su() {
    let mut model = model_with_sg(TwoN, 2, 1);
    let orders = engine::si_new(&mut model, &si(1)).unwrap();
    let active = orders
        .iter()
        .find(|o| o.ha == HaState::Active)
        .unwrap()
        .clone();

    let _ = engine::assign_done(&mut model, &active.su, &active.si, active.op, false).unwrap();
    assert!(
        !model.assignments.contains_key(&(active.su.clone(), active.si.clone())),
        "failed edge rolled back"
    );
    assert!(
        !model.sus[&active.su].is_in_service(),
        "failed SU taken out of service"
    );
}

#[test]
fn test_edge_fsm_states_track_inflight_orders() {
    let mut model = model_with_sg(TwoN, 2, 1);
    engine::si_new(&mut model, &si(1)).unwrap();
    assert!(model
        .assignments
        .values()
        .all(|a| a.fsm == AssignFsmState::Assigning));
    ack_all(&mut model);
    assert!(model
        .assignments
        .values()
        .all(|a| a.fsm == AssignFsmState::Assigned));
}
