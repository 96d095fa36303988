mod common;

use amfd::core::engine;
use amfd::core::model::states::RedundancyModel::{NPlusM, NWay};
use amfd::core::model::states::{AssignmentState, HaState};
use common::{ack_all, model_with_sg, si, su};

#[test]
fn test_nway_one_active_many_standbys() {
    let mut model = model_with_sg(NWay, 3, 1);
    model.sis.get_mut(&si(1)).unwrap().pref_standby_assignments = 2;
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);

    let s = &model.sis[&si(1)];
    assert_eq!(s.num_curr_active, 1);
    assert_eq!(s.num_curr_standby, 2);
    assert_eq!(s.assignment_state, AssignmentState::FullyAssigned);
    // Standbys sit on distinct SUs, never beside the active.
    let active_su = model
        .assignments
        .values()
        .find(|a| a.ha_state == HaState::Active)
        .map(|a| a.su.clone())
        .unwrap();
    assert!(model
        .assignments
        .values()
        .filter(|a| a.ha_state == HaState::Standby)
        .all(|a| a.su != active_su));
}

#[test]
fn test_nway_partial_when_standby_pool_short() {
    // PrefActive==1 and PrefStandby==1 with only one in-service SU: the SI
    // reaches PARTIALLY-ASSIGNED and never FULLY-ASSIGNED.
    let mut model = model_with_sg(NWay, 1, 1);
    model.sis.get_mut(&si(1)).unwrap().pref_standby_assignments = 1;
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);

    let s = &model.sis[&si(1)];
    assert_eq!(s.num_curr_active, 1);
    assert_eq!(s.num_curr_standby, 0);
    assert_eq!(s.assignment_state, AssignmentState::PartiallyAssigned);
}

#[test]
fn test_nway_fault_promotes_a_standby() {
    let mut model = model_with_sg(NWay, 3, 1);
    model.sis.get_mut(&si(1)).unwrap().pref_standby_assignments = 2;
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);

    engine::su_fault(&mut model, &su(1)).unwrap();
    ack_all(&mut model);

    let s = &model.sis[&si(1)];
    assert_eq!(s.num_curr_active, 1);
    assert!(!model.assignments.contains_key(&(su(1), si(1))));
}

#[test]
fn test_nplusm_one_active_one_standby_per_si() {
    let mut model = model_with_sg(NPlusM, 2, 2);
    {
        let sg = model.sgs.get_mut(&common::sg1()).unwrap();
        sg.pref_active_sus = 1;
        sg.pref_standby_sus = 1;
    }
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);
    engine::si_new(&mut model, &si(2)).unwrap();
    ack_all(&mut model);

    // SU1 is the active pool, SU2 the standby pool; both SIs follow it.
    for i in 1..=2 {
        let s = &model.sis[&si(i)];
        assert_eq!(s.num_curr_active, 1);
        assert_eq!(s.num_curr_standby, 1);
        assert_eq!(s.assignment_state, AssignmentState::FullyAssigned);
        assert_eq!(model.assignments[&(su(1), si(i))].ha_state, HaState::Active);
        assert_eq!(model.assignments[&(su(2), si(i))].ha_state, HaState::Standby);
    }
}

#[test]
fn test_nplusm_fault_promotes_standby_pool_member() {
    let mut model = model_with_sg(NPlusM, 2, 1);
    {
        let sg = model.sgs.get_mut(&common::sg1()).unwrap();
        sg.pref_active_sus = 1;
        sg.pref_standby_sus = 1;
    }
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);

    engine::su_fault(&mut model, &su(1)).unwrap();
    ack_all(&mut model);

    assert_eq!(
        model.assignments[&(su(2), si(1))].ha_state,
        HaState::Active,
        "the standby pool member was promoted"
    );
    assert_eq!(model.sis[&si(1)].num_curr_active, 1);
}
