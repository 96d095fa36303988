mod common;

use amfd::core::engine;
use amfd::core::model::states::RedundancyModel::{NWayActive, NoRedundancy};
use amfd::core::model::states::{AssignmentState, HaState};
use common::{ack_all, model_with_sg, si, su};

#[test]
fn test_nway_active_spreads_actives_across_sus() {
    let mut model = model_with_sg(NWayActive, 3, 1);
    model.sis.get_mut(&si(1)).unwrap().pref_active_assignments = 3;
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);

    let s = &model.sis[&si(1)];
    assert_eq!(s.num_curr_active, 3);
    assert_eq!(s.num_curr_standby, 0, "n-way-active never has standbys");
    assert_eq!(s.assignment_state, AssignmentState::FullyAssigned);
}

#[test]
fn test_nway_active_pref_shrink_quiesces_excess() {
    let mut model = model_with_sg(NWayActive, 3, 1);
    model.sis.get_mut(&si(1)).unwrap().pref_active_assignments = 3;
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);
    assert_eq!(model.sis[&si(1)].num_curr_active, 3);

    // Shrink the preference; one assignment must quiesce and disappear.
    model.sis.get_mut(&si(1)).unwrap().pref_active_assignments = 2;
    let orders = engine::si_pref_changed(&mut model, &si(1)).unwrap();
    assert!(orders.iter().any(|o| o.ha == HaState::Quiesced));
    ack_all(&mut model);

    let s = &model.sis[&si(1)];
    assert_eq!(s.num_curr_active, 2);
    assert_eq!(s.assignment_state, AssignmentState::FullyAssigned);
    assert_eq!(model.assignments.len(), 2, "excess edge was removed");
}

#[test]
fn test_nway_active_partial_with_too_few_sus() {
    let mut model = model_with_sg(NWayActive, 1, 1);
    model.sis.get_mut(&si(1)).unwrap().pref_active_assignments = 2;
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);

    let s = &model.sis[&si(1)];
    assert_eq!(s.num_curr_active, 1);
    assert_eq!(
        s.assignment_state,
        AssignmentState::PartiallyAssigned,
        "one in-service SU cannot satisfy two preferred actives"
    );
}

#[test]
fn test_nway_active_fault_refills_on_spare() {
    let mut model = model_with_sg(NWayActive, 3, 1);
    model.sis.get_mut(&si(1)).unwrap().pref_active_assignments = 2;
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);
    assert_eq!(model.sis[&si(1)].num_curr_active, 2);

    engine::su_fault(&mut model, &su(1)).unwrap();
    ack_all(&mut model);

    let s = &model.sis[&si(1)];
    assert_eq!(s.num_curr_active, 2, "spare SU took the lost assignment");
    assert!(!model.assignments.contains_key(&(su(1), si(1))));
}

#[test]
fn test_no_redundancy_one_si_per_su() {
    let mut model = model_with_sg(NoRedundancy, 2, 2);
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);
    engine::si_new(&mut model, &si(2)).unwrap();
    ack_all(&mut model);

    // Each SI landed on its own SU.
    let su_of_si1 = &model.assignments[&(su(1), si(1))].su;
    assert_eq!(su_of_si1, &su(1));
    assert!(model.assignments.contains_key(&(su(2), si(2))));
    assert_eq!(model.sis[&si(1)].assignment_state, AssignmentState::FullyAssigned);
    assert_eq!(model.sis[&si(2)].assignment_state, AssignmentState::FullyAssigned);
}

#[test]
fn test_no_redundancy_fault_without_spare_is_fatal() {
    let mut model = model_with_sg(NoRedundancy, 2, 2);
    engine::si_new(&mut model, &si(1)).unwrap();
    ack_all(&mut model);
    engine::si_new(&mut model, &si(2)).unwrap();
    ack_all(&mut model);

    engine::su_fault(&mut model, &su(1)).unwrap();
    ack_all(&mut model);
    assert_eq!(
        model.sis[&si(1)].assignment_state,
        AssignmentState::Unassigned,
        "no spare SU; the workload stays down"
    );
    assert_eq!(
        model.sis[&si(2)].assignment_state,
        AssignmentState::FullyAssigned,
        "the healthy SU keeps its own SI"
    );
}
