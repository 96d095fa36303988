mod common;

use amfd::core::model::ModelEffect;
use amfd::core::model::csi::Csi;
use amfd::core::model::dn::Dn;
use amfd::core::model::nodegroup::NodeGroup;
use amfd::core::model::states::RedundancyModel::TwoN;
use amfd::core::model::states::{AdminState, HaState, OperState, ReadinessState};
use common::{dn, model_with_sg, si, su};

#[test]
fn test_readiness_is_derived_from_all_enclosing_states() {
    let mut model = model_with_sg(TwoN, 1, 0);
    assert_eq!(model.sus[&su(1)].readiness_state, ReadinessState::InService);

    // Locking the SU takes it out of service.
    model.su_set_admin_state(&su(1), AdminState::Locked).unwrap();
    assert_eq!(model.sus[&su(1)].readiness_state, ReadinessState::OutOfService);
    model.su_set_admin_state(&su(1), AdminState::Unlocked).unwrap();
    assert_eq!(model.sus[&su(1)].readiness_state, ReadinessState::InService);

    // Node oper state dominates.
    let node = model.sus[&su(1)].node.clone();
    let changes = model.node_set_oper_state(&node, OperState::Disabled).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].new, ReadinessState::OutOfService);
    model.node_set_oper_state(&node, OperState::Enabled).unwrap();

    // Shutting-down maps to STOPPING, not OUT-OF-SERVICE.
    model.su_set_admin_state(&su(1), AdminState::ShuttingDown).unwrap();
    assert_eq!(model.sus[&su(1)].readiness_state, ReadinessState::Stopping);
}

#[test]
fn test_node_group_admin_state_gates_readiness() {
    let mut model = model_with_sg(TwoN, 1, 0);
    let node = model.sus[&su(1)].node.clone();
    model
        .add_node_group(NodeGroup::new(dn("safAmfNodeGroup=NG1"), vec![node]))
        .unwrap();
    assert_eq!(model.sus[&su(1)].readiness_state, ReadinessState::InService);

    let changes = model
        .nodegroup_set_admin_state(&dn("safAmfNodeGroup=NG1"), AdminState::Locked)
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(model.sus[&su(1)].readiness_state, ReadinessState::OutOfService);
}

#[test]
fn test_csi_rank_follows_dependency_dag() {
    let mut model = model_with_sg(TwoN, 1, 1);
    let c1 = dn("safCsi=CSI1,safSi=SI1,safApp=App1");
    let c2 = dn("safCsi=CSI2,safSi=SI1,safApp=App1");
    let c3 = dn("safCsi=CSI3,safSi=SI1,safApp=App1");
    model.add_csi(Csi::new(c2.clone(), si(1))).unwrap();
    model.add_csi(Csi::new(c3.clone(), si(1))).unwrap();
    assert_eq!(model.csis[&c1].rank, 1);
    assert_eq!(model.csis[&c2].rank, 1);

    // c2 depends on c1: its rank rises to 2; c3 on c2: rank 3.
    model.csi_add_dep(&c2, &c1).unwrap();
    model.csi_add_dep(&c3, &c2).unwrap();
    assert_eq!(model.csis[&c1].rank, 1);
    assert_eq!(model.csis[&c2].rank, 2);
    assert_eq!(model.csis[&c3].rank, 3);

    // Cycle attempts are rejected.
    assert!(model.csi_add_dep(&c1, &c3).is_err());

    // Removing the middle dependency recomputes the siblings.
    model.csi_remove_dep(&c2, &c1).unwrap();
    assert_eq!(model.csis[&c2].rank, 1);
    assert_eq!(model.csis[&c3].rank, 2);
}

#[test]
fn test_deleting_csi_recomputes_sibling_ranks() {
    let mut model = model_with_sg(TwoN, 1, 1);
    let c1 = dn("safCsi=CSI1,safSi=SI1,safApp=App1");
    let c2 = dn("safCsi=CSI2,safSi=SI1,safApp=App1");
    model.add_csi(Csi::new(c2.clone(), si(1))).unwrap();
    model.csi_add_dep(&c2, &c1).unwrap();
    assert_eq!(model.csis[&c2].rank, 2);

    model.remove_csi(&c1).unwrap();
    assert_eq!(model.csis[&c2].rank, 1, "dependency on the deleted CSI is gone");
    assert!(model.csis[&c2].deps.is_empty());
}

#[test]
fn test_si_counters_always_match_edges() {
    let mut model = model_with_sg(TwoN, 2, 1);
    model.create_assignment(&su(1), &si(1), HaState::Active).unwrap();
    model.create_assignment(&su(2), &si(1), HaState::Standby).unwrap();
    assert_eq!(model.sis[&si(1)].num_curr_active, 1);
    assert_eq!(model.sis[&si(1)].num_curr_standby, 1);

    model.modify_assignment_ha(&su(1), &si(1), HaState::Quiesced).unwrap();
    assert_eq!(model.sis[&si(1)].num_curr_active, 0, "quiesced is not active");

    model.delete_assignment(&su(1), &si(1)).unwrap();
    model.delete_assignment(&su(2), &si(1)).unwrap();
    assert_eq!(model.sis[&si(1)].num_curr_active, 0);
    assert_eq!(model.sis[&si(1)].num_curr_standby, 0);
}

#[test]
fn test_admin_state_change_emits_exactly_one_runtime_update() {
    let mut model = model_with_sg(TwoN, 1, 0);
    model.take_effects();
    model.su_set_admin_state(&su(1), AdminState::Locked).unwrap();
    let updates: Vec<_> = model
        .take_effects()
        .into_iter()
        .filter(|e| {
            matches!(e, ModelEffect::RuntimeUpdate { attr, .. } if attr == "saAmfSUAdminState")
        })
        .collect();
    assert_eq!(updates.len(), 1);
}

#[test]
fn test_node_delete_requires_locked_instantiation_and_no_sus() {
    let mut model = model_with_sg(TwoN, 1, 0);
    let node = model.sus[&su(1)].node.clone();
    assert!(model.remove_node(&node).is_err(), "unlocked node not removable");

    model
        .node_set_admin_state(&node, AdminState::Locked)
        .unwrap();
    model
        .node_set_admin_state(&node, AdminState::LockedInstantiation)
        .unwrap();
    assert!(
        model.remove_node(&node).is_err(),
        "node still hosts an SU"
    );

    let comp = dn("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1");
    model.remove_comp(&comp).unwrap();
    model.remove_su(&su(1)).unwrap();
    model.remove_node(&node).unwrap();
}

#[test]
fn test_node_group_with_mapped_su_cannot_be_deleted() {
    let mut model = model_with_sg(TwoN, 1, 0);
    let node = model.sus[&su(1)].node.clone();
    model
        .add_node_group(NodeGroup::new(dn("safAmfNodeGroup=NG1"), vec![node]))
        .unwrap();
    model.sus.get_mut(&su(1)).unwrap().node_group = Some(dn("safAmfNodeGroup=NG1"));

    assert!(model.remove_node_group(&dn("safAmfNodeGroup=NG1")).is_err());
    model.sus.get_mut(&su(1)).unwrap().node_group = None;
    model.remove_node_group(&dn("safAmfNodeGroup=NG1")).unwrap();
}

#[test]
fn test_cold_sync_roundtrip_reproduces_snapshot() {
    let mut active = model_with_sg(TwoN, 2, 2);
    active.create_assignment(&su(1), &si(1), HaState::Active).unwrap();
    active.create_assignment(&su(2), &si(1), HaState::Standby).unwrap();
    active.confirm_assignment(&su(1), &si(1)).unwrap();

    let records = active.cold_sync_records();
    let mut standby = amfd::core::model::Model::new();
    standby.set_replica_mode(true);
    for rec in records {
        standby.apply_record(rec).unwrap();
    }
    assert_eq!(active.snapshot(), standby.snapshot());
}

#[test]
fn test_rejects_dangling_references() {
    let mut model = model_with_sg(TwoN, 1, 0);
    let orphan = amfd::core::model::su::Su::new(
        dn("safSu=SUX,safSg=NoSuchSg,safApp=App1"),
        dn("safSg=NoSuchSg,safApp=App1"),
        dn("safAmfNode=PL-1,safAmfCluster=myAmfCluster"),
        1,
    );
    assert!(model.add_su(orphan).is_err());

    let orphan_csi = Csi::new(dn("safCsi=X,safSi=NoSi,safApp=App1"), Dn::new("safSi=NoSi,safApp=App1").unwrap());
    assert!(model.add_csi(orphan_csi).is_err());
}
