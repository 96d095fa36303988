mod common;

use amfd::config::HaRole;
use amfd::core::admin::AdminOpId;
use amfd::core::avnd::spawn_node_director;
use amfd::core::errors::AmfError;
use amfd::core::model::states::{
    AdminState, AssignmentState, HaState, PresenceState, ReadinessState,
};
use common::{ccb_model, dn, node_dn, spawn_test_director, test_config, wait_until};

#[tokio::test]
async fn test_cluster_bringup_assigns_workload() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config("safAmfNode=PL-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path());
    let td = spawn_test_director(config).await;

    td.handle.ccb(ccb_model("TWO-N", 2, 2, 1)).await.unwrap();

    for i in 1..=2 {
        spawn_node_director(node_dn(i), td.bus.clone(), td.shutdown.subscribe())
            .await
            .unwrap();
    }

    wait_until(&td.handle, |snap| {
        snap.sis
            .iter()
            .all(|si| si.assignment_state == AssignmentState::FullyAssigned)
    })
    .await;

    let snap = td.handle.snapshot().await.unwrap();
    assert!(snap.sus.iter().all(|su| su.readiness_state == ReadinessState::InService));
    assert!(snap.sus.iter().all(|su| su.presence_state == PresenceState::Instantiated));
    let active = snap
        .assignments
        .iter()
        .filter(|a| a.ha_state == HaState::Active)
        .count();
    let standby = snap
        .assignments
        .iter()
        .filter(|a| a.ha_state == HaState::Standby)
        .count();
    assert_eq!((active, standby), (1, 1));

    // Runtime reads answer from the live model.
    let state = td
        .handle
        .runtime_read(dn("safSi=SI1,safApp=App1"), "saAmfSIAssignmentState")
        .await
        .unwrap();
    assert_eq!(state, "FULLY-ASSIGNED");
}

#[tokio::test]
async fn test_node_lock_instantiation_terminates_all_sus() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config("safAmfNode=PL-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path());
    let td = spawn_test_director(config).await;

    // Three SUs, all on one node; no SIs keeps them unassigned.
    td.handle.ccb(ccb_model("TWO-N", 1, 3, 0)).await.unwrap();
    spawn_node_director(node_dn(1), td.bus.clone(), td.shutdown.subscribe())
        .await
        .unwrap();

    wait_until(&td.handle, |snap| {
        snap.sus
            .iter()
            .all(|su| su.presence_state == PresenceState::Instantiated)
    })
    .await;

    td.handle
        .admin(node_dn(1), AdminOpId::Lock)
        .await
        .unwrap();
    td.handle
        .admin(node_dn(1), AdminOpId::LockInstantiation)
        .await
        .unwrap();

    // All three terminate confirmations arrived before the operation
    // reported completion; the node rests in LOCKED-INSTANTIATION.
    let snap = td.handle.snapshot().await.unwrap();
    assert_eq!(snap.nodes[0].admin_state, AdminState::LockedInstantiation);
    assert!(snap
        .sus
        .iter()
        .all(|su| su.presence_state == PresenceState::Uninstantiated));
}

#[tokio::test]
async fn test_su_lock_quiesces_and_unlock_restores() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config("safAmfNode=PL-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path());
    let td = spawn_test_director(config).await;

    td.handle.ccb(ccb_model("TWO-N", 2, 2, 1)).await.unwrap();
    for i in 1..=2 {
        spawn_node_director(node_dn(i), td.bus.clone(), td.shutdown.subscribe())
            .await
            .unwrap();
    }
    wait_until(&td.handle, |snap| {
        snap.sis
            .iter()
            .all(|si| si.assignment_state == AssignmentState::FullyAssigned)
    })
    .await;

    let su1 = dn("safSu=SU1,safSg=SG1,safApp=App1");
    td.handle.admin(su1.clone(), AdminOpId::Lock).await.unwrap();

    // The standby took over; SU1 is out of service with no assignments.
    wait_until(&td.handle, |snap| {
        snap.assignments.iter().all(|a| a.su != su1)
    })
    .await;
    let snap = td.handle.snapshot().await.unwrap();
    let su1_snap = snap.sus.iter().find(|s| s.dn == su1).unwrap();
    assert_eq!(su1_snap.readiness_state, ReadinessState::OutOfService);

    // Lock-then-unlock restores the derived state.
    td.handle.admin(su1.clone(), AdminOpId::Unlock).await.unwrap();
    wait_until(&td.handle, |snap| {
        snap.sus
            .iter()
            .find(|s| s.dn == su1)
            .map(|s| s.readiness_state == ReadinessState::InService)
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn test_admin_validation_surface() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config("safAmfNode=PL-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path());
    let td = spawn_test_director(config).await;
    td.handle.ccb(ccb_model("TWO-N", 1, 1, 0)).await.unwrap();

    // EAM operations are reserved.
    let err = td
        .handle
        .admin(node_dn(1), AdminOpId::EamStart)
        .await
        .unwrap_err();
    assert!(matches!(err, AmfError::NotSupported(_)));

    // Unlocking an already-unlocked node is a BAD-OPERATION.
    let err = td
        .handle
        .admin(node_dn(1), AdminOpId::Unlock)
        .await
        .unwrap_err();
    assert!(matches!(err, AmfError::BadOperation(_)));

    // Unknown targets are NOT-EXIST.
    let err = td
        .handle
        .admin(dn("safApp=Ghost"), AdminOpId::Lock)
        .await
        .unwrap_err();
    assert!(matches!(err, AmfError::NotExist(_)));
}

#[tokio::test]
async fn test_standby_rejects_writers() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(
        "safAmfNode=SC-2,safAmfCluster=myAmfCluster",
        HaRole::Standby,
        tmp.path(),
    );
    let td = spawn_test_director(config).await;
    let err = td.handle.ccb(ccb_model("TWO-N", 1, 1, 0)).await.unwrap_err();
    assert!(matches!(err, AmfError::TryAgain(_)));
    let err = td
        .handle
        .admin(node_dn(1), AdminOpId::Lock)
        .await
        .unwrap_err();
    assert!(matches!(err, AmfError::TryAgain(_)));
}
