mod common;

use amfd::config::HaRole;
use amfd::core::bus::MessageBus;
use amfd::core::bus::local::LocalBus;
use amfd::core::imm::store::ObjectStore;
use amfd::core::model::states::AssignmentState;
use common::{ccb_model, node_dn, spawn_test_director_on, test_config, wait_until};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_cold_sync_replicates_full_model() {
    let tmp = tempfile::tempdir().unwrap();
    let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());

    let active = spawn_test_director_on(
        test_config("safAmfNode=SC-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path()),
        bus.clone(),
        Arc::new(ObjectStore::new()),
    )
    .await;
    active.handle.ccb(ccb_model("TWO-N", 2, 2, 2)).await.unwrap();

    let standby = spawn_test_director_on(
        test_config("safAmfNode=SC-2,safAmfCluster=myAmfCluster", HaRole::Standby, tmp.path()),
        bus.clone(),
        Arc::new(ObjectStore::new()),
    )
    .await;

    // The standby cold-syncs and converges on an identical model image.
    wait_until(&standby.handle, |snap| !snap.nodes.is_empty()).await;
    let active_snap = active.handle.snapshot().await.unwrap();
    let standby_snap = standby.handle.snapshot().await.unwrap();
    assert_eq!(active_snap, standby_snap);
    assert_eq!(standby_snap.nodes.len(), 2);
    assert_eq!(standby_snap.sus.len(), 2);
    assert_eq!(standby_snap.sis.len(), 2);
}

#[tokio::test]
async fn test_async_updates_keep_standby_converged() {
    let tmp = tempfile::tempdir().unwrap();
    let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());

    let active = spawn_test_director_on(
        test_config("safAmfNode=SC-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path()),
        bus.clone(),
        Arc::new(ObjectStore::new()),
    )
    .await;
    active.handle.ccb(ccb_model("TWO-N", 2, 2, 1)).await.unwrap();

    let standby = spawn_test_director_on(
        test_config("safAmfNode=SC-2,safAmfCluster=myAmfCluster", HaRole::Standby, tmp.path()),
        bus.clone(),
        Arc::new(ObjectStore::new()),
    )
    .await;
    wait_until(&standby.handle, |snap| snap.sus.len() == 2).await;

    // Changes after the cold sync ride async updates: bring the cluster up
    // and let the assignment flow replicate record by record.
    for i in 1..=2 {
        amfd::core::avnd::spawn_node_director(node_dn(i), bus.clone(), active.shutdown.subscribe())
            .await
            .unwrap();
    }
    wait_until(&active.handle, |snap| {
        snap.sis
            .iter()
            .all(|si| si.assignment_state == AssignmentState::FullyAssigned)
    })
    .await;

    wait_until(&standby.handle, |snap| {
        snap.sis
            .iter()
            .all(|si| si.assignment_state == AssignmentState::FullyAssigned)
            && snap.assignments.len() == 2
    })
    .await;

    // Quiescent point: both peers hold the same image.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let active_snap = active.handle.snapshot().await.unwrap();
    let standby_snap = standby.handle.snapshot().await.unwrap();
    assert_eq!(active_snap.assignments, standby_snap.assignments);
    assert_eq!(active_snap.sis, standby_snap.sis);
}
