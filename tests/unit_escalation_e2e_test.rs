mod common;

use amfd::config::HaRole;
use amfd::core::avnd::msg::AvndToAvd;
use amfd::core::avnd::spawn_node_director;
use amfd::core::events::Event;
use amfd::core::imm::ccb::CcbOp;
use amfd::core::imm::store::ObjClass;
use amfd::core::model::attr::{AttrValue, Attribute};
use amfd::core::model::states::{AssignmentState, HaState, Recovery};
use common::{ccb_model, dn, node_dn, sg1, spawn_test_director, test_config, wait_until};

/// The three-tier recovery ladder: component restart while the budget
/// lasts, then an in-place SU restart, then SU failover.
#[tokio::test]
async fn test_component_restart_escalates_through_su_restart_to_failover() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config("safAmfNode=SC-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path());
    let td = spawn_test_director(config).await;

    td.handle.ccb(ccb_model("TWO-N", 2, 2, 1)).await.unwrap();
    // One component restart and one SU restart allowed, no probation reset.
    td.handle
        .ccb(vec![CcbOp::modify(
            ObjClass::Sg,
            sg1(),
            vec![
                Attribute::single("saAmfSGCompRestartMax", AttrValue::Uint32(1)),
                Attribute::single("saAmfSGSuRestartMax", AttrValue::Uint32(1)),
            ],
        )])
        .await
        .unwrap();

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
    let comp = dn("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1");
    let report = || {
        Event::Avnd(AvndToAvd::ErrorReport {
            node: node_dn(1),
            comp: comp.clone(),
            recovery: Recovery::ComponentRestart,
        })
    };

    // Tier 1: within the component-restart budget.
    td.handle.events.post(report()).await;
    wait_until(&td.handle, |snap| {
        snap.comps
            .iter()
            .any(|c| c.dn == comp && c.restart_count == 1)
    })
    .await;
    let snap = td.handle.snapshot().await.unwrap();
    assert!(
        snap.assignments
            .iter()
            .any(|a| a.su == su1 && a.ha_state == HaState::Active),
        "the workload stays put during a component restart"
    );

    // Tier 2: budget exhausted, the whole SU restarts in place.
    td.handle.events.post(report()).await;
    wait_until(&td.handle, |snap| {
        snap.sus.iter().any(|s| s.dn == su1 && s.restart_count == 1)
    })
    .await;
    let snap = td.handle.snapshot().await.unwrap();
    assert!(
        snap.assignments
            .iter()
            .any(|a| a.su == su1 && a.ha_state == HaState::Active),
        "an in-place SU restart keeps the assignments"
    );

    // Tier 3: SU restart budget gone too; the workload fails over.
    td.handle.events.post(report()).await;
    wait_until(&td.handle, |snap| {
        snap.assignments.iter().all(|a| a.su != su1)
            && snap
                .assignments
                .iter()
                .any(|a| a.ha_state == HaState::Active)
    })
    .await;
}
