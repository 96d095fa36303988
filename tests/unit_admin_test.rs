mod common;

use amfd::core::admin::{AdminAction, AdminEngine, AdminOpId, AdminRequest, PendingKey};
use amfd::core::alarm::AlarmService;
use amfd::core::errors::AmfError;
use amfd::core::model::states::RedundancyModel::TwoN;
use amfd::core::model::states::{AdminState, PresenceState};
use common::{model_with_sg, si, su};
use tokio::sync::oneshot;

fn req(dn: amfd::core::model::dn::Dn, op: AdminOpId, invocation: u64) -> AdminRequest {
    AdminRequest {
        invocation,
        dn,
        op,
        params: Vec::new(),
    }
}

#[test]
fn test_op_id_round_trip() {
    for code in [1, 2, 3, 4, 5, 6, 7, 10, 11, 101] {
        let op = AdminOpId::from_op_code(code).unwrap();
        assert_eq!(op.op_code(), code);
    }
    assert!(AdminOpId::from_op_code(42).is_none());
}

#[tokio::test]
async fn test_restart_rejected_on_middleware_component() {
    let mut model = model_with_sg(TwoN, 1, 0);
    model.sus.get_mut(&su(1)).unwrap().middleware = true;
    let mut admin = AdminEngine::new();
    let comp = amfd::core::model::dn::Dn::new("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1").unwrap();

    let (tx, rx) = oneshot::channel();
    let actions = admin.start(&mut model, req(comp, AdminOpId::Restart, 1), tx);
    assert!(actions.is_empty());
    assert!(matches!(rx.await.unwrap(), Err(AmfError::BadOperation(_))));
}

#[tokio::test]
async fn test_restart_dispatches_for_application_component() {
    let mut model = model_with_sg(TwoN, 1, 0);
    let mut admin = AdminEngine::new();
    let comp = amfd::core::model::dn::Dn::new("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1").unwrap();

    let (tx, mut rx) = oneshot::channel();
    let actions = admin.start(&mut model, req(comp.clone(), AdminOpId::Restart, 1), tx);
    assert_eq!(actions, vec![AdminAction::RestartComp(comp.clone())]);
    assert!(rx.try_recv().is_err(), "completion waits for the ack");

    let alarms = AlarmService::new();
    let done = admin.note_ack(&mut model, &alarms, PendingKey::Comp(comp), true);
    assert_eq!(done, Some(1));
    assert!(rx.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_second_operation_on_busy_target_gets_try_again() {
    let mut model = model_with_sg(TwoN, 1, 0);
    model.sus.get_mut(&su(1)).unwrap().presence_state = PresenceState::Instantiated;
    let mut admin = AdminEngine::new();

    let (tx, _rx) = oneshot::channel();
    model.su_set_admin_state(&su(1), AdminState::Locked).unwrap();
    let actions = admin.start(
        &mut model,
        req(su(1), AdminOpId::LockInstantiation, 1),
        tx,
    );
    assert_eq!(actions.len(), 1, "one SU termination dispatched");

    let (tx2, rx2) = oneshot::channel();
    let actions2 = admin.start(&mut model, req(su(1), AdminOpId::UnlockInstantiation, 2), tx2);
    assert!(actions2.is_empty());
    assert!(matches!(rx2.await.unwrap(), Err(AmfError::TryAgain(_))));
}

#[tokio::test]
async fn test_partial_failure_reports_repair_pending() {
    let mut model = model_with_sg(TwoN, 1, 0);
    model.sus.get_mut(&su(1)).unwrap().presence_state = PresenceState::Instantiated;
    model.su_set_admin_state(&su(1), AdminState::Locked).unwrap();
    let mut admin = AdminEngine::new();

    let (tx, rx) = oneshot::channel();
    let actions = admin.start(&mut model, req(su(1), AdminOpId::LockInstantiation, 1), tx);
    assert_eq!(actions.len(), 1);

    let alarms = AlarmService::new();
    admin.note_ack(&mut model, &alarms, PendingKey::Su(su(1)), false);
    assert!(matches!(rx.await.unwrap(), Err(AmfError::RepairPending(_))));
}

#[tokio::test]
async fn test_si_swap_only_on_two_n() {
    use amfd::core::model::states::RedundancyModel::NWayActive;
    let mut model = model_with_sg(NWayActive, 2, 1);
    let mut admin = AdminEngine::new();
    let (tx, rx) = oneshot::channel();
    let actions = admin.start(&mut model, req(si(1), AdminOpId::SiSwap, 1), tx);
    assert!(actions.is_empty());
    assert!(matches!(rx.await.unwrap(), Err(AmfError::BadOperation(_))));
}

#[tokio::test]
async fn test_admin_timeout_fails_the_task() {
    let mut model = model_with_sg(TwoN, 1, 0);
    model.sus.get_mut(&su(1)).unwrap().presence_state = PresenceState::Instantiated;
    model.su_set_admin_state(&su(1), AdminState::Locked).unwrap();
    let mut admin = AdminEngine::new();

    let (tx, rx) = oneshot::channel();
    admin.start(&mut model, req(su(1), AdminOpId::LockInstantiation, 9), tx);
    admin.note_timeout(&mut model, 9);
    assert!(matches!(rx.await.unwrap(), Err(AmfError::Timeout(_))));
    assert!(!admin.has_task(9));
}
