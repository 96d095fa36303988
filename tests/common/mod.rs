// tests/common/mod.rs

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use amfd::config::{CheckpointConfig, Config, HaRole};
use amfd::core::alarm::AlarmService;
use amfd::core::bus::MessageBus;
use amfd::core::bus::local::LocalBus;
use amfd::core::imm::store::ObjectStore;
use amfd::core::model::Model;
use amfd::core::model::cluster::Cluster;
use amfd::core::model::comp::{Component, ComponentType};
use amfd::core::model::csi::Csi;
use amfd::core::model::dn::Dn;
use amfd::core::model::node::Node;
use amfd::core::model::sg::Sg;
use amfd::core::model::si::Si;
use amfd::core::model::states::{
    AdminState, CompCapability, CompCategory, OperState, RedundancyModel,
};
use amfd::core::model::su::Su;
use amfd::server::{self, DirectorHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub fn dn(s: &str) -> Dn {
    Dn::new(s).unwrap()
}

/// A model with one SG of the given redundancy, `n_sus` in-service SUs on
/// distinct nodes (each with one component), and `n_sis` SIs of one CSI
/// each.
pub fn model_with_sg(redundancy: RedundancyModel, n_sus: usize, n_sis: usize) -> Model {
    let mut model = Model::new();
    model
        .set_cluster(Cluster::new(dn("safAmfCluster=myAmfCluster"), Duration::from_secs(10)))
        .unwrap();
    model
        .add_comp_type(ComponentType::new(
            dn("safVersion=1,safCompType=TestType"),
            CompCategory::SaAware,
            CompCapability::OneActiveOrOneStandby,
        ))
        .unwrap();
    let mut sg = Sg::new(dn("safSg=SG1,safApp=App1"), redundancy);
    sg.pref_active_sus = 1;
    sg.pref_standby_sus = 1;
    sg.auto_repair = true;
    model.add_sg(sg).unwrap();

    for i in 1..=n_sus {
        let node_dn = dn(&format!("safAmfNode=PL-{i},safAmfCluster=myAmfCluster"));
        let mut node = Node::new(node_dn.clone());
        node.oper_state = OperState::Enabled;
        node.admin_state = AdminState::Unlocked;
        model.add_node(node).unwrap();

        let su_dn = dn(&format!("safSu=SU{i},safSg=SG1,safApp=App1"));
        let mut su = Su::new(su_dn.clone(), dn("safSg=SG1,safApp=App1"), node_dn, i as u32);
        su.oper_state = OperState::Enabled;
        model.add_su(su).unwrap();

        let ctype = model.comp_types[&dn("safVersion=1,safCompType=TestType")].clone();
        let comp = Component::from_type(
            dn(&format!("safComp=C1,safSu=SU{i},safSg=SG1,safApp=App1")),
            su_dn.clone(),
            &ctype,
        );
        model.add_comp(comp).unwrap();
        model.refresh_su_readiness(&su_dn);
    }
    for i in 1..=n_sis {
        let si_dn = dn(&format!("safSi=SI{i},safApp=App1"));
        let mut si = Si::new(si_dn.clone(), dn("safSg=SG1,safApp=App1"));
        si.rank = i as u32;
        model.add_si(si).unwrap();
        model
            .add_csi(Csi::new(dn(&format!("safCsi=CSI1,safSi=SI{i},safApp=App1")), si_dn))
            .unwrap();
    }
    model.take_effects();
    model
}

pub fn su(i: usize) -> Dn {
    dn(&format!("safSu=SU{i},safSg=SG1,safApp=App1"))
}

pub fn si(i: usize) -> Dn {
    dn(&format!("safSi=SI{i},safApp=App1"))
}

pub fn sg1() -> Dn {
    dn("safSg=SG1,safApp=App1")
}

/// Acknowledge every in-flight order against the engine, as a healthy node
/// director would, until the SG is stable again.
pub fn ack_all(model: &mut Model) {
    for _ in 0..64 {
        let in_flight: Vec<_> = model
            .assignments
            .values()
            .filter(|a| a.in_flight())
            .map(|a| {
                let op = match a.fsm {
                    amfd::core::model::states::AssignFsmState::Assigning => {
                        amfd::core::engine::AssignOp::Add
                    }
                    amfd::core::model::states::AssignFsmState::Unassigning => {
                        amfd::core::engine::AssignOp::Remove
                    }
                    _ => amfd::core::engine::AssignOp::Modify,
                };
                (a.su.clone(), a.si.clone(), op)
            })
            .collect();
        if in_flight.is_empty() {
            return;
        }
        for (su, si, op) in in_flight {
            let followups = amfd::core::engine::assign_done(model, &su, &si, op, true).unwrap();
            drop(followups); // follow-ups create new in-flight edges; next round acks them
        }
        model.take_effects();
    }
}

/// Config tuned for fast tests.
pub fn test_config(node_name: &str, role: HaRole, log_root: &std::path::Path) -> Config {
    Config {
        node_name: node_name.to_string(),
        role,
        model_file: None,
        log_root_directory: log_root.display().to_string(),
        log_level: "warn".to_string(),
        sync_send_timeout: Duration::from_secs(2),
        admin_op_timeout: Duration::from_secs(5),
        checkpoint: CheckpointConfig {
            warm_sync_interval: Duration::from_millis(200),
            cold_sync_timeout: Duration::from_secs(1),
            data_resp_timeout: Duration::from_secs(1),
        },
        comp_globals: Default::default(),
    }
}

/// One director plus its bus and store, ready for CCBs.
pub struct TestDirector {
    pub handle: DirectorHandle,
    pub bus: Arc<dyn MessageBus>,
    pub store: Arc<ObjectStore>,
    pub shutdown: broadcast::Sender<()>,
}

pub async fn spawn_test_director(config: Config) -> TestDirector {
    let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
    let store = Arc::new(ObjectStore::new());
    spawn_test_director_on(config, bus, store).await
}

pub async fn spawn_test_director_on(
    config: Config,
    bus: Arc<dyn MessageBus>,
    store: Arc<ObjectStore>,
) -> TestDirector {
    let (shutdown, _) = broadcast::channel(1);
    let (handle, _tasks) = server::spawn_director(
        config,
        bus.clone(),
        store.clone(),
        AlarmService::new(),
        &shutdown,
    )
    .await
    .expect("director spawn");
    TestDirector {
        handle,
        bus,
        store,
        shutdown,
    }
}

pub fn node_dn(i: usize) -> Dn {
    dn(&format!("safAmfNode=PL-{i},safAmfCluster=myAmfCluster"))
}

/// CCB operations for a cluster of `nodes` nodes and one 2N-style SG with
/// `sus` SUs (round-robin across nodes) and `sis` SIs. Components carry no
/// CLC commands, so they instantiate instantly under a node director.
pub fn ccb_model(redundancy: &str, nodes: usize, sus: usize, sis: usize) -> Vec<CcbOpBuilderOut> {
    use amfd::core::imm::ccb::CcbOp;
    use amfd::core::imm::store::ObjClass;
    use amfd::core::model::attr::{AttrValue, Attribute};

    let name = |n: &str, v: &str| Attribute::single(n, AttrValue::Name(dn(v)));
    let s = |n: &str, v: &str| Attribute::single(n, AttrValue::Str(v.to_string()));
    let u = |n: &str, v: u32| Attribute::single(n, AttrValue::Uint32(v));

    let mut ops = vec![
        CcbOp::create(ObjClass::Cluster, dn("safAmfCluster=myAmfCluster"), vec![]),
        CcbOp::create(ObjClass::App, dn("safApp=App1"), vec![]),
        CcbOp::create(
            ObjClass::CompType,
            dn("safVersion=1,safCompType=T1"),
            vec![s("saAmfCtCompCategory", "SA-AWARE")],
        ),
        CcbOp::create(
            ObjClass::Sg,
            dn("safSg=SG1,safApp=App1"),
            vec![s("saAmfSGRedundancyModel", redundancy)],
        ),
    ];
    for i in 1..=nodes {
        ops.insert(
            1,
            CcbOp::create(ObjClass::Node, node_dn(i), vec![u("saAmfNodeAutoRepair", 1)]),
        );
    }
    for i in 1..=sus {
        let host = node_dn(((i - 1) % nodes) + 1);
        ops.push(CcbOp::create(
            ObjClass::Su,
            dn(&format!("safSu=SU{i},safSg=SG1,safApp=App1")),
            vec![
                name("saAmfSUHostedByNode", host.as_str()),
                u("saAmfSURank", i as u32),
            ],
        ));
        ops.push(CcbOp::create(
            ObjClass::Comp,
            dn(&format!("safComp=C1,safSu=SU{i},safSg=SG1,safApp=App1")),
            vec![name("saAmfCompType", "safVersion=1,safCompType=T1")],
        ));
    }
    for i in 1..=sis {
        ops.push(CcbOp::create(
            ObjClass::Si,
            dn(&format!("safSi=SI{i},safApp=App1")),
            vec![
                name("saAmfSIProtectedbySG", "safSg=SG1,safApp=App1"),
                u("saAmfSIRank", i as u32),
            ],
        ));
        ops.push(CcbOp::create(
            ObjClass::Csi,
            dn(&format!("safCsi=CSI1,safSi=SI{i},safApp=App1")),
            vec![],
        ));
    }
    ops
}

pub type CcbOpBuilderOut = amfd::core::imm::ccb::CcbOp;

/// Polls `check` against fresh snapshots until it passes or the deadline
/// hits.
pub async fn wait_until<F>(handle: &DirectorHandle, mut check: F)
where
    F: FnMut(&amfd::core::model::ModelSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = handle.snapshot().await.expect("snapshot");
        if check(&snapshot) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached before deadline");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
