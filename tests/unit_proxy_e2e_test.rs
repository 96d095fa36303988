mod common;

use amfd::config::HaRole;
use amfd::core::admin::AdminOpId;
use amfd::core::avnd::spawn_node_director;
use amfd::core::imm::ccb::CcbOp;
use amfd::core::imm::store::ObjClass;
use amfd::core::model::attr::{AttrValue, Attribute};
use amfd::core::model::states::{PresenceState, ProxyStatus};
use common::{dn, node_dn, spawn_test_director, test_config, wait_until};

fn name(n: &str, v: &str) -> Attribute {
    Attribute::single(n, AttrValue::Name(dn(v)))
}
fn s(n: &str, v: &str) -> Attribute {
    Attribute::single(n, AttrValue::Str(v.to_string()))
}

/// One SU carrying a proxy (SA-aware) component and a proxied component.
fn proxy_model() -> Vec<CcbOp> {
    vec![
        CcbOp::create(ObjClass::Cluster, dn("safAmfCluster=myAmfCluster"), vec![]),
        CcbOp::create(ObjClass::Node, node_dn(1), vec![]),
        CcbOp::create(ObjClass::App, dn("safApp=App1"), vec![]),
        CcbOp::create(
            ObjClass::CompType,
            dn("safVersion=1,safCompType=ProxyType"),
            vec![s("saAmfCtCompCategory", "SA-AWARE")],
        ),
        CcbOp::create(
            ObjClass::CompType,
            dn("safVersion=1,safCompType=ProxiedType"),
            vec![
                s("saAmfCtCompCategory", "PROXIED-LOCAL-PRE-INST"),
                s("saAmfCtCompCapability", "ONE-ACTIVE"),
            ],
        ),
        CcbOp::create(
            ObjClass::Sg,
            dn("safSg=SG1,safApp=App1"),
            vec![s("saAmfSGRedundancyModel", "TWO-N")],
        ),
        CcbOp::create(
            ObjClass::Su,
            dn("safSu=SU1,safSg=SG1,safApp=App1"),
            vec![name("saAmfSUHostedByNode", node_dn(1).as_str())],
        ),
        CcbOp::create(
            ObjClass::Comp,
            dn("safComp=Proxy,safSu=SU1,safSg=SG1,safApp=App1"),
            vec![name("saAmfCompType", "safVersion=1,safCompType=ProxyType")],
        ),
        CcbOp::create(
            ObjClass::Comp,
            dn("safComp=Proxied,safSu=SU1,safSg=SG1,safApp=App1"),
            vec![name("saAmfCompType", "safVersion=1,safCompType=ProxiedType")],
        ),
    ]
}

#[tokio::test]
async fn test_proxied_component_registers_with_its_proxy() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config("safAmfNode=SC-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path());
    let td = spawn_test_director(config).await;

    td.handle.ccb(proxy_model()).await.unwrap();
    spawn_node_director(node_dn(1), td.bus.clone(), td.shutdown.subscribe())
        .await
        .unwrap();

    let proxied = dn("safComp=Proxied,safSu=SU1,safSg=SG1,safApp=App1");
    let proxy = dn("safComp=Proxy,safSu=SU1,safSg=SG1,safApp=App1");

    // Both components come up and the proxied one binds to the proxy.
    wait_until(&td.handle, |snap| {
        snap.comps.iter().any(|c| {
            c.dn == proxied
                && c.proxy_status == ProxyStatus::Proxied
                && c.current_proxy.as_ref() == Some(&proxy)
        })
    })
    .await;
}

#[tokio::test]
async fn test_proxy_restart_orphans_then_reproxies() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config("safAmfNode=SC-1,safAmfCluster=myAmfCluster", HaRole::Active, tmp.path());
    let td = spawn_test_director(config).await;

    td.handle.ccb(proxy_model()).await.unwrap();
    spawn_node_director(node_dn(1), td.bus.clone(), td.shutdown.subscribe())
        .await
        .unwrap();

    let proxied = dn("safComp=Proxied,safSu=SU1,safSg=SG1,safApp=App1");
    let proxy = dn("safComp=Proxy,safSu=SU1,safSg=SG1,safApp=App1");
    wait_until(&td.handle, |snap| {
        snap.comps
            .iter()
            .any(|c| c.dn == proxied && c.proxy_status == ProxyStatus::Proxied)
    })
    .await;

    // Restarting the proxy tears the link down and re-registers it once
    // the proxy is back.
    td.handle.admin(proxy.clone(), AdminOpId::Restart).await.unwrap();
    wait_until(&td.handle, |snap| {
        snap.comps.iter().any(|c| {
            c.dn == proxied
                && c.proxy_status == ProxyStatus::Proxied
                && c.current_proxy.as_ref() == Some(&proxy)
        }) && snap
            .comps
            .iter()
            .any(|c| c.dn == proxy && c.presence_state == PresenceState::Instantiated
                && c.restart_count == 1)
    })
    .await;
}
