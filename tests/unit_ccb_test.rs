mod common;

use amfd::config::CompGlobalConfig;
use amfd::core::errors::AmfError;
use amfd::core::imm::ccb::{self, CcbOp};
use amfd::core::imm::store::{ObjClass, ObjectStore};
use amfd::core::model::Model;
use amfd::core::model::attr::{AttrValue, Attribute};
use common::dn;

fn attr(name: &str, value: AttrValue) -> Attribute {
    Attribute::single(name, value)
}

fn str_attr(name: &str, value: &str) -> Attribute {
    attr(name, AttrValue::Str(value.to_string()))
}

fn u32_attr(name: &str, value: u32) -> Attribute {
    attr(name, AttrValue::Uint32(value))
}

fn name_attr(name: &str, value: &str) -> Attribute {
    attr(name, AttrValue::Name(dn(value)))
}

/// A minimal valid bundle: cluster, node, app, SG, SU with type, SI, CSI,
/// component type, component.
fn base_ops() -> Vec<CcbOp> {
    vec![
        CcbOp::create(ObjClass::Cluster, dn("safAmfCluster=myAmfCluster"), vec![]),
        CcbOp::create(
            ObjClass::Node,
            dn("safAmfNode=PL-3,safAmfCluster=myAmfCluster"),
            vec![],
        ),
        CcbOp::create(ObjClass::App, dn("safApp=App1"), vec![]),
        CcbOp::create(
            ObjClass::CompType,
            dn("safVersion=1,safCompType=T1"),
            vec![str_attr("saAmfCtCompCategory", "SA-AWARE")],
        ),
        CcbOp::create(
            ObjClass::Sg,
            dn("safSg=SG1,safApp=App1"),
            vec![str_attr("saAmfSGRedundancyModel", "TWO-N")],
        ),
        CcbOp::create(
            ObjClass::Su,
            dn("safSu=SU1,safSg=SG1,safApp=App1"),
            vec![
                name_attr("saAmfSUHostedByNode", "safAmfNode=PL-3,safAmfCluster=myAmfCluster"),
                u32_attr("saAmfSURank", 1),
            ],
        ),
        CcbOp::create(
            ObjClass::Comp,
            dn("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1"),
            vec![name_attr("saAmfCompType", "safVersion=1,safCompType=T1")],
        ),
        CcbOp::create(
            ObjClass::Si,
            dn("safSi=SI1,safApp=App1"),
            vec![name_attr("saAmfSIProtectedbySG", "safSg=SG1,safApp=App1")],
        ),
        CcbOp::create(ObjClass::Csi, dn("safCsi=CSI1,safSi=SI1,safApp=App1"), vec![]),
    ]
}

fn run_ccb(model: &mut Model, store: &ObjectStore, ops: Vec<CcbOp>) -> Result<(), AmfError> {
    let globals = CompGlobalConfig::default();
    ccb::ccb_completed(1, model, store, &globals, &ops)?;
    ccb::ccb_apply(1, model, store, &globals, ops)?;
    Ok(())
}

#[test]
fn test_full_bundle_populates_model() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    run_ccb(&mut model, &store, base_ops()).unwrap();
    assert!(model.cluster.is_some());
    assert_eq!(model.nodes.len(), 1);
    assert_eq!(model.sgs.len(), 1);
    assert_eq!(model.sus.len(), 1);
    assert_eq!(model.comps.len(), 1);
    assert_eq!(model.sis.len(), 1);
    assert_eq!(model.csis.len(), 1);
    assert!(model.sus[&dn("safSu=SU1,safSg=SG1,safApp=App1")].preinstantiable);
}

#[test]
fn test_identical_recreate_is_idempotent() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    run_ccb(&mut model, &store, base_ops()).unwrap();
    // The same bundle again: attribute-identical creates silently succeed.
    run_ccb(&mut model, &store, base_ops()).unwrap();
    assert_eq!(model.nodes.len(), 1);
}

#[test]
fn test_conflicting_recreate_is_rejected() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    run_ccb(&mut model, &store, base_ops()).unwrap();
    let ops = vec![CcbOp::create(
        ObjClass::Node,
        dn("safAmfNode=PL-3,safAmfCluster=myAmfCluster"),
        vec![u32_attr("saAmfNodeSuFailoverMax", 9)],
    )];
    let err = run_ccb(&mut model, &store, ops).unwrap_err();
    assert!(matches!(err, AmfError::Exist(_)));
}

#[test]
fn test_dangling_reference_is_rejected() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    let ops = vec![
        CcbOp::create(ObjClass::App, dn("safApp=App1"), vec![]),
        CcbOp::create(
            ObjClass::Si,
            dn("safSi=SI1,safApp=App1"),
            vec![name_attr("saAmfSIProtectedbySG", "safSg=Missing,safApp=App1")],
        ),
    ];
    let err = run_ccb(&mut model, &store, ops).unwrap_err();
    assert!(matches!(err, AmfError::NotExist(_)));
}

#[test]
fn test_csi_dependency_must_stay_in_same_si() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    let mut ops = base_ops();
    ops.push(CcbOp::create(
        ObjClass::Si,
        dn("safSi=SI2,safApp=App1"),
        vec![name_attr("saAmfSIProtectedbySG", "safSg=SG1,safApp=App1")],
    ));
    ops.push(CcbOp::create(
        ObjClass::Csi,
        dn("safCsi=CSI2,safSi=SI2,safApp=App1"),
        vec![name_attr("saAmfCSIDependencies", "safCsi=CSI1,safSi=SI1,safApp=App1")],
    ));
    let err = run_ccb(&mut model, &store, ops).unwrap_err();
    assert!(matches!(err, AmfError::InvalidParam(_)));
}

#[test]
fn test_si_dependency_cycle_is_rejected() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    let mut ops = base_ops();
    ops.push(CcbOp::create(
        ObjClass::Si,
        dn("safSi=SI2,safApp=App1"),
        vec![name_attr("saAmfSIProtectedbySG", "safSg=SG1,safApp=App1")],
    ));
    ops.push(CcbOp::create(
        ObjClass::SiDependency,
        dn("safDepend=D1,safSi=SI2,safApp=App1"),
        vec![name_attr("saAmfDependencySponsor", "safSi=SI1,safApp=App1")],
    ));
    ops.push(CcbOp::create(
        ObjClass::SiDependency,
        dn("safDepend=D2,safSi=SI1,safApp=App1"),
        vec![name_attr("saAmfDependencySponsor", "safSi=SI2,safApp=App1")],
    ));
    let err = run_ccb(&mut model, &store, ops).unwrap_err();
    assert!(matches!(err, AmfError::InvalidParam(_)));
}

#[test]
fn test_su_type_component_cardinality() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    let mut ops = base_ops();
    // An SU type allowing one component, referenced by a second SU carrying
    // two of them.
    ops.insert(
        0,
        CcbOp::create(
            ObjClass::SuType,
            dn("safVersion=1,safSuType=Small"),
            vec![u32_attr("saAmfSutMaxNumComponents", 1)],
        ),
    );
    ops.push(CcbOp::create(
        ObjClass::Su,
        dn("safSu=SU2,safSg=SG1,safApp=App1"),
        vec![
            name_attr("saAmfSUHostedByNode", "safAmfNode=PL-3,safAmfCluster=myAmfCluster"),
            name_attr("saAmfSUType", "safVersion=1,safSuType=Small"),
        ],
    ));
    ops.push(CcbOp::create(
        ObjClass::Comp,
        dn("safComp=C1,safSu=SU2,safSg=SG1,safApp=App1"),
        vec![name_attr("saAmfCompType", "safVersion=1,safCompType=T1")],
    ));
    ops.push(CcbOp::create(
        ObjClass::Comp,
        dn("safComp=C2,safSu=SU2,safSg=SG1,safApp=App1"),
        vec![name_attr("saAmfCompType", "safVersion=1,safCompType=T1")],
    ));
    let err = run_ccb(&mut model, &store, ops).unwrap_err();
    assert!(matches!(err, AmfError::NoResources(_)));
}

#[test]
fn test_category_capability_mismatch_rejected() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    let ops = vec![CcbOp::create(
        ObjClass::CompType,
        dn("safVersion=1,safCompType=Bad"),
        vec![
            str_attr("saAmfCtCompCategory", "NON-SAF"),
            str_attr("saAmfCtCompCapability", "X-ACTIVE-AND-Y-STANDBY"),
        ],
    )];
    let err = run_ccb(&mut model, &store, ops).unwrap_err();
    assert!(matches!(err, AmfError::InvalidParam(_)));
}

#[test]
fn test_no_recommendation_is_promoted_on_create_and_modify() {
    use amfd::core::model::states::Recovery;
    let mut model = Model::new();
    let store = ObjectStore::new();
    let mut ops = base_ops();
    // The component overrides recovery with NO-RECOMMENDATION.
    ops.iter_mut()
        .find(|op| op.class == ObjClass::Comp)
        .unwrap()
        .attrs
        .push(str_attr("saAmfCompRecoveryOnError", "NO-RECOMMENDATION"));
    run_ccb(&mut model, &store, ops).unwrap();
    let comp_dn = dn("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1");
    assert_eq!(
        model.comps[&comp_dn].recovery_on_error,
        Recovery::ComponentFailover
    );

    // Modify-in-place rewrites as well.
    run_ccb(
        &mut model,
        &store,
        vec![CcbOp::modify(
            ObjClass::Comp,
            comp_dn.clone(),
            vec![str_attr("saAmfCompRecoveryOnError", "NO-RECOMMENDATION")],
        )],
    )
    .unwrap();
    assert_eq!(
        model.comps[&comp_dn].recovery_on_error,
        Recovery::ComponentFailover
    );
}

#[test]
fn test_log_stream_bounds() {
    let mut model = Model::new();
    let store = ObjectStore::new();

    // maxFilesRotated outside [1..127] is rejected at completion.
    let err = run_ccb(
        &mut model,
        &store,
        vec![CcbOp::create(
            ObjClass::LogStream,
            dn("safLgStrCfg=Bad"),
            vec![u32_attr("saLogStreamMaxFilesRotated", 128)],
        )],
    )
    .unwrap_err();
    assert!(matches!(err, AmfError::InvalidParam(_)));

    // logMaxLogrecsize outside [150..65535] is rejected unless 0.
    let err = run_ccb(
        &mut model,
        &store,
        vec![CcbOp::create(
            ObjClass::LogConfig,
            dn("logConfig=1"),
            vec![u32_attr("logMaxLogrecsize", 100)],
        )],
    )
    .unwrap_err();
    assert!(matches!(err, AmfError::InvalidParam(_)));
    run_ccb(
        &mut model,
        &store,
        vec![CcbOp::create(
            ObjClass::LogConfig,
            dn("logConfig=1"),
            vec![u32_attr("logMaxLogrecsize", 0)],
        )],
    )
    .unwrap();
}

#[test]
fn test_comp_type_timeout_cascades_to_inheriting_instances() {
    use std::time::Duration;
    let mut model = Model::new();
    let store = ObjectStore::new();
    let mut ops = base_ops();
    // Give the type an instantiate command so the timeout has a carrier.
    ops.iter_mut()
        .find(|op| op.class == ObjClass::CompType)
        .unwrap()
        .attrs
        .push(str_attr("saAmfCtInstantiateCmd", "/usr/lib/amf/start.sh"));
    run_ccb(&mut model, &store, ops).unwrap();

    run_ccb(
        &mut model,
        &store,
        vec![CcbOp::modify(
            ObjClass::CompType,
            dn("safVersion=1,safCompType=T1"),
            vec![attr(
                "saAmfCtDefClcCliTimeout",
                AttrValue::Time(30_000_000_000),
            )],
        )],
    )
    .unwrap();

    let comp = &model.comps[&dn("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1")];
    assert_eq!(
        comp.clc.instantiate.as_ref().unwrap().timeout,
        Duration::from_secs(30),
        "non-overriding instance follows the type"
    );
}

#[test]
fn test_comp_type_instantiation_policy_cascades() {
    use std::time::Duration;
    let mut model = Model::new();
    let store = ObjectStore::new();
    let mut ops = base_ops();
    // A second component that overrides the without-delay budget locally.
    ops.push(CcbOp::create(
        ObjClass::Comp,
        dn("safComp=C2,safSu=SU1,safSg=SG1,safApp=App1"),
        vec![
            name_attr("saAmfCompType", "safVersion=1,safCompType=T1"),
            u32_attr("saAmfCompNumMaxInstantiateWithoutDelay", 9),
        ],
    ));
    run_ccb(&mut model, &store, ops).unwrap();

    run_ccb(
        &mut model,
        &store,
        vec![CcbOp::modify(
            ObjClass::CompType,
            dn("safVersion=1,safCompType=T1"),
            vec![
                u32_attr("saAmfCtDefNumMaxInstantiateWithoutDelay", 5),
                attr(
                    "saAmfCtDefDelayBetweenInstantiateAttempts",
                    AttrValue::Time(7_000_000_000),
                ),
                attr(
                    "saAmfCtDefQuiescingCompleteTimeout",
                    AttrValue::Time(42_000_000_000),
                ),
            ],
        )],
    )
    .unwrap();

    let inheriting = &model.comps[&dn("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1")];
    assert_eq!(inheriting.max_instantiate_without_delay, 5);
    assert_eq!(
        inheriting.delay_between_instantiate_attempts,
        Duration::from_secs(7)
    );
    assert_eq!(
        inheriting.quiescing_complete_timeout,
        Duration::from_secs(42)
    );

    // The overriding instance keeps its own value.
    let overriding = &model.comps[&dn("safComp=C2,safSu=SU1,safSg=SG1,safApp=App1")];
    assert_eq!(overriding.max_instantiate_without_delay, 9);
    assert_eq!(
        overriding.delay_between_instantiate_attempts,
        Duration::from_secs(7),
        "only the overridden attribute is pinned"
    );
}

#[test]
fn test_sg_modify_covers_probation_windows() {
    use std::time::Duration;
    let mut model = Model::new();
    let store = ObjectStore::new();
    run_ccb(&mut model, &store, base_ops()).unwrap();

    run_ccb(
        &mut model,
        &store,
        vec![CcbOp::modify(
            ObjClass::Sg,
            dn("safSg=SG1,safApp=App1"),
            vec![
                attr("saAmfSGSuRestartProb", AttrValue::Time(60_000_000_000)),
                attr("saAmfSGCompRestartProb", AttrValue::Time(30_000_000_000)),
                u32_attr("saAmfSGNumPrefAssignedSUs", 4),
                u32_attr("saAmfSGSuRestartMax", 3),
            ],
        )],
    )
    .unwrap();

    let sg = &model.sgs[&dn("safSg=SG1,safApp=App1")];
    assert_eq!(sg.su_restart_prob, Duration::from_secs(60));
    assert_eq!(sg.comp_restart_prob, Duration::from_secs(30));
    assert_eq!(sg.pref_assigned_sus, 4);
    assert_eq!(sg.su_restart_max, 3);
}

#[test]
fn test_delete_order_is_bottom_up() {
    let mut model = Model::new();
    let store = ObjectStore::new();
    run_ccb(&mut model, &store, base_ops()).unwrap();

    // One bundle deleting the whole subtree in arbitrary arrival order;
    // the apply ordering sorts deletes deepest-first.
    let ops = vec![
        CcbOp::delete(ObjClass::Su, dn("safSu=SU1,safSg=SG1,safApp=App1")),
        CcbOp::delete(ObjClass::Csi, dn("safCsi=CSI1,safSi=SI1,safApp=App1")),
        CcbOp::delete(ObjClass::Si, dn("safSi=SI1,safApp=App1")),
        CcbOp::delete(ObjClass::Sg, dn("safSg=SG1,safApp=App1")),
        CcbOp::delete(ObjClass::Comp, dn("safComp=C1,safSu=SU1,safSg=SG1,safApp=App1")),
    ];
    run_ccb(&mut model, &store, ops).unwrap();
    assert!(model.sgs.is_empty());
    assert!(model.sus.is_empty());
    assert!(model.comps.is_empty());
}
