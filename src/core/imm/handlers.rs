// src/core/imm/handlers.rs

//! Class-specific CCB handlers: attribute range checks, referential
//! integrity against the model plus the bundle's own pending creates,
//! cardinality limits, and dependency acyclicity. The handler bodies are
//! stateless; everything they need rides in [`CcbView`].

use super::ccb::{CcbOp, CcbOpKind};
use super::store::{ObjClass, ObjectStore};
use crate::config::CompGlobalConfig;
use crate::core::errors::{AmfError, AmfResult};
use crate::core::logstream::StreamConfig;
use crate::core::model::Model;
use crate::core::model::app::{App, AppType, CsType, SgType, SuType, SvcType};
use crate::core::model::attr::{self, Attribute};
use crate::core::model::cluster::Cluster;
use crate::core::model::comp::{ClcCommand, Component, ComponentType, InheritedAttrs};
use crate::core::model::csi::{self, Csi};
use crate::core::model::dn::Dn;
use crate::core::model::node::Node;
use crate::core::model::nodegroup::NodeGroup;
use crate::core::model::sg::Sg;
use crate::core::model::si::{Si, SiDependency};
use crate::core::model::states::{CompCapability, CompCategory, Recovery, RedundancyModel};
use crate::core::model::su::Su;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Everything a validation handler may look at.
pub struct CcbView<'a> {
    pub model: &'a Model,
    pub store: &'a ObjectStore,
    pub globals: &'a CompGlobalConfig,
    pub ops: &'a [CcbOp],
    pub idx: usize,
}

impl CcbView<'_> {
    /// A reference target is valid if it exists in the model or is created
    /// earlier in this bundle.
    fn will_exist(&self, dn: &Dn) -> bool {
        self.model.contains_dn(dn)
            || self.ops[..self.idx]
                .iter()
                .any(|op| op.kind == CcbOpKind::Create && &op.dn == dn)
    }

    fn pending_create(&self, dn: &Dn) -> Option<&CcbOp> {
        self.ops[..self.idx]
            .iter()
            .find(|op| op.kind == CcbOpKind::Create && &op.dn == dn)
    }

    fn deleted_in_bundle(&self, dn: &Dn) -> bool {
        self.ops
            .iter()
            .any(|op| op.kind == CcbOpKind::Delete && &op.dn == dn)
    }
}

/// Side effects of an applied operation that the director must act on.
#[derive(Debug, Clone)]
pub enum CcbApplied {
    NodeAdded(Dn),
    SgAdded(Dn),
    SuAdded(Dn),
    CompAdded(Dn),
    SiAdded(Dn),
    SiDeleted(Dn),
    SuDeleted(Dn),
    /// Preferred assignment counts of an SI changed; the engine re-balances.
    SiPrefChanged(Dn),
    LogRootChanged(String),
    LogStreamUpsert(StreamConfig),
    LogStreamDeleted(String),
    GlobalsChanged(CompGlobalConfig),
}

// --- attribute helpers ----------------------------------------------------

fn opt_u32(attrs: &[Attribute], name: &str) -> AmfResult<Option<u32>> {
    attr::find(attrs, name).map(|v| v.as_u32()).transpose()
}

fn opt_u64(attrs: &[Attribute], name: &str) -> AmfResult<Option<u64>> {
    attr::find(attrs, name).map(|v| v.as_u64()).transpose()
}

fn opt_bool(attrs: &[Attribute], name: &str) -> AmfResult<Option<bool>> {
    Ok(opt_u32(attrs, name)?.map(|v| v != 0))
}

/// SaTimeT nanoseconds to a Duration.
fn opt_duration(attrs: &[Attribute], name: &str) -> AmfResult<Option<Duration>> {
    Ok(attr::find(attrs, name)
        .map(|v| v.as_time())
        .transpose()?
        .map(|ns| Duration::from_nanos(ns.max(0) as u64)))
}

fn opt_str(attrs: &[Attribute], name: &str) -> AmfResult<Option<String>> {
    Ok(attr::find(attrs, name)
        .map(|v| v.as_str().map(str::to_string))
        .transpose()?)
}

fn opt_dn(attrs: &[Attribute], name: &str) -> AmfResult<Option<Dn>> {
    attr::find(attrs, name).map(|v| v.as_dn()).transpose()
}

fn multi_dn(attrs: &[Attribute], name: &str) -> AmfResult<Vec<Dn>> {
    attr::find_all(attrs, name)
        .into_iter()
        .map(|v| v.as_dn())
        .collect()
}

fn opt_enum<T: FromStr>(attrs: &[Attribute], name: &str) -> AmfResult<Option<T>> {
    match opt_str(attrs, name)? {
        Some(s) => T::from_str(&s)
            .map(Some)
            .map_err(|_| AmfError::InvalidParam(format!("bad value '{s}' for {name}"))),
        None => Ok(None),
    }
}

fn opt_clc(attrs: &[Attribute], cmd_attr: &str, argv_attr: &str, timeout: Duration)
    -> AmfResult<Option<ClcCommand>>
{
    match opt_str(attrs, cmd_attr)? {
        Some(cmd) => {
            let args = attr::find_all(attrs, argv_attr)
                .into_iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<AmfResult<Vec<_>>>()?;
            Ok(Some(ClcCommand { cmd, args, timeout }))
        }
        None => Ok(None),
    }
}

// --- builders -------------------------------------------------------------

fn build_cluster(dn: &Dn, attrs: &[Attribute]) -> AmfResult<Cluster> {
    let timeout =
        opt_duration(attrs, "saAmfClusterStartupTimeout")?.unwrap_or(Duration::from_secs(10));
    Ok(Cluster::new(dn.clone(), timeout))
}

fn build_node(dn: &Dn, attrs: &[Attribute]) -> AmfResult<Node> {
    let mut node = Node::new(dn.clone());
    node.clm_node = opt_dn(attrs, "saAmfNodeClmNode")?;
    if let Some(p) = opt_duration(attrs, "saAmfNodeSuFailOverProb")? {
        node.su_failover_prob = p;
    }
    if let Some(v) = opt_u32(attrs, "saAmfNodeSuFailoverMax")? {
        node.su_failover_max = v;
    }
    if let Some(v) = opt_bool(attrs, "saAmfNodeAutoRepair")? {
        node.auto_repair = v;
    }
    if let Some(v) = opt_bool(attrs, "saAmfNodeFailfastOnTerminationFailure")? {
        node.failfast_on_termination_failure = v;
    }
    if let Some(v) = opt_bool(attrs, "saAmfNodeFailfastOnInstantiationFailure")? {
        node.failfast_on_instantiation_failure = v;
    }
    Ok(node)
}

fn build_node_group(dn: &Dn, attrs: &[Attribute]) -> AmfResult<NodeGroup> {
    let nodes = multi_dn(attrs, "saAmfNGNodeList")?;
    if nodes.is_empty() {
        return Err(AmfError::InvalidParam(format!(
            "node group '{dn}' has an empty saAmfNGNodeList"
        )));
    }
    Ok(NodeGroup::new(dn.clone(), nodes))
}

fn build_sg(dn: &Dn, attrs: &[Attribute]) -> AmfResult<Sg> {
    let model: RedundancyModel = opt_enum(attrs, "saAmfSGRedundancyModel")?
        .ok_or_else(|| AmfError::InvalidParam(format!("SG '{dn}' lacks a redundancy model")))?;
    let mut sg = Sg::new(dn.clone(), model);
    sg.app = dn.parent();
    if let Some(v) = opt_u32(attrs, "saAmfSGNumPrefInserviceSUs")? {
        sg.pref_inservice_sus = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfSGNumPrefAssignedSUs")? {
        sg.pref_assigned_sus = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfSGNumPrefActiveSUs")? {
        sg.pref_active_sus = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfSGNumPrefStandbySUs")? {
        sg.pref_standby_sus = v;
    }
    if let Some(v) = opt_duration(attrs, "saAmfSGSuRestartProb")? {
        sg.su_restart_prob = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfSGSuRestartMax")? {
        sg.su_restart_max = v;
    }
    if let Some(v) = opt_duration(attrs, "saAmfSGCompRestartProb")? {
        sg.comp_restart_prob = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfSGCompRestartMax")? {
        sg.comp_restart_max = v;
    }
    if let Some(v) = opt_bool(attrs, "saAmfSGAutoAdjust")? {
        sg.auto_adjust = v;
    }
    if let Some(v) = opt_bool(attrs, "saAmfSGAutoRepair")? {
        sg.auto_repair = v;
    }
    if let Some(v) = opt_bool(attrs, "saAmfSGNcsSpec")? {
        sg.middleware = v;
    }
    if model == RedundancyModel::NPlusM && (sg.pref_active_sus == 0 || sg.pref_standby_sus == 0) {
        return Err(AmfError::InvalidParam(format!(
            "N+M SG '{dn}' needs non-zero preferred active and standby SU counts"
        )));
    }
    Ok(sg)
}

fn resolve_su_host(view: &CcbView, dn: &Dn, host: &Dn) -> AmfResult<(Dn, Option<Dn>)> {
    // The host reference may name a node or a node group.
    if view.model.nodes.contains_key(host)
        || view
            .pending_create(host)
            .map(|op| op.class == ObjClass::Node)
            .unwrap_or(false)
    {
        return Ok((host.clone(), None));
    }
    if let Some(group) = view.model.node_groups.get(host) {
        let first = group.nodes.first().ok_or_else(|| {
            AmfError::InvalidParam(format!("node group '{host}' is empty"))
        })?;
        return Ok((first.clone(), Some(host.clone())));
    }
    if let Some(op) = view.pending_create(host) {
        if op.class == ObjClass::NodeGroup {
            let members = multi_dn(&op.attrs, "saAmfNGNodeList")?;
            let first = members.into_iter().next().ok_or_else(|| {
                AmfError::InvalidParam(format!("node group '{host}' is empty"))
            })?;
            return Ok((first, Some(host.clone())));
        }
    }
    Err(AmfError::NotExist(format!(
        "host '{host}' of SU '{dn}' is neither a node nor a node group"
    )))
}

fn build_su(view: &CcbView, dn: &Dn, attrs: &[Attribute]) -> AmfResult<Su> {
    let sg = dn
        .parent()
        .ok_or_else(|| AmfError::InvalidParam(format!("SU '{dn}' has no parent SG")))?;
    let host = opt_dn(attrs, "saAmfSUHostNodeOrNodeGroup")?
        .or(opt_dn(attrs, "saAmfSUHostedByNode")?)
        .ok_or_else(|| AmfError::InvalidParam(format!("SU '{dn}' names no host")))?;
    let (node, node_group) = resolve_su_host(view, dn, &host)?;
    let mut su = Su::new(dn.clone(), sg, node, opt_u32(attrs, "saAmfSURank")?.unwrap_or(0));
    su.node_group = node_group;
    su.su_type = opt_dn(attrs, "saAmfSUType")?;
    Ok(su)
}

fn build_comp_type(dn: &Dn, attrs: &[Attribute]) -> AmfResult<ComponentType> {
    let category = opt_enum(attrs, "saAmfCtCompCategory")?.unwrap_or(CompCategory::SaAware);
    let capability =
        opt_enum(attrs, "saAmfCtCompCapability")?.unwrap_or(CompCapability::OneActiveOrOneStandby);
    let mut t = ComponentType::new(dn.clone(), category, capability);
    let timeout =
        opt_duration(attrs, "saAmfCtDefClcCliTimeout")?.unwrap_or(Duration::from_secs(10));
    t.clc.instantiate = opt_clc(
        attrs,
        "saAmfCtInstantiateCmd",
        "saAmfCtDefInstantiateCmdArgv",
        timeout,
    )?;
    t.clc.terminate = opt_clc(
        attrs,
        "saAmfCtTerminateCmd",
        "saAmfCtDefTerminateCmdArgv",
        timeout,
    )?;
    t.clc.cleanup = opt_clc(attrs, "saAmfCtCleanupCmd", "saAmfCtDefCleanupCmdArgv", timeout)?;
    t.clc.am_start = opt_clc(attrs, "saAmfCtAmStartCmd", "saAmfCtDefAmStartCmdArgv", timeout)?;
    t.clc.am_stop = opt_clc(attrs, "saAmfCtAmStopCmd", "saAmfCtDefAmStopCmdArgv", timeout)?;
    t.clc.healthcheck = opt_clc(
        attrs,
        "saAmfCtHealthcheckCmd",
        "saAmfCtDefHealthcheckCmdArgv",
        timeout,
    )?;
    if let Some(r) = opt_enum::<Recovery>(attrs, "saAmfCtDefRecoveryOnError")? {
        // NO-RECOMMENDATION is promoted the moment it is seen.
        t.default_recovery = r.normalized();
    }
    if let Some(v) = opt_duration(attrs, "saAmfCtDefQuiescingCompleteTimeout")? {
        t.quiescing_complete_timeout = v;
    }
    if let Some(v) = opt_bool(attrs, "saAmfCtDefDisableRestart")? {
        t.disable_restart = v;
    }
    t.max_instantiate_without_delay = opt_u32(attrs, "saAmfCtDefNumMaxInstantiateWithoutDelay")?;
    t.delay_between_instantiate_attempts =
        opt_duration(attrs, "saAmfCtDefDelayBetweenInstantiateAttempts")?;
    t.cs_types = multi_dn(attrs, "saAmfCtSupportedCsTypes")?;
    if !category.is_preinstantiable() && capability.supports_standby() {
        return Err(AmfError::InvalidParam(format!(
            "component type '{dn}': category {category} cannot take capability {capability}"
        )));
    }
    Ok(t)
}

fn resolve_comp_type(view: &CcbView, type_dn: &Dn) -> AmfResult<ComponentType> {
    if let Some(t) = view.model.comp_types.get(type_dn) {
        return Ok(t.clone());
    }
    if let Some(op) = view.pending_create(type_dn) {
        if op.class == ObjClass::CompType {
            return build_comp_type(&op.dn, &op.attrs);
        }
    }
    Err(AmfError::NotExist(type_dn.to_string()))
}

fn build_comp(view: &CcbView, dn: &Dn, attrs: &[Attribute]) -> AmfResult<Component> {
    let su = dn
        .parent()
        .ok_or_else(|| AmfError::InvalidParam(format!("component '{dn}' has no parent SU")))?;
    let type_dn = opt_dn(attrs, "saAmfCompType")?
        .ok_or_else(|| AmfError::InvalidParam(format!("component '{dn}' names no type")))?;
    let ctype = resolve_comp_type(view, &type_dn)?;
    let mut comp = Component::from_type(dn.clone(), su, &ctype);

    let timeout = opt_duration(attrs, "saAmfCompClcCliTimeout")?
        .or_else(|| ctype.clc.instantiate.as_ref().map(|c| c.timeout))
        .unwrap_or(Duration::from_secs(10));
    if let Some(c) = opt_clc(attrs, "saAmfCompInstantiateCmd", "saAmfCompInstantiateCmdArgv", timeout)? {
        comp.clc.instantiate = Some(c);
        comp.clear_inherited(InheritedAttrs::INSTANTIATE_CMD);
    }
    if let Some(c) = opt_clc(attrs, "saAmfCompTerminateCmd", "saAmfCompTerminateCmdArgv", timeout)? {
        comp.clc.terminate = Some(c);
        comp.clear_inherited(InheritedAttrs::TERMINATE_CMD);
    }
    if let Some(c) = opt_clc(attrs, "saAmfCompCleanupCmd", "saAmfCompCleanupCmdArgv", timeout)? {
        comp.clc.cleanup = Some(c);
        comp.clear_inherited(InheritedAttrs::CLEANUP_CMD);
    }
    if let Some(c) = opt_clc(attrs, "saAmfCompAmStartCmd", "saAmfCompAmStartCmdArgv", timeout)? {
        comp.clc.am_start = Some(c);
        comp.clear_inherited(InheritedAttrs::AM_START_CMD);
    }
    if let Some(c) = opt_clc(attrs, "saAmfCompAmStopCmd", "saAmfCompAmStopCmdArgv", timeout)? {
        comp.clc.am_stop = Some(c);
        comp.clear_inherited(InheritedAttrs::AM_STOP_CMD);
    }
    if let Some(c) = opt_clc(attrs, "saAmfCompHealthcheckCmd", "saAmfCompHealthcheckCmdArgv", timeout)? {
        comp.clc.healthcheck = Some(c);
        comp.clear_inherited(InheritedAttrs::HEALTHCHECK_CMD);
    }
    if let Some(v) = opt_u32(attrs, "saAmfCompInstantiationLevel")? {
        comp.instantiation_level = v;
    }
    comp.max_instantiate_without_delay =
        match opt_u32(attrs, "saAmfCompNumMaxInstantiateWithoutDelay")? {
            Some(v) => {
                comp.clear_inherited(InheritedAttrs::INST_NO_DELAY_MAX);
                v
            }
            None => ctype
                .max_instantiate_without_delay
                .unwrap_or(view.globals.num_max_instantiate_without_delay),
        };
    comp.max_instantiate_with_delay = opt_u32(attrs, "saAmfCompNumMaxInstantiateWithDelay")?
        .unwrap_or(view.globals.num_max_instantiate_with_delay);
    comp.delay_between_instantiate_attempts =
        match opt_duration(attrs, "saAmfCompDelayBetweenInstantiateAttempts")? {
            Some(v) => {
                comp.clear_inherited(InheritedAttrs::INST_DELAY);
                v
            }
            None => ctype
                .delay_between_instantiate_attempts
                .unwrap_or(view.globals.delay_between_instantiate_attempts),
        };
    if let Some(v) = opt_duration(attrs, "saAmfCompQuiescingCompleteTimeout")? {
        comp.quiescing_complete_timeout = v;
        comp.clear_inherited(InheritedAttrs::QUIESCING_TIMEOUT);
    }
    if let Some(r) = opt_enum::<Recovery>(attrs, "saAmfCompRecoveryOnError")? {
        comp.recovery_on_error = r.normalized();
        comp.clear_inherited(InheritedAttrs::RECOVERY);
    }
    if let Some(v) = opt_bool(attrs, "saAmfCompDisableRestart")? {
        comp.disable_restart = v;
        comp.clear_inherited(InheritedAttrs::DISABLE_RESTART);
    }
    Ok(comp)
}

fn build_si(view: &CcbView, dn: &Dn, attrs: &[Attribute]) -> AmfResult<Si> {
    let sg = opt_dn(attrs, "saAmfSIProtectedbySG")?
        .ok_or_else(|| AmfError::InvalidParam(format!("SI '{dn}' names no protecting SG")))?;
    if !view.will_exist(&sg) {
        return Err(AmfError::NotExist(sg.to_string()));
    }
    let mut si = Si::new(dn.clone(), sg);
    si.svc_type = opt_dn(attrs, "saAmfSvcType")?;
    if let Some(v) = opt_u32(attrs, "saAmfSIRank")? {
        si.rank = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfSIPrefActiveAssignments")? {
        si.pref_active_assignments = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfSIPrefStandbyAssignments")? {
        si.pref_standby_assignments = v;
    }
    Ok(si)
}

fn build_csi(dn: &Dn, attrs: &[Attribute]) -> AmfResult<Csi> {
    let si = dn
        .parent()
        .ok_or_else(|| AmfError::InvalidParam(format!("CSI '{dn}' has no parent SI")))?;
    let mut c = Csi::new(dn.clone(), si);
    c.cs_type = opt_dn(attrs, "saAmfCSType")?;
    c.deps = multi_dn(attrs, "saAmfCSIDependencies")?;
    Ok(c)
}

fn build_stream_config(dn: &Dn, attrs: &[Attribute]) -> AmfResult<StreamConfig> {
    let rotated = opt_u32(attrs, "saLogStreamMaxFilesRotated")?.unwrap_or(4);
    if !(1..=127).contains(&rotated) {
        return Err(AmfError::InvalidParam(format!(
            "saLogStreamMaxFilesRotated {rotated} outside [1..127]"
        )));
    }
    Ok(StreamConfig {
        name: dn.to_string(),
        file_name: opt_str(attrs, "saLogStreamFileName")?
            .unwrap_or_else(|| dn.rdn_value().to_string()),
        rel_path: opt_str(attrs, "saLogStreamPathName")?.unwrap_or_else(|| ".".to_string()),
        max_log_file_size: opt_u64(attrs, "saLogStreamMaxLogFileSize")?.unwrap_or(5_000_000),
        fixed_log_record_size: opt_u32(attrs, "saLogStreamFixedLogRecordSize")?.unwrap_or(150),
        max_files_rotated: rotated,
        severity_filter: opt_u32(attrs, "saLogStreamSeverityFilter")?.unwrap_or(0x7f),
    })
}

fn build_globals(base: &CompGlobalConfig, attrs: &[Attribute]) -> AmfResult<CompGlobalConfig> {
    let mut g = base.clone();
    if let Some(v) = opt_u32(attrs, "saAmfNumMaxInstantiateWithoutDelay")? {
        g.num_max_instantiate_without_delay = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfNumMaxInstantiateWithDelay")? {
        g.num_max_instantiate_with_delay = v;
    }
    if let Some(v) = opt_duration(attrs, "saAmfDelayBetweenInstantiateAttempts")? {
        g.delay_between_instantiate_attempts = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfNumMaxAmStartAttempts")? {
        g.num_max_am_start_attempts = v;
    }
    if let Some(v) = opt_u32(attrs, "saAmfNumMaxAmStopAttempts")? {
        g.num_max_am_stop_attempts = v;
    }
    Ok(g)
}

fn validate_log_config(attrs: &[Attribute]) -> AmfResult<()> {
    if let Some(v) = opt_u32(attrs, "logMaxLogrecsize")? {
        if v != 0 && !(150..=65535).contains(&v) {
            return Err(AmfError::InvalidParam(format!(
                "logMaxLogrecsize {v} outside [150..65535]"
            )));
        }
    }
    Ok(())
}

// --- validation -----------------------------------------------------------

pub fn validate(view: &CcbView, op: &CcbOp) -> AmfResult<()> {
    match op.kind {
        CcbOpKind::Create => validate_create(view, op),
        CcbOpKind::Modify => validate_modify(view, op),
        CcbOpKind::Delete => validate_delete(view, op),
    }
}

fn validate_create(view: &CcbView, op: &CcbOp) -> AmfResult<()> {
    if view.store.contains(&op.dn) {
        if view.store.is_identical(&op.dn, op.class, &op.attrs) {
            // Idempotent re-import: accepted, applied as a no-op.
            return Ok(());
        }
        return Err(AmfError::Exist(op.dn.to_string()));
    }
    match op.class {
        ObjClass::Cluster => build_cluster(&op.dn, &op.attrs).map(drop),
        ObjClass::Node => build_node(&op.dn, &op.attrs).map(drop),
        ObjClass::NodeGroup => {
            let g = build_node_group(&op.dn, &op.attrs)?;
            for member in &g.nodes {
                if !view.will_exist(member) {
                    return Err(AmfError::NotExist(member.to_string()));
                }
            }
            Ok(())
        }
        ObjClass::App => {
            if let Some(t) = opt_dn(&op.attrs, "saAmfAppType")? {
                if !view.will_exist(&t) {
                    return Err(AmfError::NotExist(t.to_string()));
                }
            }
            Ok(())
        }
        ObjClass::AppType | ObjClass::SvcType | ObjClass::CsType | ObjClass::SgType => Ok(()),
        ObjClass::SuType => Ok(()),
        ObjClass::CompType => build_comp_type(&op.dn, &op.attrs).map(drop),
        ObjClass::Sg => {
            let sg = build_sg(&op.dn, &op.attrs)?;
            if let Some(app) = &sg.app {
                if !view.will_exist(app) {
                    return Err(AmfError::NotExist(app.to_string()));
                }
            }
            Ok(())
        }
        ObjClass::Su => {
            let su = build_su(view, &op.dn, &op.attrs)?;
            if !view.will_exist(&su.sg) {
                return Err(AmfError::NotExist(su.sg.to_string()));
            }
            if let Some(t) = &su.su_type {
                if !view.will_exist(t) {
                    return Err(AmfError::NotExist(t.to_string()));
                }
            }
            Ok(())
        }
        ObjClass::Comp => {
            let comp = build_comp(view, &op.dn, &op.attrs)?;
            if !view.will_exist(&comp.su) {
                return Err(AmfError::NotExist(comp.su.to_string()));
            }
            validate_su_type_cardinality(view, &comp.su)
        }
        ObjClass::Si => build_si(view, &op.dn, &op.attrs).map(drop),
        ObjClass::Csi => {
            let c = build_csi(&op.dn, &op.attrs)?;
            if !view.will_exist(&c.si) {
                return Err(AmfError::NotExist(c.si.to_string()));
            }
            for dep in &c.deps {
                validate_csi_dep_target(view, &c.si, dep)?;
            }
            Ok(())
        }
        ObjClass::CsiAttribute => {
            let csi = op.dn.parent().ok_or_else(|| {
                AmfError::InvalidParam(format!("CSI attribute '{}' has no parent", op.dn))
            })?;
            if !view.will_exist(&csi) {
                return Err(AmfError::NotExist(csi.to_string()));
            }
            Ok(())
        }
        ObjClass::SiDependency => validate_si_dependency(view, op),
        ObjClass::SiRankedSu => {
            let si = op.dn.parent().ok_or_else(|| {
                AmfError::InvalidParam(format!("ranked-SU entry '{}' has no parent SI", op.dn))
            })?;
            let su = opt_dn(&op.attrs, "saAmfRankedSuName")?
                .ok_or_else(|| AmfError::InvalidParam("missing saAmfRankedSuName".to_string()))?;
            if !view.will_exist(&si) {
                return Err(AmfError::NotExist(si.to_string()));
            }
            if !view.will_exist(&su) {
                return Err(AmfError::NotExist(su.to_string()));
            }
            Ok(())
        }
        ObjClass::GlobalAttributes => build_globals(view.globals, &op.attrs).map(drop),
        ObjClass::LogConfig => validate_log_config(&op.attrs),
        ObjClass::LogStream => {
            build_stream_config(&op.dn, &op.attrs)?;
            validate_stream_count(view)
        }
    }
}

/// The dependency target of a CSI must live in the same SI and must not
/// close a cycle.
fn validate_csi_dep_target(view: &CcbView, si: &Dn, dep: &Dn) -> AmfResult<()> {
    if let Some(sponsor) = view.model.csis.get(dep) {
        if &sponsor.si != si {
            return Err(AmfError::InvalidParam(format!(
                "CSI dependency '{dep}' is outside SI '{si}'"
            )));
        }
        return Ok(());
    }
    if let Some(pending) = view.pending_create(dep) {
        if pending.class == ObjClass::Csi {
            let sponsor_si = pending.dn.parent();
            if sponsor_si.as_ref() == Some(si) {
                return Ok(());
            }
            return Err(AmfError::InvalidParam(format!(
                "CSI dependency '{dep}' is outside SI '{si}'"
            )));
        }
    }
    Err(AmfError::NotExist(dep.to_string()))
}

/// SI-SI dependency: sponsor must exist and the sponsor chain must not
/// loop back to the dependent.
fn validate_si_dependency(view: &CcbView, op: &CcbOp) -> AmfResult<()> {
    let dependent = op.dn.parent().ok_or_else(|| {
        AmfError::InvalidParam(format!("SI dependency '{}' has no parent SI", op.dn))
    })?;
    let sponsor = opt_dn(&op.attrs, "saAmfDependencySponsor")?
        .ok_or_else(|| AmfError::InvalidParam("missing saAmfDependencySponsor".to_string()))?;
    if !view.will_exist(&dependent) {
        return Err(AmfError::NotExist(dependent.to_string()));
    }
    if !view.will_exist(&sponsor) {
        return Err(AmfError::NotExist(sponsor.to_string()));
    }
    if sponsor == dependent {
        return Err(AmfError::InvalidParam(format!(
            "SI '{dependent}' cannot sponsor itself"
        )));
    }
    // Walk the sponsor's own sponsor chain (model plus pending entries of
    // this bundle); reaching the dependent closes a cycle.
    let mut stack = vec![sponsor.clone()];
    let mut seen = Vec::new();
    while let Some(current) = stack.pop() {
        if current == dependent {
            return Err(AmfError::InvalidParam(format!(
                "SI dependency cycle between '{dependent}' and '{sponsor}'"
            )));
        }
        if seen.contains(&current) {
            continue;
        }
        seen.push(current.clone());
        if let Some(si) = view.model.sis.get(&current) {
            stack.extend(si.deps.iter().map(|d| d.sponsor.clone()));
        }
        for prior in &view.ops[..view.idx] {
            if prior.kind == CcbOpKind::Create
                && prior.class == ObjClass::SiDependency
                && prior.dn.parent().as_ref() == Some(&current)
            {
                if let Some(s) = opt_dn(&prior.attrs, "saAmfDependencySponsor")? {
                    stack.push(s);
                }
            }
        }
    }
    Ok(())
}

/// Component count per SU must stay within the SU type's limit.
fn validate_su_type_cardinality(view: &CcbView, su_dn: &Dn) -> AmfResult<()> {
    let su_type = match view.model.sus.get(su_dn) {
        Some(su) => su.su_type.clone(),
        None => view
            .pending_create(su_dn)
            .and_then(|op| opt_dn(&op.attrs, "saAmfSUType").ok().flatten()),
    };
    let Some(type_dn) = su_type else { return Ok(()) };
    let max = match view.model.su_types.get(&type_dn) {
        Some(t) => t.max_num_components,
        None => view
            .pending_create(&type_dn)
            .and_then(|op| opt_u32(&op.attrs, "saAmfSutMaxNumComponents").ok().flatten()),
    };
    let Some(max) = max else { return Ok(()) };
    let existing = view
        .model
        .comps
        .values()
        .filter(|c| &c.su == su_dn)
        .count();
    let pending = view.ops[..view.idx]
        .iter()
        .filter(|op| {
            op.kind == CcbOpKind::Create
                && op.class == ObjClass::Comp
                && op.dn.parent().as_ref() == Some(su_dn)
        })
        .count();
    if existing + pending + 1 > max as usize {
        return Err(AmfError::NoResources(format!(
            "SU '{su_dn}' exceeds {max} components allowed by '{type_dn}'"
        )));
    }
    Ok(())
}

fn validate_stream_count(view: &CcbView) -> AmfResult<()> {
    let max = view
        .store
        .objects_of_class(ObjClass::LogConfig)
        .first()
        .and_then(|(_, attrs)| opt_u32(attrs, "logMaxApplicationStreams").ok().flatten())
        .unwrap_or(64);
    let existing = view.store.objects_of_class(ObjClass::LogStream).len();
    let pending = view.ops[..view.idx]
        .iter()
        .filter(|op| op.kind == CcbOpKind::Create && op.class == ObjClass::LogStream)
        .count();
    if existing + pending + 1 > max as usize {
        return Err(AmfError::NoResources(format!(
            "application stream limit {max} reached"
        )));
    }
    Ok(())
}

fn validate_modify(view: &CcbView, op: &CcbOp) -> AmfResult<()> {
    if !view.store.contains(&op.dn) && !view.model.contains_dn(&op.dn) {
        return Err(AmfError::NotExist(op.dn.to_string()));
    }
    match op.class {
        ObjClass::LogConfig => validate_log_config(&op.attrs),
        ObjClass::LogStream => {
            if let Some(v) = opt_u32(&op.attrs, "saLogStreamMaxFilesRotated")? {
                if !(1..=127).contains(&v) {
                    return Err(AmfError::InvalidParam(format!(
                        "saLogStreamMaxFilesRotated {v} outside [1..127]"
                    )));
                }
            }
            Ok(())
        }
        ObjClass::Csi => {
            // Dependency edits must keep the DAG acyclic; the model check
            // runs against the target CSI's SI.
            let deps = multi_dn(&op.attrs, "saAmfCSIDependencies")?;
            if let Some(current) = view.model.csis.get(&op.dn) {
                for dep in &deps {
                    validate_csi_dep_target(view, &current.si, dep)?;
                    csi::check_acyclic(&view.model.csis, &current.si, Some((&op.dn, dep)))?;
                }
            }
            Ok(())
        }
        ObjClass::Comp | ObjClass::CompType => {
            // Recovery values are checked here; promotion happens at apply.
            let _ = opt_enum::<Recovery>(&op.attrs, "saAmfCompRecoveryOnError")?;
            let _ = opt_enum::<Recovery>(&op.attrs, "saAmfCtDefRecoveryOnError")?;
            Ok(())
        }
        ObjClass::GlobalAttributes => build_globals(view.globals, &op.attrs).map(drop),
        _ => Ok(()),
    }
}

fn validate_delete(view: &CcbView, op: &CcbOp) -> AmfResult<()> {
    if !view.store.contains(&op.dn) && !view.model.contains_dn(&op.dn) {
        return Err(AmfError::NotExist(op.dn.to_string()));
    }
    match op.class {
        ObjClass::Node => {
            if let Some(node) = view.model.nodes.get(&op.dn) {
                if !node.is_removable() {
                    return Err(AmfError::BadOperation(format!(
                        "node '{}' must be locked for instantiation before delete",
                        op.dn
                    )));
                }
                let hosted_remaining = view
                    .model
                    .sus
                    .values()
                    .filter(|s| s.node == op.dn)
                    .any(|s| !view.deleted_in_bundle(&s.dn));
                if hosted_remaining {
                    return Err(AmfError::BadOperation(format!(
                        "node '{}' still hosts SUs",
                        op.dn
                    )));
                }
            }
            Ok(())
        }
        ObjClass::NodeGroup => {
            let mapped_remaining = view
                .model
                .sus
                .values()
                .filter(|s| s.node_group.as_ref() == Some(&op.dn))
                .any(|s| !view.deleted_in_bundle(&s.dn));
            if mapped_remaining {
                return Err(AmfError::BadOperation(format!(
                    "node group '{}' still maps SUs",
                    op.dn
                )));
            }
            Ok(())
        }
        ObjClass::Su => {
            if let Some(su) = view.model.sus.get(&op.dn) {
                if !view.model.assignments_of_su(&su.dn).is_empty() {
                    return Err(AmfError::BadOperation(format!(
                        "SU '{}' still has assignments",
                        op.dn
                    )));
                }
            }
            Ok(())
        }
        ObjClass::Si => {
            if let Some(si) = view.model.sis.get(&op.dn) {
                if si.is_assigned() {
                    return Err(AmfError::BadOperation(format!(
                        "SI '{}' is still assigned",
                        op.dn
                    )));
                }
            }
            Ok(())
        }
        ObjClass::CompType => {
            let instances_remaining = view
                .model
                .comps_of_type(&op.dn)
                .into_iter()
                .any(|c| !view.deleted_in_bundle(&c));
            if instances_remaining {
                return Err(AmfError::BadOperation(format!(
                    "component type '{}' still has instances",
                    op.dn
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// --- apply ----------------------------------------------------------------

pub fn apply(
    model: &mut Model,
    store: &ObjectStore,
    globals: &CompGlobalConfig,
    op: CcbOp,
) -> AmfResult<Vec<CcbApplied>> {
    match op.kind {
        CcbOpKind::Create => apply_create(model, store, globals, op),
        CcbOpKind::Modify => apply_modify(model, store, globals, op),
        CcbOpKind::Delete => apply_delete(model, store, op),
    }
}

fn apply_create(
    model: &mut Model,
    store: &ObjectStore,
    globals: &CompGlobalConfig,
    op: CcbOp,
) -> AmfResult<Vec<CcbApplied>> {
    if store.is_identical(&op.dn, op.class, &op.attrs) {
        debug!(dn = %op.dn, "idempotent re-create skipped");
        return Ok(Vec::new());
    }
    let effects = create_entity(model, store, globals, op.class, &op.dn, &op.attrs)?;
    store.insert(op.dn, op.class, op.attrs);
    Ok(effects)
}

/// Builds and inserts one entity from raw attributes. Shared between CCB
/// apply and the initial load, which replays objects already in the store.
pub(super) fn create_entity(
    model: &mut Model,
    store: &ObjectStore,
    globals: &CompGlobalConfig,
    class: ObjClass,
    dn: &Dn,
    attrs: &[Attribute],
) -> AmfResult<Vec<CcbApplied>> {
    let op = CcbOp::create(class, dn.clone(), attrs.to_vec());
    let view = CcbView {
        model,
        store,
        globals,
        ops: &[],
        idx: 0,
    };
    let mut effects = Vec::new();
    match op.class {
        ObjClass::Cluster => {
            let c = build_cluster(&op.dn, &op.attrs)?;
            model.set_cluster(c)?;
        }
        ObjClass::Node => {
            let n = build_node(&op.dn, &op.attrs)?;
            model.add_node(n)?;
            effects.push(CcbApplied::NodeAdded(op.dn.clone()));
        }
        ObjClass::NodeGroup => {
            let g = build_node_group(&op.dn, &op.attrs)?;
            model.add_node_group(g)?;
        }
        ObjClass::App => {
            let mut a = App::new(op.dn.clone());
            a.app_type = opt_dn(&op.attrs, "saAmfAppType")?;
            model.add_app(a)?;
        }
        ObjClass::AppType => model.add_app_type(AppType { dn: op.dn.clone() })?,
        ObjClass::SuType => model.add_su_type(SuType {
            dn: op.dn.clone(),
            max_num_components: opt_u32(&op.attrs, "saAmfSutMaxNumComponents")?,
        })?,
        ObjClass::SgType => model.add_sg_type(SgType {
            dn: op.dn.clone(),
            redundancy_model: opt_enum(&op.attrs, "saAmfSgtRedundancyModel")?
                .unwrap_or(RedundancyModel::TwoN),
        })?,
        ObjClass::SvcType => model.add_svc_type(SvcType { dn: op.dn.clone() })?,
        ObjClass::CsType => model.add_cs_type(CsType { dn: op.dn.clone() })?,
        ObjClass::CompType => {
            let t = build_comp_type(&op.dn, &op.attrs)?;
            model.add_comp_type(t)?;
        }
        ObjClass::Sg => {
            let sg = build_sg(&op.dn, &op.attrs)?;
            model.add_sg(sg)?;
            effects.push(CcbApplied::SgAdded(op.dn.clone()));
        }
        ObjClass::Su => {
            let su = build_su(&view, &op.dn, &op.attrs)?;
            model.add_su(su)?;
            effects.push(CcbApplied::SuAdded(op.dn.clone()));
        }
        ObjClass::Comp => {
            let comp = build_comp(&view, &op.dn, &op.attrs)?;
            model.add_comp(comp)?;
            effects.push(CcbApplied::CompAdded(op.dn.clone()));
        }
        ObjClass::Si => {
            let si = build_si(&view, &op.dn, &op.attrs)?;
            model.add_si(si)?;
            effects.push(CcbApplied::SiAdded(op.dn.clone()));
        }
        ObjClass::Csi => {
            let c = build_csi(&op.dn, &op.attrs)?;
            model.add_csi(c)?;
        }
        ObjClass::CsiAttribute => {
            let csi_dn = op.dn.parent().ok_or_else(|| {
                AmfError::InvalidParam(format!("CSI attribute '{}' has no parent", op.dn))
            })?;
            let name = op.dn.rdn_value().to_string();
            let values: Vec<String> = attr::find_all(&op.attrs, "saAmfCSIAttriValue")
                .into_iter()
                .filter_map(|v| v.as_str().ok().map(str::to_string))
                .collect();
            let csi = model
                .csis
                .get_mut(&csi_dn)
                .ok_or_else(|| AmfError::NotExist(csi_dn.to_string()))?;
            for value in values {
                csi.attrs.push((name.clone(), value));
            }
        }
        ObjClass::SiDependency => {
            let dependent = op.dn.parent().ok_or_else(|| {
                AmfError::InvalidParam(format!("SI dependency '{}' has no parent SI", op.dn))
            })?;
            let sponsor = opt_dn(&op.attrs, "saAmfDependencySponsor")?
                .ok_or_else(|| AmfError::InvalidParam("missing saAmfDependencySponsor".into()))?;
            let tolerance =
                opt_duration(&op.attrs, "saAmfToleranceTime")?.unwrap_or(Duration::ZERO);
            let si = model
                .sis
                .get_mut(&dependent)
                .ok_or_else(|| AmfError::NotExist(dependent.to_string()))?;
            si.deps.push(SiDependency { sponsor, tolerance });
        }
        ObjClass::SiRankedSu => {
            let si_dn = op.dn.parent().ok_or_else(|| {
                AmfError::InvalidParam(format!("ranked-SU entry '{}' has no parent SI", op.dn))
            })?;
            let su = opt_dn(&op.attrs, "saAmfRankedSuName")?
                .ok_or_else(|| AmfError::InvalidParam("missing saAmfRankedSuName".into()))?;
            let rank = opt_u32(&op.attrs, "saAmfRank")?.unwrap_or(0);
            let si = model
                .sis
                .get_mut(&si_dn)
                .ok_or_else(|| AmfError::NotExist(si_dn.to_string()))?;
            si.ranked_sus.push((su, rank));
            si.ranked_sus.sort_by_key(|(_, r)| *r);
        }
        ObjClass::GlobalAttributes => {
            let g = build_globals(globals, &op.attrs)?;
            effects.push(CcbApplied::GlobalsChanged(g));
        }
        ObjClass::LogConfig => {
            if let Some(root) = opt_str(&op.attrs, "logRootDirectory")? {
                effects.push(CcbApplied::LogRootChanged(root));
            }
        }
        ObjClass::LogStream => {
            let cfg = build_stream_config(&op.dn, &op.attrs)?;
            effects.push(CcbApplied::LogStreamUpsert(cfg));
        }
    }
    Ok(effects)
}

fn apply_modify(
    model: &mut Model,
    store: &ObjectStore,
    globals: &CompGlobalConfig,
    op: CcbOp,
) -> AmfResult<Vec<CcbApplied>> {
    let mut effects = Vec::new();
    match op.class {
        ObjClass::Cluster => {
            if let Some(v) = opt_duration(&op.attrs, "saAmfClusterStartupTimeout")? {
                if let Some(c) = model.cluster.as_mut() {
                    c.startup_timeout = v;
                }
            }
        }
        ObjClass::Node => {
            let node = model
                .nodes
                .get_mut(&op.dn)
                .ok_or_else(|| AmfError::NotExist(op.dn.to_string()))?;
            if let Some(v) = opt_duration(&op.attrs, "saAmfNodeSuFailOverProb")? {
                node.su_failover_prob = v;
            }
            if let Some(v) = opt_u32(&op.attrs, "saAmfNodeSuFailoverMax")? {
                node.su_failover_max = v;
            }
            if let Some(v) = opt_bool(&op.attrs, "saAmfNodeAutoRepair")? {
                node.auto_repair = v;
            }
            if let Some(v) = opt_bool(&op.attrs, "saAmfNodeFailfastOnTerminationFailure")? {
                node.failfast_on_termination_failure = v;
            }
            if let Some(v) = opt_bool(&op.attrs, "saAmfNodeFailfastOnInstantiationFailure")? {
                node.failfast_on_instantiation_failure = v;
            }
        }
        ObjClass::NodeGroup => {
            let members = multi_dn(&op.attrs, "saAmfNGNodeList")?;
            if !members.is_empty() {
                for m in &members {
                    if !model.nodes.contains_key(m) {
                        return Err(AmfError::NotExist(m.to_string()));
                    }
                }
                let g = model
                    .node_groups
                    .get_mut(&op.dn)
                    .ok_or_else(|| AmfError::NotExist(op.dn.to_string()))?;
                g.nodes = members;
            }
        }
        ObjClass::Sg => {
            let sg = model
                .sgs
                .get_mut(&op.dn)
                .ok_or_else(|| AmfError::NotExist(op.dn.to_string()))?;
            if let Some(v) = opt_u32(&op.attrs, "saAmfSGNumPrefInserviceSUs")? {
                sg.pref_inservice_sus = v;
            }
            if let Some(v) = opt_u32(&op.attrs, "saAmfSGNumPrefActiveSUs")? {
                sg.pref_active_sus = v;
            }
            if let Some(v) = opt_u32(&op.attrs, "saAmfSGNumPrefStandbySUs")? {
                sg.pref_standby_sus = v;
            }
            if let Some(v) = opt_u32(&op.attrs, "saAmfSGNumPrefAssignedSUs")? {
                sg.pref_assigned_sus = v;
            }
            if let Some(v) = opt_duration(&op.attrs, "saAmfSGSuRestartProb")? {
                sg.su_restart_prob = v;
            }
            if let Some(v) = opt_u32(&op.attrs, "saAmfSGSuRestartMax")? {
                sg.su_restart_max = v;
            }
            if let Some(v) = opt_duration(&op.attrs, "saAmfSGCompRestartProb")? {
                sg.comp_restart_prob = v;
            }
            if let Some(v) = opt_u32(&op.attrs, "saAmfSGCompRestartMax")? {
                sg.comp_restart_max = v;
            }
            if let Some(v) = opt_bool(&op.attrs, "saAmfSGAutoRepair")? {
                sg.auto_repair = v;
            }
            if let Some(v) = opt_bool(&op.attrs, "saAmfSGAutoAdjust")? {
                sg.auto_adjust = v;
            }
        }
        ObjClass::Si => {
            let si = model
                .sis
                .get_mut(&op.dn)
                .ok_or_else(|| AmfError::NotExist(op.dn.to_string()))?;
            let mut pref_changed = false;
            if let Some(v) = opt_u32(&op.attrs, "saAmfSIPrefActiveAssignments")? {
                pref_changed |= si.pref_active_assignments != v;
                si.pref_active_assignments = v;
            }
            if let Some(v) = opt_u32(&op.attrs, "saAmfSIPrefStandbyAssignments")? {
                pref_changed |= si.pref_standby_assignments != v;
                si.pref_standby_assignments = v;
            }
            if pref_changed {
                effects.push(CcbApplied::SiPrefChanged(op.dn.clone()));
            }
        }
        ObjClass::Csi => {
            for dep in multi_dn(&op.attrs, "saAmfCSIDependencies")? {
                model.csi_add_dep(&op.dn, &dep)?;
            }
        }
        ObjClass::Comp => {
            let comp = model
                .comps
                .get_mut(&op.dn)
                .ok_or_else(|| AmfError::NotExist(op.dn.to_string()))?;
            if let Some(r) = opt_enum::<Recovery>(&op.attrs, "saAmfCompRecoveryOnError")? {
                // Promotion applies on modify as well as create.
                comp.recovery_on_error = r.normalized();
                comp.clear_inherited(InheritedAttrs::RECOVERY);
            }
            if let Some(v) = opt_bool(&op.attrs, "saAmfCompDisableRestart")? {
                comp.disable_restart = v;
                comp.clear_inherited(InheritedAttrs::DISABLE_RESTART);
            }
            if let Some(v) = opt_u32(&op.attrs, "saAmfCompNumMaxInstantiateWithoutDelay")? {
                comp.max_instantiate_without_delay = v;
                comp.clear_inherited(InheritedAttrs::INST_NO_DELAY_MAX);
            }
            if let Some(v) = opt_duration(&op.attrs, "saAmfCompDelayBetweenInstantiateAttempts")? {
                comp.delay_between_instantiate_attempts = v;
                comp.clear_inherited(InheritedAttrs::INST_DELAY);
            }
            if let Some(v) = opt_duration(&op.attrs, "saAmfCompQuiescingCompleteTimeout")? {
                comp.quiescing_complete_timeout = v;
                comp.clear_inherited(InheritedAttrs::QUIESCING_TIMEOUT);
            }
        }
        ObjClass::CompType => apply_comp_type_modify(model, &op)?,
        ObjClass::GlobalAttributes => {
            let g = build_globals(globals, &op.attrs)?;
            effects.push(CcbApplied::GlobalsChanged(g));
        }
        ObjClass::LogConfig => {
            if let Some(root) = opt_str(&op.attrs, "logRootDirectory")? {
                effects.push(CcbApplied::LogRootChanged(root));
            }
        }
        ObjClass::LogStream => {
            // Re-build the stream config from merged attributes.
            let mut merged = store
                .get(&op.dn)
                .map(|o| o.attrs)
                .unwrap_or_default();
            for m in &op.attrs {
                match merged.iter_mut().find(|a| a.name == m.name) {
                    Some(slot) => slot.values = m.values.clone(),
                    None => merged.push(m.clone()),
                }
            }
            effects.push(CcbApplied::LogStreamUpsert(build_stream_config(
                &op.dn, &merged,
            )?));
        }
        _ => {
            return Err(AmfError::NotSupported(format!(
                "modify of class {} is not supported",
                op.class
            )));
        }
    }
    store.merge_attrs(&op.dn, &op.attrs)?;
    Ok(effects)
}

/// Modifying a component type cascades to every instance that still
/// inherits the touched attribute.
fn apply_comp_type_modify(model: &mut Model, op: &CcbOp) -> AmfResult<()> {
    let timeout = opt_duration(&op.attrs, "saAmfCtDefClcCliTimeout")?;
    let recovery = opt_enum::<Recovery>(&op.attrs, "saAmfCtDefRecoveryOnError")?.map(Recovery::normalized);
    let disable_restart = opt_bool(&op.attrs, "saAmfCtDefDisableRestart")?;
    let inst_no_delay_max = opt_u32(&op.attrs, "saAmfCtDefNumMaxInstantiateWithoutDelay")?;
    let inst_delay = opt_duration(&op.attrs, "saAmfCtDefDelayBetweenInstantiateAttempts")?;
    let quiescing_timeout = opt_duration(&op.attrs, "saAmfCtDefQuiescingCompleteTimeout")?;
    {
        let t = model
            .comp_types
            .get_mut(&op.dn)
            .ok_or_else(|| AmfError::NotExist(op.dn.to_string()))?;
        if let Some(d) = timeout {
            for cmd in [
                &mut t.clc.instantiate,
                &mut t.clc.terminate,
                &mut t.clc.cleanup,
                &mut t.clc.am_start,
                &mut t.clc.am_stop,
                &mut t.clc.healthcheck,
            ]
            .into_iter()
            .flatten()
            {
                cmd.timeout = d;
            }
        }
        if let Some(r) = recovery {
            t.default_recovery = r;
        }
        if let Some(v) = disable_restart {
            t.disable_restart = v;
        }
        if let Some(v) = inst_no_delay_max {
            t.max_instantiate_without_delay = Some(v);
        }
        if let Some(v) = inst_delay {
            t.delay_between_instantiate_attempts = Some(v);
        }
        if let Some(v) = quiescing_timeout {
            t.quiescing_complete_timeout = v;
        }
    }
    for comp_dn in model.comps_of_type(&op.dn) {
        let comp = model.comps.get_mut(&comp_dn).unwrap();
        if let Some(d) = timeout {
            let attrs = comp.inherited_attrs();
            for (flag, cmd) in [
                (InheritedAttrs::INSTANTIATE_CMD, &mut comp.clc.instantiate),
                (InheritedAttrs::TERMINATE_CMD, &mut comp.clc.terminate),
                (InheritedAttrs::CLEANUP_CMD, &mut comp.clc.cleanup),
                (InheritedAttrs::AM_START_CMD, &mut comp.clc.am_start),
                (InheritedAttrs::AM_STOP_CMD, &mut comp.clc.am_stop),
                (InheritedAttrs::HEALTHCHECK_CMD, &mut comp.clc.healthcheck),
            ] {
                if attrs.contains(flag) {
                    if let Some(cmd) = cmd {
                        cmd.timeout = d;
                    }
                }
            }
        }
        if let Some(r) = recovery {
            if comp.inherits(InheritedAttrs::RECOVERY) {
                comp.recovery_on_error = r;
            }
        }
        if let Some(v) = disable_restart {
            if comp.inherits(InheritedAttrs::DISABLE_RESTART) {
                comp.disable_restart = v;
            }
        }
        if let Some(v) = inst_no_delay_max {
            if comp.inherits(InheritedAttrs::INST_NO_DELAY_MAX) {
                comp.max_instantiate_without_delay = v;
            }
        }
        if let Some(v) = inst_delay {
            if comp.inherits(InheritedAttrs::INST_DELAY) {
                comp.delay_between_instantiate_attempts = v;
            }
        }
        if let Some(v) = quiescing_timeout {
            if comp.inherits(InheritedAttrs::QUIESCING_TIMEOUT) {
                comp.quiescing_complete_timeout = v;
            }
        }
    }
    Ok(())
}

fn apply_delete(model: &mut Model, store: &ObjectStore, op: CcbOp) -> AmfResult<Vec<CcbApplied>> {
    let mut effects = Vec::new();
    match op.class {
        ObjClass::Cluster => {
            model.cluster = None;
        }
        ObjClass::Node => model.remove_node(&op.dn)?,
        ObjClass::NodeGroup => model.remove_node_group(&op.dn)?,
        ObjClass::App => model.remove_app(&op.dn)?,
        ObjClass::AppType => {
            model.app_types.shift_remove(&op.dn);
        }
        ObjClass::SuType => {
            model.su_types.shift_remove(&op.dn);
        }
        ObjClass::SgType => {
            model.sg_types.shift_remove(&op.dn);
        }
        ObjClass::SvcType => {
            model.svc_types.shift_remove(&op.dn);
        }
        ObjClass::CsType => {
            model.cs_types.shift_remove(&op.dn);
        }
        ObjClass::CompType => model.remove_comp_type(&op.dn)?,
        ObjClass::Sg => model.remove_sg(&op.dn)?,
        ObjClass::Su => {
            model.remove_su(&op.dn)?;
            effects.push(CcbApplied::SuDeleted(op.dn.clone()));
        }
        ObjClass::Comp => model.remove_comp(&op.dn)?,
        ObjClass::Si => {
            model.remove_si(&op.dn)?;
            effects.push(CcbApplied::SiDeleted(op.dn.clone()));
        }
        ObjClass::Csi => model.remove_csi(&op.dn)?,
        ObjClass::CsiAttribute => {
            if let Some(csi_dn) = op.dn.parent() {
                let name = op.dn.rdn_value().to_string();
                if let Some(csi) = model.csis.get_mut(&csi_dn) {
                    csi.attrs.retain(|(n, _)| n != &name);
                }
            }
        }
        ObjClass::SiDependency => {
            // The sponsor reference lives in the stored attributes.
            if let (Some(dependent), Some(obj)) = (op.dn.parent(), store.get(&op.dn)) {
                if let Some(sponsor) = opt_dn(&obj.attrs, "saAmfDependencySponsor")? {
                    if let Some(si) = model.sis.get_mut(&dependent) {
                        si.deps.retain(|d| d.sponsor != sponsor);
                    }
                }
            }
        }
        ObjClass::SiRankedSu => {
            if let (Some(si_dn), Some(obj)) = (op.dn.parent(), store.get(&op.dn)) {
                if let Some(su) = opt_dn(&obj.attrs, "saAmfRankedSuName")? {
                    if let Some(si) = model.sis.get_mut(&si_dn) {
                        si.ranked_sus.retain(|(s, _)| s != &su);
                    }
                }
            }
        }
        ObjClass::GlobalAttributes | ObjClass::LogConfig => {}
        ObjClass::LogStream => {
            effects.push(CcbApplied::LogStreamDeleted(op.dn.to_string()));
        }
    }
    store.remove(&op.dn);
    Ok(effects)
}
