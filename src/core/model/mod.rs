// src/core/model/mod.rs

//! The in-memory entity model: one owned table per entity kind, keyed by
//! DN, with logical cross-references resolved by lookup.
//!
//! Every mutation validates the entity invariants, applies the change, and
//! queues effects: a checkpoint record when the change is state-affecting
//! and a runtime-object update when it is runtime-visible. The director
//! task drains the effects after each processed event; the model itself
//! never touches a channel.

pub mod app;
pub mod assignment;
pub mod attr;
pub mod cluster;
pub mod comp;
pub mod csi;
pub mod dn;
pub mod node;
pub mod nodegroup;
pub mod sg;
pub mod si;
pub mod states;
pub mod su;

use crate::core::alarm::Alarm;
use crate::core::ckpt::records::{CkptRecord, EntityRec};
use crate::core::errors::{AmfError, AmfResult};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use app::{App, AppType, CsType, SgType, SuType, SvcType};
use assignment::{AssignmentKey, CompCsi, SuSiAssignment};
use cluster::Cluster;
use comp::{Component, ComponentType};
use csi::Csi;
use dn::Dn;
use node::Node;
use nodegroup::NodeGroup;
use sg::Sg;
use si::Si;
use states::{
    AdminState, AssignFsmState, AssignmentState, HaState, NodeState, OperState, PresenceState,
    ProxyStatus, ReadinessState, RedundancyModel, SgFsmState,
};
use su::Su;

/// Side effect queued by a model mutation, drained by the director loop.
#[derive(Debug, Clone)]
pub enum ModelEffect {
    /// Mirror this change to the standby peer.
    Ckpt(CkptRecord),
    /// Schedule a runtime-attribute update toward the object store.
    RuntimeUpdate {
        dn: Dn,
        attr: String,
        value: String,
    },
    Alarm(Alarm),
}

/// Result of a readiness recomputation on one SU.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessChange {
    pub su: Dn,
    pub old: ReadinessState,
    pub new: ReadinessState,
}

/// A comparable full-model image, used by cold-sync verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSnapshot {
    pub cluster: Option<Cluster>,
    pub comp_types: Vec<ComponentType>,
    pub nodes: Vec<Node>,
    pub node_groups: Vec<NodeGroup>,
    pub apps: Vec<App>,
    pub sgs: Vec<Sg>,
    pub sus: Vec<Su>,
    pub comps: Vec<Component>,
    pub sis: Vec<Si>,
    pub csis: Vec<Csi>,
    pub assignments: Vec<SuSiAssignment>,
}

#[derive(Debug, Default)]
pub struct Model {
    pub cluster: Option<Cluster>,
    pub app_types: IndexMap<Dn, AppType>,
    pub su_types: IndexMap<Dn, SuType>,
    pub sg_types: IndexMap<Dn, SgType>,
    pub svc_types: IndexMap<Dn, SvcType>,
    pub cs_types: IndexMap<Dn, CsType>,
    pub comp_types: IndexMap<Dn, ComponentType>,
    pub apps: IndexMap<Dn, App>,
    pub nodes: IndexMap<Dn, Node>,
    pub node_groups: IndexMap<Dn, NodeGroup>,
    pub sgs: IndexMap<Dn, Sg>,
    pub sus: IndexMap<Dn, Su>,
    pub comps: IndexMap<Dn, Component>,
    pub sis: IndexMap<Dn, Si>,
    pub csis: IndexMap<Dn, Csi>,
    pub assignments: IndexMap<AssignmentKey, SuSiAssignment>,
    effects: Vec<ModelEffect>,
    /// Set on the standby while applying peer records, so replayed
    /// mutations do not echo back as new checkpoint traffic.
    replica_mode: bool,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_replica_mode(&mut self, on: bool) {
        self.replica_mode = on;
    }

    /// Drains the queued effects of the mutations since the last drain.
    pub fn take_effects(&mut self) -> Vec<ModelEffect> {
        std::mem::take(&mut self.effects)
    }

    fn effect(&mut self, e: ModelEffect) {
        if !self.replica_mode {
            self.effects.push(e);
        }
    }

    fn ckpt(&mut self, rec: CkptRecord) {
        self.effect(ModelEffect::Ckpt(rec));
    }

    fn rt_update(&mut self, dn: &Dn, attr: &str, value: impl ToString) {
        self.effect(ModelEffect::RuntimeUpdate {
            dn: dn.clone(),
            attr: attr.to_string(),
            value: value.to_string(),
        });
    }

    // --- creates ---------------------------------------------------------

    pub fn set_cluster(&mut self, c: Cluster) -> AmfResult<()> {
        if self.cluster.is_some() {
            return Err(AmfError::Exist(c.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Cluster(c.clone())));
        self.cluster = Some(c);
        Ok(())
    }

    pub fn add_app_type(&mut self, t: AppType) -> AmfResult<()> {
        if self.app_types.contains_key(&t.dn) {
            return Err(AmfError::Exist(t.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::AppType(t.clone())));
        self.app_types.insert(t.dn.clone(), t);
        Ok(())
    }

    pub fn add_su_type(&mut self, t: SuType) -> AmfResult<()> {
        if self.su_types.contains_key(&t.dn) {
            return Err(AmfError::Exist(t.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::SuType(t.clone())));
        self.su_types.insert(t.dn.clone(), t);
        Ok(())
    }

    pub fn add_sg_type(&mut self, t: SgType) -> AmfResult<()> {
        if self.sg_types.contains_key(&t.dn) {
            return Err(AmfError::Exist(t.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::SgType(t.clone())));
        self.sg_types.insert(t.dn.clone(), t);
        Ok(())
    }

    pub fn add_svc_type(&mut self, t: SvcType) -> AmfResult<()> {
        if self.svc_types.contains_key(&t.dn) {
            return Err(AmfError::Exist(t.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::SvcType(t.clone())));
        self.svc_types.insert(t.dn.clone(), t);
        Ok(())
    }

    pub fn add_cs_type(&mut self, t: CsType) -> AmfResult<()> {
        if self.cs_types.contains_key(&t.dn) {
            return Err(AmfError::Exist(t.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::CsType(t.clone())));
        self.cs_types.insert(t.dn.clone(), t);
        Ok(())
    }

    pub fn add_comp_type(&mut self, t: ComponentType) -> AmfResult<()> {
        if self.comp_types.contains_key(&t.dn) {
            return Err(AmfError::Exist(t.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::CompType(t.clone())));
        self.comp_types.insert(t.dn.clone(), t);
        Ok(())
    }

    pub fn add_app(&mut self, a: App) -> AmfResult<()> {
        if self.apps.contains_key(&a.dn) {
            return Err(AmfError::Exist(a.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::App(a.clone())));
        self.apps.insert(a.dn.clone(), a);
        Ok(())
    }

    pub fn add_node(&mut self, n: Node) -> AmfResult<()> {
        if self.nodes.contains_key(&n.dn) {
            return Err(AmfError::Exist(n.dn.to_string()));
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Node(n.clone())));
        self.nodes.insert(n.dn.clone(), n);
        Ok(())
    }

    pub fn add_node_group(&mut self, g: NodeGroup) -> AmfResult<()> {
        if self.node_groups.contains_key(&g.dn) {
            return Err(AmfError::Exist(g.dn.to_string()));
        }
        for member in &g.nodes {
            if !self.nodes.contains_key(member) {
                return Err(AmfError::NotExist(member.to_string()));
            }
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::NodeGroup(g.clone())));
        self.node_groups.insert(g.dn.clone(), g);
        Ok(())
    }

    pub fn add_sg(&mut self, mut s: Sg) -> AmfResult<()> {
        if self.sgs.contains_key(&s.dn) {
            return Err(AmfError::Exist(s.dn.to_string()));
        }
        if let Some(app) = &s.app {
            if !self.apps.contains_key(app) {
                return Err(AmfError::NotExist(app.to_string()));
            }
        }
        s.fsm_state = SgFsmState::Stable;
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Sg(s.clone())));
        self.sgs.insert(s.dn.clone(), s);
        Ok(())
    }

    pub fn add_su(&mut self, mut s: Su) -> AmfResult<()> {
        if self.sus.contains_key(&s.dn) {
            return Err(AmfError::Exist(s.dn.to_string()));
        }
        let sg = self
            .sgs
            .get(&s.sg)
            .ok_or_else(|| AmfError::NotExist(s.sg.to_string()))?;
        s.middleware = sg.middleware;
        if !self.nodes.contains_key(&s.node) {
            return Err(AmfError::NotExist(s.node.to_string()));
        }
        if let Some(ng) = &s.node_group {
            if !self.node_groups.contains_key(ng) {
                return Err(AmfError::NotExist(ng.to_string()));
            }
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Su(s.clone())));
        self.sus.insert(s.dn.clone(), s);
        Ok(())
    }

    pub fn add_comp(&mut self, c: Component) -> AmfResult<()> {
        if self.comps.contains_key(&c.dn) {
            return Err(AmfError::Exist(c.dn.to_string()));
        }
        if !self.sus.contains_key(&c.su) {
            return Err(AmfError::NotExist(c.su.to_string()));
        }
        if !self.comp_types.contains_key(&c.comp_type) {
            return Err(AmfError::NotExist(c.comp_type.to_string()));
        }
        let su_dn = c.su.clone();
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Comp(c.clone())));
        self.comps.insert(c.dn.clone(), c);
        self.refresh_su_preinstantiable(&su_dn);
        Ok(())
    }

    pub fn add_si(&mut self, s: Si) -> AmfResult<()> {
        if self.sis.contains_key(&s.dn) {
            return Err(AmfError::Exist(s.dn.to_string()));
        }
        if !self.sgs.contains_key(&s.sg) {
            return Err(AmfError::NotExist(s.sg.to_string()));
        }
        if let Some(st) = &s.svc_type {
            if !self.svc_types.contains_key(st) {
                return Err(AmfError::NotExist(st.to_string()));
            }
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Si(s.clone())));
        self.sis.insert(s.dn.clone(), s);
        Ok(())
    }

    pub fn add_csi(&mut self, c: Csi) -> AmfResult<()> {
        if self.csis.contains_key(&c.dn) {
            return Err(AmfError::Exist(c.dn.to_string()));
        }
        let si_dn = c
            .si
            .clone();
        if !self.sis.contains_key(&si_dn) {
            return Err(AmfError::NotExist(si_dn.to_string()));
        }
        // Dependencies must stay inside the same SI and keep the DAG acyclic.
        for dep in &c.deps {
            match self.csis.get(dep) {
                Some(sponsor) if sponsor.si == si_dn => {}
                Some(_) => {
                    return Err(AmfError::InvalidParam(format!(
                        "CSI dependency '{dep}' is outside SI '{si_dn}'"
                    )));
                }
                None => return Err(AmfError::NotExist(dep.to_string())),
            }
        }
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Csi(c.clone())));
        self.csis.insert(c.dn.clone(), c);
        csi::recompute_ranks(&mut self.csis, &si_dn);
        Ok(())
    }

    /// Adds one CSI-CSI dependency edge, recomputing sibling ranks.
    pub fn csi_add_dep(&mut self, csi_dn: &Dn, sponsor: &Dn) -> AmfResult<()> {
        let si_dn = self
            .csis
            .get(csi_dn)
            .ok_or_else(|| AmfError::NotExist(csi_dn.to_string()))?
            .si
            .clone();
        match self.csis.get(sponsor) {
            Some(s) if s.si == si_dn => {}
            Some(_) => {
                return Err(AmfError::InvalidParam(format!(
                    "CSI dependency '{sponsor}' is outside SI '{si_dn}'"
                )));
            }
            None => return Err(AmfError::NotExist(sponsor.to_string())),
        }
        csi::check_acyclic(&self.csis, &si_dn, Some((csi_dn, sponsor)))?;
        let c = self.csis.get_mut(csi_dn).unwrap();
        if !c.deps.contains(sponsor) {
            c.deps.push(sponsor.clone());
        }
        csi::recompute_ranks(&mut self.csis, &si_dn);
        let rec = self.csis.get(csi_dn).unwrap().clone();
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Csi(rec)));
        Ok(())
    }

    /// Removes one dependency edge; all sibling ranks are recomputed.
    pub fn csi_remove_dep(&mut self, csi_dn: &Dn, sponsor: &Dn) -> AmfResult<()> {
        let si_dn = self
            .csis
            .get(csi_dn)
            .ok_or_else(|| AmfError::NotExist(csi_dn.to_string()))?
            .si
            .clone();
        let c = self.csis.get_mut(csi_dn).unwrap();
        c.deps.retain(|d| d != sponsor);
        csi::recompute_ranks(&mut self.csis, &si_dn);
        let rec = self.csis.get(csi_dn).unwrap().clone();
        self.ckpt(CkptRecord::EntityCreate(EntityRec::Csi(rec)));
        Ok(())
    }

    // --- deletes ---------------------------------------------------------

    pub fn remove_csi(&mut self, dn: &Dn) -> AmfResult<()> {
        let si_dn = self
            .csis
            .get(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?
            .si
            .clone();
        // Strip the deleted CSI from sibling dependency lists first.
        for c in self.csis.values_mut() {
            c.deps.retain(|d| d != dn);
        }
        self.csis.shift_remove(dn);
        csi::recompute_ranks(&mut self.csis, &si_dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    pub fn remove_si(&mut self, dn: &Dn) -> AmfResult<()> {
        let si = self
            .sis
            .get(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if si.is_assigned() {
            return Err(AmfError::BadOperation(format!(
                "SI '{dn}' still has assignments"
            )));
        }
        if self.csis.values().any(|c| &c.si == dn) {
            return Err(AmfError::BadOperation(format!(
                "SI '{dn}' still contains CSIs"
            )));
        }
        self.sis.shift_remove(dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    pub fn remove_comp(&mut self, dn: &Dn) -> AmfResult<()> {
        let comp = self
            .comps
            .get(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if comp.presence_state != PresenceState::Uninstantiated {
            return Err(AmfError::BadOperation(format!(
                "component '{dn}' is not uninstantiated"
            )));
        }
        let su_dn = comp.su.clone();
        self.comps.shift_remove(dn);
        self.refresh_su_preinstantiable(&su_dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    pub fn remove_su(&mut self, dn: &Dn) -> AmfResult<()> {
        if !self.sus.contains_key(dn) {
            return Err(AmfError::NotExist(dn.to_string()));
        }
        if self.assignments.keys().any(|(su, _)| su == dn) {
            return Err(AmfError::BadOperation(format!(
                "SU '{dn}' still has assignments"
            )));
        }
        if self.comps.values().any(|c| &c.su == dn) {
            return Err(AmfError::BadOperation(format!(
                "SU '{dn}' still contains components"
            )));
        }
        self.sus.shift_remove(dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    pub fn remove_sg(&mut self, dn: &Dn) -> AmfResult<()> {
        if !self.sgs.contains_key(dn) {
            return Err(AmfError::NotExist(dn.to_string()));
        }
        if self.sus.values().any(|s| &s.sg == dn) || self.sis.values().any(|s| &s.sg == dn) {
            return Err(AmfError::BadOperation(format!(
                "SG '{dn}' still contains SUs or SIs"
            )));
        }
        self.sgs.shift_remove(dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    pub fn remove_node(&mut self, dn: &Dn) -> AmfResult<()> {
        let node = self
            .nodes
            .get(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if !node.is_removable() {
            return Err(AmfError::BadOperation(format!(
                "node '{dn}' is not locked for instantiation"
            )));
        }
        if self.sus.values().any(|s| &s.node == dn) {
            return Err(AmfError::BadOperation(format!(
                "node '{dn}' still hosts SUs"
            )));
        }
        self.nodes.shift_remove(dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    pub fn remove_node_group(&mut self, dn: &Dn) -> AmfResult<()> {
        let g = self
            .node_groups
            .get(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if !g.oper_list.is_empty() {
            return Err(AmfError::TryAgain(format!(
                "node group '{dn}' has an operation in progress"
            )));
        }
        if let Some(su) = self
            .sus
            .values()
            .find(|s| s.node_group.as_ref() == Some(dn))
        {
            return Err(AmfError::BadOperation(format!(
                "node group '{dn}' still maps SU '{}'",
                su.dn
            )));
        }
        self.node_groups.shift_remove(dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    pub fn remove_app(&mut self, dn: &Dn) -> AmfResult<()> {
        if !self.apps.contains_key(dn) {
            return Err(AmfError::NotExist(dn.to_string()));
        }
        if self.sgs.values().any(|s| s.app.as_ref() == Some(dn)) {
            return Err(AmfError::BadOperation(format!(
                "application '{dn}' still contains SGs"
            )));
        }
        self.apps.shift_remove(dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    pub fn remove_comp_type(&mut self, dn: &Dn) -> AmfResult<()> {
        if !self.comp_types.contains_key(dn) {
            return Err(AmfError::NotExist(dn.to_string()));
        }
        if self.comps.values().any(|c| &c.comp_type == dn) {
            return Err(AmfError::BadOperation(format!(
                "component type '{dn}' still has instances"
            )));
        }
        self.comp_types.shift_remove(dn);
        self.ckpt(CkptRecord::EntityDelete { dn: dn.clone() });
        Ok(())
    }

    // --- state setters ---------------------------------------------------

    pub fn node_set_admin_state(
        &mut self,
        dn: &Dn,
        state: AdminState,
    ) -> AmfResult<Vec<ReadinessChange>> {
        let node = self
            .nodes
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if node.admin_state == state {
            return Ok(Vec::new());
        }
        debug!(node = %dn, from = %node.admin_state, to = %state, "node admin state");
        node.admin_state = state;
        self.rt_update(dn, "saAmfNodeAdminState", state);
        self.ckpt_node_state(dn);
        Ok(self.refresh_readiness_for_node(dn))
    }

    pub fn node_set_oper_state(
        &mut self,
        dn: &Dn,
        state: OperState,
    ) -> AmfResult<Vec<ReadinessChange>> {
        let node = self
            .nodes
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if node.oper_state == state {
            return Ok(Vec::new());
        }
        node.oper_state = state;
        self.rt_update(dn, "saAmfNodeOperState", state);
        self.ckpt_node_state(dn);
        Ok(self.refresh_readiness_for_node(dn))
    }

    pub fn node_set_node_state(&mut self, dn: &Dn, state: NodeState) -> AmfResult<()> {
        let node = self
            .nodes
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        node.node_state = state;
        self.ckpt_node_state(dn);
        Ok(())
    }

    fn ckpt_node_state(&mut self, dn: &Dn) {
        if let Some(n) = self.nodes.get(dn) {
            let rec = CkptRecord::NodeState {
                dn: n.dn.clone(),
                admin_state: n.admin_state,
                oper_state: n.oper_state,
                node_state: n.node_state,
                su_failover_count: n.su_failover_count,
            };
            self.ckpt(rec);
        }
    }

    pub fn nodegroup_set_admin_state(
        &mut self,
        dn: &Dn,
        state: AdminState,
    ) -> AmfResult<Vec<ReadinessChange>> {
        let g = self
            .node_groups
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if g.admin_state == state {
            return Ok(Vec::new());
        }
        g.admin_state = state;
        let members = g.nodes.clone();
        self.rt_update(dn, "saAmfNGAdminState", state);
        let rec = EntityRec::NodeGroup(self.node_groups.get(dn).unwrap().clone());
        self.ckpt(CkptRecord::EntityCreate(rec));
        let mut changes = Vec::new();
        for node in members {
            changes.extend(self.refresh_readiness_for_node(&node));
        }
        Ok(changes)
    }

    pub fn sg_set_admin_state(&mut self, dn: &Dn, state: AdminState) -> AmfResult<()> {
        let sg = self
            .sgs
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if sg.admin_state == state {
            return Ok(());
        }
        sg.admin_state = state;
        let (admin_state, fsm_state) = (sg.admin_state, sg.fsm_state);
        self.rt_update(dn, "saAmfSGAdminState", state);
        self.ckpt(CkptRecord::SgState {
            dn: dn.clone(),
            admin_state,
            fsm_state,
        });
        Ok(())
    }

    pub fn sg_set_fsm_state(&mut self, dn: &Dn, state: SgFsmState) -> AmfResult<()> {
        let sg = self
            .sgs
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if sg.fsm_state == state {
            return Ok(());
        }
        debug!(sg = %dn, from = %sg.fsm_state, to = %state, "SG FSM");
        sg.fsm_state = state;
        let (admin_state, fsm_state) = (sg.admin_state, sg.fsm_state);
        self.ckpt(CkptRecord::SgState {
            dn: dn.clone(),
            admin_state,
            fsm_state,
        });
        Ok(())
    }

    pub fn su_set_admin_state(
        &mut self,
        dn: &Dn,
        state: AdminState,
    ) -> AmfResult<Vec<ReadinessChange>> {
        let su = self
            .sus
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if su.admin_state == state {
            return Ok(Vec::new());
        }
        su.admin_state = state;
        self.rt_update(dn, "saAmfSUAdminState", state);
        self.ckpt_su_state(dn);
        Ok(self.refresh_su_readiness(dn).into_iter().collect())
    }

    pub fn su_set_oper_state(
        &mut self,
        dn: &Dn,
        state: OperState,
    ) -> AmfResult<Vec<ReadinessChange>> {
        let su = self
            .sus
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if su.oper_state == state {
            return Ok(Vec::new());
        }
        su.oper_state = state;
        self.rt_update(dn, "saAmfSUOperState", state);
        self.ckpt_su_state(dn);
        Ok(self.refresh_su_readiness(dn).into_iter().collect())
    }

    pub fn su_set_presence_state(&mut self, dn: &Dn, state: PresenceState) -> AmfResult<()> {
        let su = self
            .sus
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if su.presence_state == state {
            return Ok(());
        }
        su.presence_state = state;
        if matches!(state, PresenceState::Uninstantiated | PresenceState::Instantiated) {
            su.term_state = false;
        }
        self.rt_update(dn, "saAmfSUPresenceState", state);
        self.ckpt_su_state(dn);
        Ok(())
    }

    pub fn su_inc_restart_count(&mut self, dn: &Dn) -> AmfResult<u32> {
        let su = self
            .sus
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        su.restart_count += 1;
        let count = su.restart_count;
        self.rt_update(dn, "saAmfSURestartCount", count);
        self.ckpt_su_state(dn);
        Ok(count)
    }

    fn ckpt_su_state(&mut self, dn: &Dn) {
        if let Some(s) = self.sus.get(dn) {
            let rec = CkptRecord::SuState {
                dn: s.dn.clone(),
                admin_state: s.admin_state,
                oper_state: s.oper_state,
                presence_state: s.presence_state,
                readiness_state: s.readiness_state,
                restart_count: s.restart_count,
            };
            self.ckpt(rec);
        }
    }

    pub fn comp_set_presence_state(&mut self, dn: &Dn, state: PresenceState) -> AmfResult<()> {
        let comp = self
            .comps
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if comp.presence_state == state {
            return Ok(());
        }
        comp.presence_state = state;
        self.rt_update(dn, "saAmfCompPresenceState", state);
        self.ckpt_comp_state(dn);
        Ok(())
    }

    pub fn comp_set_oper_state(&mut self, dn: &Dn, state: OperState) -> AmfResult<()> {
        let comp = self
            .comps
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if comp.oper_state == state {
            return Ok(());
        }
        comp.oper_state = state;
        self.rt_update(dn, "saAmfCompOperState", state);
        self.ckpt_comp_state(dn);
        Ok(())
    }

    pub fn comp_set_proxy(
        &mut self,
        dn: &Dn,
        status: ProxyStatus,
        proxy: Option<Dn>,
    ) -> AmfResult<()> {
        let comp = self
            .comps
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        comp.proxy_status = status;
        comp.current_proxy = proxy.clone();
        self.rt_update(
            dn,
            "saAmfCompCurrProxyName",
            proxy.map(|p| p.to_string()).unwrap_or_default(),
        );
        self.ckpt_comp_state(dn);
        Ok(())
    }

    pub fn comp_inc_restart_count(&mut self, dn: &Dn) -> AmfResult<u32> {
        let comp = self
            .comps
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        comp.restart_count += 1;
        let count = comp.restart_count;
        self.rt_update(dn, "saAmfCompRestartCount", count);
        self.ckpt_comp_state(dn);
        Ok(count)
    }

    fn ckpt_comp_state(&mut self, dn: &Dn) {
        if let Some(c) = self.comps.get(dn) {
            let rec = CkptRecord::CompState {
                dn: c.dn.clone(),
                presence_state: c.presence_state,
                oper_state: c.oper_state,
                proxy_status: c.proxy_status,
                current_proxy: c.current_proxy.clone(),
                restart_count: c.restart_count,
            };
            self.ckpt(rec);
        }
    }

    pub fn si_set_admin_state(&mut self, dn: &Dn, state: AdminState) -> AmfResult<()> {
        let si = self
            .sis
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        if si.admin_state == state {
            return Ok(());
        }
        si.admin_state = state;
        self.rt_update(dn, "saAmfSIAdminState", state);
        self.ckpt_si_state(dn);
        Ok(())
    }

    fn ckpt_si_state(&mut self, dn: &Dn) {
        if let Some(s) = self.sis.get(dn) {
            let rec = CkptRecord::SiState {
                dn: s.dn.clone(),
                admin_state: s.admin_state,
                assignment_state: s.assignment_state,
                num_curr_active: s.num_curr_active,
                num_curr_standby: s.num_curr_standby,
                alarm_sent: s.alarm_sent,
            };
            self.ckpt(rec);
        }
    }

    // --- readiness derivation --------------------------------------------

    fn derive_su_readiness(&self, su: &Su) -> ReadinessState {
        let Some(node) = self.nodes.get(&su.node) else {
            return ReadinessState::OutOfService;
        };
        if su.oper_state != OperState::Enabled || node.oper_state != OperState::Enabled {
            return ReadinessState::OutOfService;
        }
        let locked = |a: AdminState| {
            matches!(a, AdminState::Locked | AdminState::LockedInstantiation)
        };
        let groups: Vec<&NodeGroup> = self
            .node_groups
            .values()
            .filter(|g| g.contains(&su.node))
            .collect();
        if locked(su.admin_state)
            || locked(node.admin_state)
            || groups.iter().any(|g| locked(g.admin_state))
        {
            return ReadinessState::OutOfService;
        }
        let shutting = su.admin_state == AdminState::ShuttingDown
            || node.admin_state == AdminState::ShuttingDown
            || groups.iter().any(|g| g.admin_state == AdminState::ShuttingDown);
        if shutting {
            ReadinessState::Stopping
        } else {
            ReadinessState::InService
        }
    }

    /// Recomputes one SU's readiness (and mirrors it onto the contained
    /// components). Returns the change when the state moved.
    pub fn refresh_su_readiness(&mut self, dn: &Dn) -> Option<ReadinessChange> {
        let su = self.sus.get(dn)?;
        let old = su.readiness_state;
        let new = self.derive_su_readiness(su);
        if old == new {
            return None;
        }
        self.sus.get_mut(dn).unwrap().readiness_state = new;
        self.rt_update(dn, "saAmfSUReadinessState", new);
        self.ckpt_su_state(dn);
        let comp_dns: Vec<Dn> = self
            .comps
            .values()
            .filter(|c| &c.su == dn)
            .map(|c| c.dn.clone())
            .collect();
        for comp in comp_dns {
            self.comps.get_mut(&comp).unwrap().readiness_state = new;
            self.rt_update(&comp, "saAmfCompReadinessState", new);
        }
        Some(ReadinessChange { su: dn.clone(), old, new })
    }

    /// Recomputes readiness of every SU hosted on `node`.
    pub fn refresh_readiness_for_node(&mut self, node: &Dn) -> Vec<ReadinessChange> {
        let sus: Vec<Dn> = self
            .sus
            .values()
            .filter(|s| &s.node == node)
            .map(|s| s.dn.clone())
            .collect();
        sus.iter()
            .filter_map(|dn| self.refresh_su_readiness(dn))
            .collect()
    }

    fn refresh_su_preinstantiable(&mut self, su_dn: &Dn) {
        let pre = self
            .comps
            .values()
            .filter(|c| &c.su == su_dn)
            .any(|c| c.category.is_preinstantiable());
        if let Some(su) = self.sus.get_mut(su_dn) {
            su.preinstantiable = pre;
        }
    }

    // --- assignment edges ------------------------------------------------

    /// Creates an SU-SI assignment edge in ASSIGNING state and recounts the
    /// SI's derived counters.
    pub fn create_assignment(&mut self, su: &Dn, si: &Dn, ha: HaState) -> AmfResult<()> {
        if !self.sus.contains_key(su) {
            return Err(AmfError::NotExist(su.to_string()));
        }
        if !self.sis.contains_key(si) {
            return Err(AmfError::NotExist(si.to_string()));
        }
        let key = (su.clone(), si.clone());
        if self.assignments.contains_key(&key) {
            return Err(AmfError::Exist(format!("{su} -> {si}")));
        }
        let mut edge = SuSiAssignment::new(su.clone(), si.clone(), ha);
        edge.comp_csis = self.build_comp_csis(su, si, ha);
        self.ckpt(CkptRecord::AssignmentState(edge.clone()));
        self.assignments.insert(key, edge);
        self.si_recount(si);
        Ok(())
    }

    /// Pairs the SI's CSIs with the SU's components: first component
    /// supporting the CS type wins, round-robin as a fallback.
    fn build_comp_csis(&self, su: &Dn, si: &Dn, ha: HaState) -> Vec<CompCsi> {
        let comps = self.comps_of_su(su);
        let mut edges = Vec::new();
        if comps.is_empty() {
            return edges;
        }
        for (i, csi_dn) in csi::ordered_csis(&self.csis, si).into_iter().enumerate() {
            let cs_type = self.csis.get(&csi_dn).and_then(|c| c.cs_type.clone());
            let comp = cs_type
                .as_ref()
                .and_then(|ct| {
                    comps
                        .iter()
                        .find(|dn| {
                            self.comps
                                .get(*dn)
                                .map(|c| c.cs_types.contains(ct))
                                .unwrap_or(false)
                        })
                })
                .unwrap_or(&comps[i % comps.len()]);
            edges.push(CompCsi {
                comp: comp.clone(),
                csi: csi_dn,
                ha_state: ha,
            });
        }
        edges
    }

    /// Changes the HA state of an existing edge (MODIFYING until confirmed).
    pub fn modify_assignment_ha(&mut self, su: &Dn, si: &Dn, ha: HaState) -> AmfResult<()> {
        let key = (su.clone(), si.clone());
        let edge = self
            .assignments
            .get_mut(&key)
            .ok_or_else(|| AmfError::NotExist(format!("{su} -> {si}")))?;
        edge.ha_state = ha;
        edge.fsm = AssignFsmState::Modifying;
        for cc in &mut edge.comp_csis {
            cc.ha_state = ha;
        }
        let rec = edge.clone();
        self.ckpt(CkptRecord::AssignmentState(rec));
        self.si_recount(si);
        Ok(())
    }

    /// Marks an in-flight edge as acknowledged by the node director.
    pub fn confirm_assignment(&mut self, su: &Dn, si: &Dn) -> AmfResult<()> {
        let key = (su.clone(), si.clone());
        let edge = self
            .assignments
            .get_mut(&key)
            .ok_or_else(|| AmfError::NotExist(format!("{su} -> {si}")))?;
        edge.fsm = AssignFsmState::Assigned;
        let rec = edge.clone();
        self.ckpt(CkptRecord::AssignmentState(rec));
        Ok(())
    }

    /// Marks an edge as being removed (UNASSIGNING until confirmed).
    pub fn begin_unassign(&mut self, su: &Dn, si: &Dn) -> AmfResult<()> {
        let key = (su.clone(), si.clone());
        let edge = self
            .assignments
            .get_mut(&key)
            .ok_or_else(|| AmfError::NotExist(format!("{su} -> {si}")))?;
        edge.fsm = AssignFsmState::Unassigning;
        let rec = edge.clone();
        self.ckpt(CkptRecord::AssignmentState(rec));
        Ok(())
    }

    /// Destroys an edge on unassign confirmation (or rollback).
    pub fn delete_assignment(&mut self, su: &Dn, si: &Dn) -> AmfResult<()> {
        let key = (su.clone(), si.clone());
        if self.assignments.shift_remove(&key).is_none() {
            return Err(AmfError::NotExist(format!("{su} -> {si}")));
        }
        self.ckpt(CkptRecord::AssignmentDelete {
            su: su.clone(),
            si: si.clone(),
        });
        self.si_recount(si);
        Ok(())
    }

    /// Recomputes the SI's derived counters from its edges and maps them to
    /// the assignment state for the SG's redundancy model.
    fn si_recount(&mut self, si_dn: &Dn) {
        let Some(si) = self.sis.get(si_dn) else { return };
        let sg_model = self
            .sgs
            .get(&si.sg)
            .map(|sg| sg.redundancy_model)
            .unwrap_or_default();
        let act = self
            .assignments
            .values()
            .filter(|a| &a.si == si_dn && a.ha_state == HaState::Active)
            .count() as u32;
        let std = self
            .assignments
            .values()
            .filter(|a| &a.si == si_dn && a.ha_state == HaState::Standby)
            .count() as u32;

        let si = self.sis.get(si_dn).unwrap();
        let new_state = match sg_model {
            RedundancyModel::TwoN | RedundancyModel::NPlusM => match (act, std) {
                (0, 0) => AssignmentState::Unassigned,
                (1, 1) => AssignmentState::FullyAssigned,
                _ => AssignmentState::PartiallyAssigned,
            },
            RedundancyModel::NWay => {
                if act == 0 && std == 0 {
                    AssignmentState::Unassigned
                } else if act == 1 && std == si.pref_standby_assignments {
                    AssignmentState::FullyAssigned
                } else {
                    AssignmentState::PartiallyAssigned
                }
            }
            RedundancyModel::NWayActive => {
                if act == 0 {
                    AssignmentState::Unassigned
                } else if act == si.pref_active_assignments {
                    AssignmentState::FullyAssigned
                } else {
                    AssignmentState::PartiallyAssigned
                }
            }
            RedundancyModel::NoRedundancy => {
                if act == 0 {
                    AssignmentState::Unassigned
                } else {
                    AssignmentState::FullyAssigned
                }
            }
        };

        let old_state = si.assignment_state;
        let old_alarm_sent = si.alarm_sent;
        let counters_changed = si.num_curr_active != act || si.num_curr_standby != std;
        {
            let si = self.sis.get_mut(si_dn).unwrap();
            si.num_curr_active = act;
            si.num_curr_standby = std;
        }
        if counters_changed {
            self.rt_update(si_dn, "saAmfSINumCurrActiveAssignments", act);
            self.rt_update(si_dn, "saAmfSINumCurrStandbyAssignments", std);
        }
        if new_state != old_state {
            debug!(si = %si_dn, from = %old_state, to = %new_state, "SI assignment state");
            self.sis.get_mut(si_dn).unwrap().assignment_state = new_state;
            self.rt_update(si_dn, "saAmfSIAssignmentState", new_state);
            if new_state == AssignmentState::Unassigned {
                self.sis.get_mut(si_dn).unwrap().alarm_sent = true;
                self.effect(ModelEffect::Alarm(Alarm::SiUnassigned(si_dn.clone())));
            } else {
                if old_state == AssignmentState::Unassigned && old_alarm_sent {
                    self.effect(ModelEffect::Alarm(Alarm::SiUnassignedCleared(
                        si_dn.clone(),
                    )));
                }
                self.sis.get_mut(si_dn).unwrap().alarm_sent = false;
            }
        }
        if counters_changed || new_state != old_state {
            self.ckpt_si_state(si_dn);
        }
    }

    // --- queries ---------------------------------------------------------

    /// SUs of an SG ordered by rank, insertion order as the tie-breaker.
    pub fn sus_of_sg(&self, sg: &Dn) -> Vec<Dn> {
        let mut out: Vec<&Su> = self.sus.values().filter(|s| &s.sg == sg).collect();
        out.sort_by_key(|s| s.rank);
        out.into_iter().map(|s| s.dn.clone()).collect()
    }

    pub fn in_service_sus_of_sg(&self, sg: &Dn) -> Vec<Dn> {
        self.sus_of_sg(sg)
            .into_iter()
            .filter(|dn| self.sus[dn].is_in_service())
            .collect()
    }

    /// SIs of an SG by rank, `0` sorting last (lowest priority).
    pub fn sis_of_sg(&self, sg: &Dn) -> Vec<Dn> {
        let mut out: Vec<&Si> = self.sis.values().filter(|s| &s.sg == sg).collect();
        out.sort_by_key(|s| s.effective_rank());
        out.into_iter().map(|s| s.dn.clone()).collect()
    }

    /// Components of an SU in instantiation order.
    pub fn comps_of_su(&self, su: &Dn) -> Vec<Dn> {
        let mut out: Vec<&Component> = self.comps.values().filter(|c| &c.su == su).collect();
        out.sort_by(|a, b| {
            a.instantiation_level
                .cmp(&b.instantiation_level)
                .then_with(|| a.dn.cmp(&b.dn))
        });
        out.into_iter().map(|c| c.dn.clone()).collect()
    }

    /// Hosted SUs of a node: middleware SUs first, application SUs second,
    /// each list ordered by SU rank.
    pub fn sus_on_node(&self, node: &Dn) -> Vec<Dn> {
        let mut mw: Vec<&Su> = self
            .sus
            .values()
            .filter(|s| &s.node == node && s.middleware)
            .collect();
        let mut app: Vec<&Su> = self
            .sus
            .values()
            .filter(|s| &s.node == node && !s.middleware)
            .collect();
        mw.sort_by_key(|s| s.rank);
        app.sort_by_key(|s| s.rank);
        mw.into_iter()
            .chain(app)
            .map(|s| s.dn.clone())
            .collect()
    }

    pub fn assignments_of_su(&self, su: &Dn) -> Vec<AssignmentKey> {
        self.assignments
            .keys()
            .filter(|(s, _)| s == su)
            .cloned()
            .collect()
    }

    pub fn assignments_of_si(&self, si: &Dn) -> Vec<AssignmentKey> {
        self.assignments
            .keys()
            .filter(|(_, s)| s == si)
            .cloned()
            .collect()
    }

    /// Whether a DN names any entity in any table.
    pub fn contains_dn(&self, dn: &Dn) -> bool {
        self.cluster.as_ref().map(|c| &c.dn == dn).unwrap_or(false)
            || self.app_types.contains_key(dn)
            || self.su_types.contains_key(dn)
            || self.sg_types.contains_key(dn)
            || self.svc_types.contains_key(dn)
            || self.cs_types.contains_key(dn)
            || self.comp_types.contains_key(dn)
            || self.apps.contains_key(dn)
            || self.nodes.contains_key(dn)
            || self.node_groups.contains_key(dn)
            || self.sgs.contains_key(dn)
            || self.sus.contains_key(dn)
            || self.comps.contains_key(dn)
            || self.sis.contains_key(dn)
            || self.csis.contains_key(dn)
    }

    pub fn node_groups_containing(&self, node: &Dn) -> Vec<Dn> {
        self.node_groups
            .values()
            .filter(|g| g.contains(node))
            .map(|g| g.dn.clone())
            .collect()
    }

    pub fn comps_of_type(&self, ctype: &Dn) -> Vec<Dn> {
        self.comps
            .values()
            .filter(|c| &c.comp_type == ctype)
            .map(|c| c.dn.clone())
            .collect()
    }

    /// True when every sponsor of `si` is fully assigned with an active
    /// assignment, the gate for assigning a dependent SI active.
    pub fn si_sponsors_ready(&self, si: &Dn) -> bool {
        let Some(si) = self.sis.get(si) else { return false };
        si.deps.iter().all(|dep| {
            self.sis
                .get(&dep.sponsor)
                .map(|s| s.assignment_state == AssignmentState::FullyAssigned)
                .unwrap_or(false)
        })
    }

    /// Dependent SIs of a sponsor, anywhere in the model.
    pub fn si_dependents(&self, sponsor: &Dn) -> Vec<Dn> {
        self.sis
            .values()
            .filter(|s| s.depends_on(sponsor))
            .map(|s| s.dn.clone())
            .collect()
    }

    // --- snapshots and standby apply -------------------------------------

    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            cluster: self.cluster.clone(),
            comp_types: self.comp_types.values().cloned().collect(),
            nodes: self.nodes.values().cloned().collect(),
            node_groups: self.node_groups.values().cloned().collect(),
            apps: self.apps.values().cloned().collect(),
            sgs: self.sgs.values().cloned().collect(),
            sus: self.sus.values().cloned().collect(),
            comps: self.comps.values().cloned().collect(),
            sis: self.sis.values().cloned().collect(),
            csis: self.csis.values().cloned().collect(),
            assignments: self.assignments.values().cloned().collect(),
        }
    }

    /// Serializes the whole model as cold-sync create records, leaves first
    /// so the standby can replay them through the ordinary create API.
    pub fn cold_sync_records(&self) -> Vec<CkptRecord> {
        let mut out = Vec::new();
        let mut push = |rec: EntityRec| out.push(CkptRecord::EntityCreate(rec));
        for t in self.comp_types.values() {
            push(EntityRec::CompType(t.clone()));
        }
        for t in self.su_types.values() {
            push(EntityRec::SuType(t.clone()));
        }
        for t in self.sg_types.values() {
            push(EntityRec::SgType(t.clone()));
        }
        for t in self.app_types.values() {
            push(EntityRec::AppType(t.clone()));
        }
        for t in self.svc_types.values() {
            push(EntityRec::SvcType(t.clone()));
        }
        for t in self.cs_types.values() {
            push(EntityRec::CsType(t.clone()));
        }
        if let Some(c) = &self.cluster {
            push(EntityRec::Cluster(c.clone()));
        }
        for n in self.nodes.values() {
            push(EntityRec::Node(n.clone()));
        }
        for g in self.node_groups.values() {
            push(EntityRec::NodeGroup(g.clone()));
        }
        for a in self.apps.values() {
            push(EntityRec::App(a.clone()));
        }
        for s in self.sgs.values() {
            push(EntityRec::Sg(s.clone()));
        }
        for s in self.sus.values() {
            push(EntityRec::Su(s.clone()));
        }
        for c in self.comps.values() {
            push(EntityRec::Comp(c.clone()));
        }
        for s in self.sis.values() {
            push(EntityRec::Si(s.clone()));
        }
        for c in self.csis.values() {
            push(EntityRec::Csi(c.clone()));
        }
        for a in self.assignments.values() {
            push(EntityRec::Assignment(a.clone()));
        }
        out
    }

    /// Discards the whole model; the standby does this before a resync.
    pub fn clear(&mut self) {
        *self = Model {
            replica_mode: self.replica_mode,
            ..Model::default()
        };
    }

    /// Applies one replicated record on the standby. Runs with replica mode
    /// engaged so the replay does not emit fresh effects.
    pub fn apply_record(&mut self, rec: CkptRecord) -> AmfResult<()> {
        let was_replica = self.replica_mode;
        self.replica_mode = true;
        let result = self.apply_record_inner(rec);
        self.replica_mode = was_replica;
        result
    }

    fn apply_record_inner(&mut self, rec: CkptRecord) -> AmfResult<()> {
        match rec {
            CkptRecord::EntityCreate(ent) => self.apply_entity(ent),
            CkptRecord::EntityDelete { dn } => {
                // Route by table membership; unknown DNs are tolerated since
                // the delete may race a resync.
                if self.csis.contains_key(&dn) {
                    self.remove_csi(&dn)
                } else if self.comps.contains_key(&dn) {
                    self.comps.shift_remove(&dn);
                    Ok(())
                } else if self.sis.contains_key(&dn) {
                    self.sis.shift_remove(&dn);
                    Ok(())
                } else if self.sus.contains_key(&dn) {
                    self.sus.shift_remove(&dn);
                    Ok(())
                } else if self.sgs.contains_key(&dn) {
                    self.sgs.shift_remove(&dn);
                    Ok(())
                } else if self.node_groups.contains_key(&dn) {
                    self.node_groups.shift_remove(&dn);
                    Ok(())
                } else if self.nodes.contains_key(&dn) {
                    self.nodes.shift_remove(&dn);
                    Ok(())
                } else if self.apps.contains_key(&dn) {
                    self.apps.shift_remove(&dn);
                    Ok(())
                } else if self.comp_types.contains_key(&dn) {
                    self.comp_types.shift_remove(&dn);
                    Ok(())
                } else {
                    Ok(())
                }
            }
            CkptRecord::NodeState {
                dn,
                admin_state,
                oper_state,
                node_state,
                su_failover_count,
            } => {
                let n = self
                    .nodes
                    .get_mut(&dn)
                    .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
                n.admin_state = admin_state;
                n.oper_state = oper_state;
                n.node_state = node_state;
                n.su_failover_count = su_failover_count;
                self.refresh_readiness_for_node(&dn);
                Ok(())
            }
            CkptRecord::SgState {
                dn,
                admin_state,
                fsm_state,
            } => {
                let s = self
                    .sgs
                    .get_mut(&dn)
                    .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
                s.admin_state = admin_state;
                s.fsm_state = fsm_state;
                Ok(())
            }
            CkptRecord::SuState {
                dn,
                admin_state,
                oper_state,
                presence_state,
                readiness_state,
                restart_count,
            } => {
                let s = self
                    .sus
                    .get_mut(&dn)
                    .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
                s.admin_state = admin_state;
                s.oper_state = oper_state;
                s.presence_state = presence_state;
                s.readiness_state = readiness_state;
                s.restart_count = restart_count;
                // Component readiness mirrors the SU's.
                for c in self.comps.values_mut().filter(|c| c.su == dn) {
                    c.readiness_state = readiness_state;
                }
                Ok(())
            }
            CkptRecord::CompState {
                dn,
                presence_state,
                oper_state,
                proxy_status,
                current_proxy,
                restart_count,
            } => {
                let c = self
                    .comps
                    .get_mut(&dn)
                    .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
                c.presence_state = presence_state;
                c.oper_state = oper_state;
                c.proxy_status = proxy_status;
                c.current_proxy = current_proxy;
                c.restart_count = restart_count;
                Ok(())
            }
            CkptRecord::CompConfig(comp) => {
                let dn = comp.dn.clone();
                if self.comps.contains_key(&dn) {
                    self.comps.insert(dn, *comp);
                } else {
                    self.add_comp(*comp)?;
                }
                Ok(())
            }
            CkptRecord::SiState {
                dn,
                admin_state,
                assignment_state,
                num_curr_active,
                num_curr_standby,
                alarm_sent,
            } => {
                let s = self
                    .sis
                    .get_mut(&dn)
                    .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
                s.admin_state = admin_state;
                s.assignment_state = assignment_state;
                s.num_curr_active = num_curr_active;
                s.num_curr_standby = num_curr_standby;
                s.alarm_sent = alarm_sent;
                Ok(())
            }
            CkptRecord::AssignmentState(edge) => {
                let si = edge.si.clone();
                self.assignments.insert(edge.key(), edge);
                self.si_recount(&si);
                Ok(())
            }
            CkptRecord::AssignmentDelete { su, si } => {
                self.assignments.shift_remove(&(su, si.clone()));
                self.si_recount(&si);
                Ok(())
            }
            // Admin-op continuation and log-stream records are consumed by
            // the subsystems above the model; nothing to mirror here.
            CkptRecord::AdminOpState { .. }
            | CkptRecord::AdminOpDone { .. }
            | CkptRecord::LogStreamOpen { .. }
            | CkptRecord::LogStreamClose { .. }
            | CkptRecord::UsageStats { .. } => Ok(()),
        }
    }

    fn apply_entity(&mut self, ent: EntityRec) -> AmfResult<()> {
        match ent {
            EntityRec::Cluster(c) => {
                self.cluster = Some(c);
                Ok(())
            }
            EntityRec::AppType(t) => {
                self.app_types.insert(t.dn.clone(), t);
                Ok(())
            }
            EntityRec::SuType(t) => {
                self.su_types.insert(t.dn.clone(), t);
                Ok(())
            }
            EntityRec::SgType(t) => {
                self.sg_types.insert(t.dn.clone(), t);
                Ok(())
            }
            EntityRec::SvcType(t) => {
                self.svc_types.insert(t.dn.clone(), t);
                Ok(())
            }
            EntityRec::CsType(t) => {
                self.cs_types.insert(t.dn.clone(), t);
                Ok(())
            }
            EntityRec::CompType(t) => {
                self.comp_types.insert(t.dn.clone(), t);
                Ok(())
            }
            EntityRec::App(a) => {
                self.apps.insert(a.dn.clone(), a);
                Ok(())
            }
            EntityRec::Node(n) => {
                self.nodes.insert(n.dn.clone(), n);
                Ok(())
            }
            EntityRec::NodeGroup(g) => {
                self.node_groups.insert(g.dn.clone(), g);
                Ok(())
            }
            EntityRec::Sg(s) => {
                self.sgs.insert(s.dn.clone(), s);
                Ok(())
            }
            EntityRec::Su(s) => {
                self.sus.insert(s.dn.clone(), s);
                Ok(())
            }
            EntityRec::Comp(c) => {
                let su = c.su.clone();
                self.comps.insert(c.dn.clone(), c);
                self.refresh_su_preinstantiable(&su);
                Ok(())
            }
            EntityRec::Si(s) => {
                self.sis.insert(s.dn.clone(), s);
                Ok(())
            }
            EntityRec::Csi(c) => {
                let si = c.si.clone();
                self.csis.insert(c.dn.clone(), c);
                csi::recompute_ranks(&mut self.csis, &si);
                Ok(())
            }
            EntityRec::Assignment(a) => {
                let si = a.si.clone();
                self.assignments.insert(a.key(), a);
                self.si_recount(&si);
                Ok(())
            }
        }
    }
}
