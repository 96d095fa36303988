// src/core/admin/mod.rs

//! The admin operation engine.
//!
//! Every operation is a task keyed by its invocation id: target DN, a
//! counter of outstanding secondary effects, and the caller's completion
//! handle. Replies from node directors decrement the counter; zero
//! completes the task. Partial failure surfaces REPAIR-PENDING and lets
//! the auto-repair rules decide whether a node reboot is ordered.

use crate::core::alarm::{Alarm, AlarmService};
use crate::core::engine::{self, AssignmentOrder};
use crate::core::errors::{AmfError, AmfResult};
use crate::core::model::Model;
use crate::core::model::dn::Dn;
use crate::core::model::states::{AdminState, PresenceState, SgFsmState};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Administrative operation ids, matching the external numeric surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING-KEBAB-CASE")]
pub enum AdminOpId {
    Unlock,
    Lock,
    LockInstantiation,
    UnlockInstantiation,
    Shutdown,
    Restart,
    SiSwap,
    EamStart,
    EamStop,
    ChangeFilter,
}

impl AdminOpId {
    pub fn from_op_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(AdminOpId::Unlock),
            2 => Some(AdminOpId::Lock),
            3 => Some(AdminOpId::LockInstantiation),
            4 => Some(AdminOpId::UnlockInstantiation),
            5 => Some(AdminOpId::Shutdown),
            6 => Some(AdminOpId::Restart),
            7 => Some(AdminOpId::SiSwap),
            10 => Some(AdminOpId::EamStart),
            11 => Some(AdminOpId::EamStop),
            101 => Some(AdminOpId::ChangeFilter),
            _ => None,
        }
    }

    pub fn op_code(self) -> u32 {
        match self {
            AdminOpId::Unlock => 1,
            AdminOpId::Lock => 2,
            AdminOpId::LockInstantiation => 3,
            AdminOpId::UnlockInstantiation => 4,
            AdminOpId::Shutdown => 5,
            AdminOpId::Restart => 6,
            AdminOpId::SiSwap => 7,
            AdminOpId::EamStart => 10,
            AdminOpId::EamStop => 11,
            AdminOpId::ChangeFilter => 101,
        }
    }
}

/// An incoming admin request as delivered by the store or the CLI.
#[derive(Debug)]
pub struct AdminRequest {
    pub invocation: u64,
    pub dn: Dn,
    pub op: AdminOpId,
    pub params: Vec<(String, String)>,
}

/// A secondary effect the director must dispatch for an admin task.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminAction {
    Assignment(AssignmentOrder),
    TerminateSu(Dn),
    InstantiateSu(Dn),
    RestartComp(Dn),
}

/// Keys under which a pending acknowledgement is expected back.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PendingKey {
    Edge(Dn, Dn),
    Su(Dn),
    Comp(Dn),
}

impl AdminAction {
    fn pending_key(&self) -> PendingKey {
        match self {
            AdminAction::Assignment(o) => PendingKey::Edge(o.su.clone(), o.si.clone()),
            AdminAction::TerminateSu(su) | AdminAction::InstantiateSu(su) => {
                PendingKey::Su(su.clone())
            }
            AdminAction::RestartComp(c) => PendingKey::Comp(c.clone()),
        }
    }
}

struct AdminTask {
    dn: Dn,
    op: AdminOpId,
    outstanding: u32,
    failures: u32,
    reply: Option<oneshot::Sender<AmfResult<()>>>,
}

/// The set of in-flight admin tasks, owned by the director task.
#[derive(Default)]
pub struct AdminEngine {
    tasks: HashMap<u64, AdminTask>,
    pending: HashMap<PendingKey, u64>,
}

/// The kinds of entity an admin operation can target.
enum Target {
    Node,
    NodeGroup,
    Sg,
    Su,
    Si,
    Comp,
}

impl AdminEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_task(&self, invocation: u64) -> bool {
        self.tasks.contains_key(&invocation)
    }

    /// Validates and starts one operation, returning the secondary effects
    /// to dispatch. The reply handle is always answered: immediately on
    /// rejection or when there are no secondary effects, otherwise when the
    /// completion counter reaches zero.
    pub fn start(
        &mut self,
        model: &mut Model,
        req: AdminRequest,
        reply: oneshot::Sender<AmfResult<()>>,
    ) -> Vec<AdminAction> {
        match self.start_inner(model, &req) {
            Ok(actions) if actions.is_empty() => {
                let _ = reply.send(Ok(()));
                self.clear_pending_marker(model, &req.dn);
                Vec::new()
            }
            Ok(actions) => {
                info!(invocation = req.invocation, dn = %req.dn, op = %req.op,
                      secondary = actions.len(), "admin operation started");
                for action in &actions {
                    self.pending.insert(action.pending_key(), req.invocation);
                }
                self.tasks.insert(
                    req.invocation,
                    AdminTask {
                        dn: req.dn,
                        op: req.op,
                        outstanding: actions.len() as u32,
                        failures: 0,
                        reply: Some(reply),
                    },
                );
                actions
            }
            Err(e) => {
                warn!(invocation = req.invocation, dn = %req.dn, op = %req.op,
                      error = %e, "admin operation rejected");
                let _ = reply.send(Err(e));
                Vec::new()
            }
        }
    }

    fn start_inner(&mut self, model: &mut Model, req: &AdminRequest) -> AmfResult<Vec<AdminAction>> {
        let target = self.classify(model, &req.dn)?;
        if matches!(req.op, AdminOpId::EamStart | AdminOpId::EamStop) {
            return Err(AmfError::NotSupported(format!("{} is reserved", req.op)));
        }
        self.check_not_busy(model, &req.dn, &target)?;
        match target {
            Target::Node => self.start_node(model, req),
            Target::NodeGroup => self.start_node_group(model, req),
            Target::Sg => self.start_sg(model, req),
            Target::Su => self.start_su(model, req),
            Target::Si => self.start_si(model, req),
            Target::Comp => self.start_comp(model, req),
        }
    }

    fn classify(&self, model: &Model, dn: &Dn) -> AmfResult<Target> {
        if model.nodes.contains_key(dn) {
            Ok(Target::Node)
        } else if model.node_groups.contains_key(dn) {
            Ok(Target::NodeGroup)
        } else if model.sgs.contains_key(dn) {
            Ok(Target::Sg)
        } else if model.sus.contains_key(dn) {
            Ok(Target::Su)
        } else if model.sis.contains_key(dn) {
            Ok(Target::Si)
        } else if model.comps.contains_key(dn) {
            Ok(Target::Comp)
        } else {
            Err(AmfError::NotExist(dn.to_string()))
        }
    }

    /// No operation may start while the target or any enclosing entity is
    /// already being operated on.
    fn check_not_busy(&self, model: &Model, dn: &Dn, target: &Target) -> AmfResult<()> {
        let busy = |pending: Option<u64>, what: &Dn| -> AmfResult<()> {
            match pending {
                Some(inv) => Err(AmfError::TryAgain(format!(
                    "'{what}' already has operation {inv} in progress"
                ))),
                None => Ok(()),
            }
        };
        match target {
            Target::Node => {
                let node = &model.nodes[dn];
                busy(node.admin_pending, dn)?;
                for g in model.node_groups_containing(dn) {
                    busy(model.node_groups[&g].admin_pending, &g)?;
                }
            }
            Target::NodeGroup => {
                let g = &model.node_groups[dn];
                busy(g.admin_pending, dn)?;
                for node in &g.nodes {
                    busy(model.nodes[node].admin_pending, node)?;
                }
            }
            Target::Sg => {
                busy(model.sgs[dn].admin_pending, dn)?;
            }
            Target::Su => {
                let su = &model.sus[dn];
                busy(su.admin_pending, dn)?;
                busy(model.sgs[&su.sg].admin_pending, &su.sg)?;
                busy(model.nodes[&su.node].admin_pending, &su.node)?;
                for g in model.node_groups_containing(&su.node) {
                    busy(model.node_groups[&g].admin_pending, &g)?;
                }
                if !model.sgs[&su.sg].is_stable() {
                    return Err(AmfError::TryAgain(format!(
                        "SG '{}' is not stable",
                        su.sg
                    )));
                }
            }
            Target::Si => {
                let si = &model.sis[dn];
                busy(si.admin_pending, dn)?;
                busy(model.sgs[&si.sg].admin_pending, &si.sg)?;
                if !model.sgs[&si.sg].is_stable() {
                    return Err(AmfError::TryAgain(format!(
                        "SG '{}' is not stable",
                        si.sg
                    )));
                }
            }
            Target::Comp => {
                let comp = &model.comps[dn];
                busy(model.sus[&comp.su].admin_pending, &comp.su)?;
            }
        }
        Ok(())
    }

    fn check_transition(current: AdminState, op: AdminOpId) -> AmfResult<AdminState> {
        use AdminOpId::*;
        use AdminState::*;
        let next = match (op, current) {
            (Unlock, Locked) | (Unlock, ShuttingDown) => Unlocked,
            (Lock, Unlocked) | (Lock, ShuttingDown) => Locked,
            (Shutdown, Unlocked) => ShuttingDown,
            (LockInstantiation, Locked) => LockedInstantiation,
            (UnlockInstantiation, LockedInstantiation) => Locked,
            _ => {
                return Err(AmfError::BadOperation(format!(
                    "{op} is not valid in admin state {current}"
                )));
            }
        };
        Ok(next)
    }

    fn start_node(&mut self, model: &mut Model, req: &AdminRequest) -> AmfResult<Vec<AdminAction>> {
        let node = &model.nodes[&req.dn];
        let next = Self::check_transition(node.admin_state, req.op)?;
        let mut actions = Vec::new();
        match req.op {
            AdminOpId::Lock | AdminOpId::Shutdown => {
                model.node_set_admin_state(&req.dn, next)?;
                for su in model.sus_on_node(&req.dn) {
                    if !model.assignments_of_su(&su).is_empty() {
                        for order in engine::su_admin_down(model, &su, Some(&req.dn))? {
                            actions.push(AdminAction::Assignment(order));
                        }
                    }
                }
            }
            AdminOpId::Unlock => {
                model.node_set_admin_state(&req.dn, next)?;
                for su in model.sus_on_node(&req.dn) {
                    if model.sus[&su].is_in_service() {
                        match engine::su_insvc(model, &su) {
                            Ok(orders) => {
                                actions.extend(orders.into_iter().map(AdminAction::Assignment))
                            }
                            Err(AmfError::TryAgain(_)) => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
            AdminOpId::LockInstantiation => {
                model.node_set_admin_state(&req.dn, next)?;
                for su in model.sus_on_node(&req.dn) {
                    let terminate = {
                        let s = &model.sus[&su];
                        s.preinstantiable && s.presence_state == PresenceState::Instantiated
                    };
                    if terminate {
                        model.sus.get_mut(&su).unwrap().term_state = true;
                        actions.push(AdminAction::TerminateSu(su));
                    }
                }
            }
            AdminOpId::UnlockInstantiation => {
                model.node_set_admin_state(&req.dn, next)?;
                for su in model.sus_on_node(&req.dn) {
                    if model.sus[&su].preinstantiable {
                        actions.push(AdminAction::InstantiateSu(su));
                    }
                }
            }
            other => {
                return Err(AmfError::BadOperation(format!(
                    "{other} is not valid on a node"
                )));
            }
        }
        if !actions.is_empty() {
            model.nodes.get_mut(&req.dn).unwrap().admin_pending = Some(req.invocation);
        }
        Ok(actions)
    }

    fn start_node_group(
        &mut self,
        model: &mut Model,
        req: &AdminRequest,
    ) -> AmfResult<Vec<AdminAction>> {
        let group = &model.node_groups[&req.dn];
        let next = Self::check_transition(group.admin_state, req.op)?;
        let members = group.nodes.clone();
        model.nodegroup_set_admin_state(&req.dn, next)?;
        {
            let g = model.node_groups.get_mut(&req.dn).unwrap();
            g.oper_list = members.clone();
        }
        let mut actions = Vec::new();
        // Walk member nodes in configured order; each contributes the same
        // secondary effects a direct node operation would.
        for node in &members {
            let sub = AdminRequest {
                invocation: req.invocation,
                dn: node.clone(),
                op: req.op,
                params: Vec::new(),
            };
            match req.op {
                AdminOpId::Lock
                | AdminOpId::Shutdown
                | AdminOpId::Unlock
                | AdminOpId::LockInstantiation
                | AdminOpId::UnlockInstantiation => {
                    actions.extend(self.start_node(model, &sub)?);
                }
                other => {
                    return Err(AmfError::BadOperation(format!(
                        "{other} is not valid on a node group"
                    )));
                }
            }
        }
        if !actions.is_empty() {
            model.node_groups.get_mut(&req.dn).unwrap().admin_pending = Some(req.invocation);
        } else {
            model.node_groups.get_mut(&req.dn).unwrap().oper_list.clear();
        }
        Ok(actions)
    }

    fn start_sg(&mut self, model: &mut Model, req: &AdminRequest) -> AmfResult<Vec<AdminAction>> {
        let sg = &model.sgs[&req.dn];
        if !sg.is_stable() {
            return Err(AmfError::TryAgain(format!("SG '{}' is not stable", req.dn)));
        }
        let next = Self::check_transition(sg.admin_state, req.op)?;
        let mut actions = Vec::new();
        match req.op {
            AdminOpId::Lock | AdminOpId::Shutdown => {
                model.sg_set_admin_state(&req.dn, next)?;
                actions.extend(
                    engine::sg_admin_down(model, &req.dn)?
                        .into_iter()
                        .map(AdminAction::Assignment),
                );
            }
            AdminOpId::Unlock => {
                model.sg_set_admin_state(&req.dn, next)?;
                for si in model.sis_of_sg(&req.dn) {
                    match engine::si_new(model, &si) {
                        Ok(orders) => {
                            actions.extend(orders.into_iter().map(AdminAction::Assignment))
                        }
                        Err(AmfError::TryAgain(_)) => break,
                        Err(e) => return Err(e),
                    }
                }
            }
            other => {
                return Err(AmfError::BadOperation(format!(
                    "{other} is not valid on an SG"
                )));
            }
        }
        if !actions.is_empty() {
            model.sgs.get_mut(&req.dn).unwrap().admin_pending = Some(req.invocation);
        }
        Ok(actions)
    }

    fn start_su(&mut self, model: &mut Model, req: &AdminRequest) -> AmfResult<Vec<AdminAction>> {
        let su = &model.sus[&req.dn];
        let next = Self::check_transition(su.admin_state, req.op)?;
        let mut actions = Vec::new();
        match req.op {
            AdminOpId::Lock | AdminOpId::Shutdown => {
                model.su_set_admin_state(&req.dn, next)?;
                actions.extend(
                    engine::su_admin_down(model, &req.dn, None)?
                        .into_iter()
                        .map(AdminAction::Assignment),
                );
            }
            AdminOpId::Unlock => {
                model.su_set_admin_state(&req.dn, next)?;
                if model.sus[&req.dn].is_in_service() {
                    actions.extend(
                        engine::su_insvc(model, &req.dn)?
                            .into_iter()
                            .map(AdminAction::Assignment),
                    );
                }
            }
            AdminOpId::LockInstantiation => {
                model.su_set_admin_state(&req.dn, next)?;
                if model.sus[&req.dn].presence_state == PresenceState::Instantiated {
                    model.sus.get_mut(&req.dn).unwrap().term_state = true;
                    actions.push(AdminAction::TerminateSu(req.dn.clone()));
                }
            }
            AdminOpId::UnlockInstantiation => {
                model.su_set_admin_state(&req.dn, next)?;
                if model.sus[&req.dn].preinstantiable {
                    actions.push(AdminAction::InstantiateSu(req.dn.clone()));
                }
            }
            other => {
                return Err(AmfError::BadOperation(format!(
                    "{other} is not valid on an SU"
                )));
            }
        }
        if !actions.is_empty() {
            model.sus.get_mut(&req.dn).unwrap().admin_pending = Some(req.invocation);
        }
        Ok(actions)
    }

    fn start_si(&mut self, model: &mut Model, req: &AdminRequest) -> AmfResult<Vec<AdminAction>> {
        let si = &model.sis[&req.dn];
        let mut actions = Vec::new();
        match req.op {
            AdminOpId::Lock | AdminOpId::Shutdown => {
                let next = Self::check_transition(si.admin_state, req.op)?;
                model.si_set_admin_state(&req.dn, next)?;
                actions.extend(
                    engine::si_admin_down(model, &req.dn)?
                        .into_iter()
                        .map(AdminAction::Assignment),
                );
            }
            AdminOpId::Unlock => {
                let next = Self::check_transition(si.admin_state, req.op)?;
                model.si_set_admin_state(&req.dn, next)?;
                actions.extend(
                    engine::si_new(model, &req.dn)?
                        .into_iter()
                        .map(AdminAction::Assignment),
                );
            }
            AdminOpId::SiSwap => {
                let sg = &model.sgs[&si.sg];
                if sg.redundancy_model
                    != crate::core::model::states::RedundancyModel::TwoN
                {
                    return Err(AmfError::BadOperation(
                        "SI-SWAP is only valid in a 2N service group".to_string(),
                    ));
                }
                actions.extend(
                    engine::swap(model, &req.dn)?
                        .into_iter()
                        .map(AdminAction::Assignment),
                );
            }
            other => {
                return Err(AmfError::BadOperation(format!(
                    "{other} is not valid on an SI"
                )));
            }
        }
        if !actions.is_empty() {
            model.sis.get_mut(&req.dn).unwrap().admin_pending = Some(req.invocation);
        }
        Ok(actions)
    }

    fn start_comp(&mut self, model: &mut Model, req: &AdminRequest) -> AmfResult<Vec<AdminAction>> {
        match req.op {
            AdminOpId::Restart => {
                let comp = &model.comps[&req.dn];
                // Restarting middleware components would take the
                // infrastructure down with them; refused uniformly across
                // redundancy models.
                if model.sus[&comp.su].middleware {
                    return Err(AmfError::BadOperation(format!(
                        "RESTART refused on middleware component '{}'",
                        req.dn
                    )));
                }
                if comp.disable_restart {
                    return Err(AmfError::BadOperation(format!(
                        "component '{}' has restart disabled",
                        req.dn
                    )));
                }
                Ok(vec![AdminAction::RestartComp(req.dn.clone())])
            }
            other => Err(AmfError::BadOperation(format!(
                "{other} is not valid on a component"
            ))),
        }
    }

    /// Records one acknowledgement. Returns the invocation id when that
    /// task just completed.
    pub fn note_ack(
        &mut self,
        model: &mut Model,
        alarms: &AlarmService,
        key: PendingKey,
        ok: bool,
    ) -> Option<u64> {
        let invocation = self.pending.remove(&key)?;
        let task = self.tasks.get_mut(&invocation)?;
        task.outstanding = task.outstanding.saturating_sub(1);
        if !ok {
            task.failures += 1;
        }
        if task.outstanding > 0 {
            return None;
        }
        let task = self.tasks.remove(&invocation).unwrap();
        let dn = task.dn.clone();
        self.clear_pending_marker(model, &dn);
        if task.failures == 0 {
            info!(invocation, dn = %dn, op = %task.op, "admin operation complete");
            if let Some(reply) = task.reply {
                let _ = reply.send(Ok(()));
            }
        } else {
            warn!(invocation, dn = %dn, failures = task.failures, "admin operation partially failed");
            self.maybe_auto_repair(model, alarms, &dn);
            if let Some(reply) = task.reply {
                let _ = reply.send(Err(AmfError::RepairPending(format!(
                    "{} secondary effects failed on '{dn}'",
                    task.failures
                ))));
            }
        }
        Some(invocation)
    }

    /// Operation budget exceeded: fail the task.
    pub fn note_timeout(&mut self, model: &mut Model, invocation: u64) {
        if let Some(task) = self.tasks.remove(&invocation) {
            warn!(invocation, dn = %task.dn, op = %task.op, "admin operation timed out");
            self.pending.retain(|_, inv| *inv != invocation);
            self.clear_pending_marker(model, &task.dn);
            if let Some(reply) = task.reply {
                let _ = reply.send(Err(AmfError::Timeout(format!(
                    "admin operation on '{}'",
                    task.dn
                ))));
            }
        }
    }

    fn clear_pending_marker(&self, model: &mut Model, dn: &Dn) {
        if let Some(n) = model.nodes.get_mut(dn) {
            n.admin_pending = None;
        }
        let members = match model.node_groups.get_mut(dn) {
            Some(g) => {
                g.admin_pending = None;
                g.oper_list.clear();
                g.nodes.clone()
            }
            None => Vec::new(),
        };
        for member in members {
            if let Some(n) = model.nodes.get_mut(&member) {
                n.admin_pending = None;
            }
        }
        if let Some(s) = model.sgs.get_mut(dn) {
            s.admin_pending = None;
        }
        if let Some(s) = model.sus.get_mut(dn) {
            s.admin_pending = None;
            s.term_state = false;
        }
        if let Some(s) = model.sis.get_mut(dn) {
            s.admin_pending = None;
        }
    }

    /// Auto-repair after partial failure: a node target with auto-repair on
    /// both the node and every hosted SG gets a reboot order.
    fn maybe_auto_repair(&self, model: &Model, alarms: &AlarmService, dn: &Dn) {
        let Some(node) = model.nodes.get(dn) else { return };
        if !node.auto_repair {
            return;
        }
        let sgs_ok = model
            .sus_on_node(dn)
            .iter()
            .all(|su| model.sgs[&model.sus[su].sg].auto_repair);
        if sgs_ok {
            alarms.emit(Alarm::NodeRebootOrdered(dn.clone()));
        }
    }

    /// Marks one extra expected acknowledgement for an already-started
    /// task (follow-up orders issued by the engine mid-operation).
    pub fn extend_task(&mut self, invocation: u64, actions: &[AdminAction]) {
        if let Some(task) = self.tasks.get_mut(&invocation) {
            task.outstanding += actions.len() as u32;
            for action in actions {
                self.pending.insert(action.pending_key(), invocation);
            }
        }
    }

    /// The invocation expecting an ack under `key`, if any.
    pub fn pending_invocation(&self, key: &PendingKey) -> Option<u64> {
        self.pending.get(key).copied()
    }

    pub fn node_group_progress(&self, model: &mut Model, node: &Dn) {
        // Pop the node from any group oper list as its effects complete.
        for g in model.node_groups.values_mut() {
            g.oper_list.retain(|n| n != node);
        }
    }
}

/// CHANGE-FILTER targets a log stream and is handled by the log service;
/// everything else routes through [`AdminEngine`]. SG FSM note: operations
/// reaching the engine from here already verified STABLE entry.
pub fn is_change_filter(op: AdminOpId) -> bool {
    op == AdminOpId::ChangeFilter
}

/// Convenience used by tests: whether an SG is mid-operation.
pub fn sg_busy(model: &Model, sg: &Dn) -> bool {
    model
        .sgs
        .get(sg)
        .map(|s| s.fsm_state != SgFsmState::Stable)
        .unwrap_or(false)
}
