// src/server/director.rs

//! The director task: sole owner of the entity model.
//!
//! Every stimulus arrives as an [`Event`] and is processed to completion
//! before the next one is dequeued. The only suspension points are the
//! deadline-bounded sync sends toward node directors.

use crate::config::{CompGlobalConfig, Config, HaRole};
use crate::core::alarm::{Alarm, AlarmService};
use crate::core::admin::{AdminAction, AdminEngine, AdminOpId, AdminRequest, PendingKey};
use crate::core::avnd::msg::{AvdToAvnd, AvndToAvd};
use crate::core::avnd::{avd_dest, node_dest};
use crate::core::bus::{codec, BusEnvelope, MessageBus, SVC_AVND, VDest};
use crate::core::engine::{self, AssignmentOrder};
use crate::core::errors::{AmfError, AmfResult};
use crate::core::events::{Event, EventQueue, TimerEvent};
use crate::core::imm::ccb::{self, CcbOp};
use crate::core::imm::handlers::CcbApplied;
use crate::core::imm::store::ObjectStore;
use crate::core::imm::{self, OiHandle};
use crate::core::logstream::LogStreamService;
use crate::core::model::dn::Dn;
use crate::core::model::states::{
    AdminState, HaState, NodeState, OperState, PresenceState, ProxyStatus, ReadinessState,
    Recovery,
};
use crate::core::model::{Model, ModelEffect, ReadinessChange};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

pub struct Director {
    config: Config,
    role: HaRole,
    model: Model,
    admin: AdminEngine,
    logsvc: LogStreamService,
    oi: OiHandle,
    store: Arc<ObjectStore>,
    globals: CompGlobalConfig,
    bus: Arc<dyn MessageBus>,
    my_dest: VDest,
    alarms: AlarmService,
    events: EventQueue,
    event_rx: mpsc::Receiver<Event>,
    ckpt_tx: mpsc::UnboundedSender<crate::core::ckpt::records::CkptRecord>,
    role_tx: broadcast::Sender<HaRole>,
    /// SIs with an armed dependency-tolerance timer.
    dep_timers: HashSet<Dn>,
    /// Component restarts per SU inside the current probation window.
    comp_restart_window: HashMap<Dn, u32>,
    /// SU restarts inside the current probation window.
    su_restart_window: HashMap<Dn, u32>,
    /// SUs with a terminate-then-instantiate restart in flight.
    su_restarting: HashSet<Dn>,
}

impl Director {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        store: Arc<ObjectStore>,
        bus: Arc<dyn MessageBus>,
        alarms: AlarmService,
        events: EventQueue,
        event_rx: mpsc::Receiver<Event>,
        ckpt_tx: mpsc::UnboundedSender<crate::core::ckpt::records::CkptRecord>,
        role_tx: broadcast::Sender<HaRole>,
    ) -> Self {
        let oi = OiHandle::new(format!("safAmfService-{}", config.node_name), store.clone());
        let logsvc = LogStreamService::new(config.log_root_directory.clone());
        let globals = config.comp_globals.clone();
        let role = config.role;
        Self {
            config,
            role,
            model: Model::new(),
            admin: AdminEngine::new(),
            logsvc,
            oi,
            store,
            globals,
            bus,
            my_dest: avd_dest(),
            alarms,
            events,
            event_rx,
            ckpt_tx,
            role_tx,
            dep_timers: HashSet::new(),
            comp_restart_window: HashMap::new(),
            su_restart_window: HashMap::new(),
            su_restarting: HashSet::new(),
        }
    }

    /// Boot: claim the store role, load the configuration, then serve the
    /// event queue until shutdown.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        if let Err(e) = self.startup().await {
            error!(error = %e, "director startup failed");
            return;
        }
        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event).await;
                    self.drain_effects();
                }
                _ = shutdown_rx.recv() => {
                    info!("director shutting down");
                    return;
                }
            }
        }
    }

    async fn startup(&mut self) -> AmfResult<()> {
        match self.role {
            HaRole::Active => {
                self.oi.become_implementer().await?;
                let effects =
                    imm::loader::initial_load(&mut self.model, &self.store, &self.globals)?;
                self.drain_effects();
                self.apply_ccb_effects(effects).await;
                self.drain_effects();
                info!(role = %"ACTIVE", "director ready");
            }
            HaRole::Standby => {
                self.oi.become_applier();
                self.model.set_replica_mode(true);
                info!(role = %"STANDBY", "director ready; awaiting cold sync");
            }
        }
        Ok(())
    }

    /// Forward model side effects to the replicator, the store, and the
    /// alarm service.
    fn drain_effects(&mut self) {
        for effect in self.model.take_effects() {
            match effect {
                ModelEffect::Ckpt(rec) => {
                    let _ = self.ckpt_tx.send(rec);
                }
                ModelEffect::RuntimeUpdate { dn, attr, value } => {
                    self.store.runtime_update(&dn, &attr, &value);
                }
                ModelEffect::Alarm(alarm) => self.alarms.emit(alarm),
            }
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Ccb { ccb_id, ops, reply } => {
                let result = self.handle_ccb(ccb_id, ops).await;
                let _ = reply.send(result);
            }
            Event::RuntimeRead { dn, attr, reply } => {
                let _ = reply.send(imm::runtime_read(&self.model, &dn, &attr));
            }
            Event::AdminOp { req, reply } => {
                self.handle_admin(req, reply).await;
            }
            Event::Avnd(msg) => self.handle_avnd(msg).await,
            Event::Timer(t) => self.handle_timer(t).await,
            Event::CkptSnapshot { reply } => {
                let mut records = self.model.cold_sync_records();
                records.push(crate::core::ckpt::records::CkptRecord::UsageStats {
                    nodes_present: self
                        .model
                        .nodes
                        .values()
                        .filter(|n| n.node_state == NodeState::Present)
                        .count() as u32,
                    sis_assigned: self
                        .model
                        .sis
                        .values()
                        .filter(|s| s.is_assigned())
                        .count() as u32,
                    sis_total: self.model.sis.len() as u32,
                });
                let _ = reply.send(records);
            }
            Event::CkptApply { records } => {
                for rec in records {
                    if let Err(e) = self.model.apply_record(rec) {
                        warn!(error = %e, "standby failed to apply checkpoint record");
                    }
                }
            }
            Event::CkptReset => {
                info!("standby model reset for resync");
                self.model.clear();
            }
            Event::RoleChange(role) => self.handle_role_change(role).await,
            Event::LogWrite {
                stream,
                severity,
                record,
                reply,
            } => {
                let _ = reply.send(self.logsvc.write(&stream, severity, &record));
            }
            Event::ModelInspect { reply } => {
                let _ = reply.send(self.model.snapshot());
            }
            Event::Shutdown => {
                // Handled by the caller through the shutdown broadcast.
            }
        }
    }

    // --- CCB path ---------------------------------------------------------

    async fn handle_ccb(&mut self, ccb_id: u64, ops: Vec<CcbOp>) -> AmfResult<()> {
        if self.role != HaRole::Active {
            return Err(AmfError::TryAgain("standby does not accept CCBs".to_string()));
        }
        ccb::ccb_completed(ccb_id, &self.model, &self.store, &self.globals, &ops)?;
        let effects = ccb::ccb_apply(ccb_id, &mut self.model, &self.store, &self.globals, ops)?;
        self.drain_effects();
        self.apply_ccb_effects(effects).await;
        Ok(())
    }

    async fn apply_ccb_effects(&mut self, effects: Vec<CcbApplied>) {
        for effect in effects {
            match effect {
                CcbApplied::NodeAdded(node) => {
                    // The node joins as absent; it goes present when its
                    // node director reports in.
                    let _ = self.model.node_set_node_state(&node, NodeState::NoConfig);
                }
                CcbApplied::SiAdded(si) | CcbApplied::SiPrefChanged(si) => {
                    match engine::si_new(&mut self.model, &si) {
                        Ok(orders) => self.dispatch_assignments(orders).await,
                        Err(AmfError::TryAgain(r)) => debug!(%si, reason = %r, "SI placement deferred"),
                        Err(e) => warn!(%si, error = %e, "SI placement failed"),
                    }
                }
                CcbApplied::SuAdded(su) => {
                    // Configuration exists; the lifecycle starts when the
                    // hosting node shows up (or right away if it already did).
                    self.push_su_config(&su).await;
                    let node = self.model.sus[&su].node.clone();
                    if self.model.nodes[&node].node_state == NodeState::Present {
                        self.try_instantiate_su(&su).await;
                    }
                }
                CcbApplied::CompAdded(comp) => {
                    let su = self.model.comps[&comp].su.clone();
                    self.push_su_config(&su).await;
                }
                CcbApplied::SgAdded(_) => {}
                CcbApplied::SiDeleted(_) | CcbApplied::SuDeleted(_) => {}
                CcbApplied::LogRootChanged(root) => {
                    if let Err(e) = self.logsvc.change_root(&root) {
                        error!(error = %e, "log root change failed");
                    }
                }
                CcbApplied::LogStreamUpsert(cfg) => {
                    let name = cfg.name.clone();
                    if let Err(e) = self.logsvc.open(cfg) {
                        error!(stream = %name, error = %e, "stream open failed");
                    } else {
                        self.send_ckpt(crate::core::ckpt::records::CkptRecord::LogStreamOpen {
                            name,
                        });
                    }
                }
                CcbApplied::LogStreamDeleted(name) => {
                    let _ = self.logsvc.close(&name);
                    self.send_ckpt(crate::core::ckpt::records::CkptRecord::LogStreamClose {
                        name,
                    });
                }
                CcbApplied::GlobalsChanged(globals) => {
                    self.globals = globals;
                }
            }
        }
    }

    fn send_ckpt(&self, rec: crate::core::ckpt::records::CkptRecord) {
        if self.role == HaRole::Active {
            let _ = self.ckpt_tx.send(rec);
        }
    }

    // --- admin path -------------------------------------------------------

    async fn handle_admin(
        &mut self,
        req: AdminRequest,
        reply: tokio::sync::oneshot::Sender<AmfResult<()>>,
    ) {
        if self.role != HaRole::Active {
            let _ = reply.send(Err(AmfError::TryAgain(
                "standby does not accept admin operations".to_string(),
            )));
            return;
        }
        // CHANGE-FILTER belongs to the log service.
        if req.op == AdminOpId::ChangeFilter {
            let filter = req
                .params
                .iter()
                .find(|(k, _)| k == "saLogStreamSeverityFilter")
                .and_then(|(_, v)| v.parse().ok())
                .unwrap_or(0x7f);
            let _ = reply.send(self.logsvc.change_filter(req.dn.as_str(), filter));
            return;
        }
        let invocation = req.invocation;
        let timeout = self.config.admin_op_timeout;
        let actions = self.admin.start(&mut self.model, req, reply);
        if !actions.is_empty() {
            self.events
                .arm_timer(timeout, TimerEvent::AdminOpTimeout { invocation });
            self.dispatch_admin_actions(actions).await;
        }
        self.drain_effects();
    }

    async fn dispatch_admin_actions(&mut self, actions: Vec<AdminAction>) {
        for action in actions {
            match action {
                AdminAction::Assignment(order) => {
                    self.run_assignment(order).await;
                }
                AdminAction::TerminateSu(su) => {
                    let node = self.model.sus[&su].node.clone();
                    self.send_to_node(&node, AvdToAvnd::TerminateSu { su }).await;
                }
                AdminAction::InstantiateSu(su) => {
                    let node = self.model.sus[&su].node.clone();
                    self.send_to_node(&node, AvdToAvnd::InstantiateSu { su }).await;
                }
                AdminAction::RestartComp(comp) => {
                    let su = self.model.comps[&comp].su.clone();
                    let node = self.model.sus[&su].node.clone();
                    self.send_to_node(&node, AvdToAvnd::RestartComp { comp }).await;
                }
            }
        }
    }

    // --- assignment dispatch ---------------------------------------------

    /// Sends queued assignment orders one at a time. Each send is a
    /// deadline-bounded sync call; the ack (or its failure) feeds the
    /// engine, whose follow-up orders join the queue.
    async fn dispatch_assignments(&mut self, orders: Vec<AssignmentOrder>) {
        let mut queue: VecDeque<AssignmentOrder> = orders.into();
        while let Some(order) = queue.pop_front() {
            let followups = self.run_assignment_inner(order).await;
            queue.extend(followups);
        }
        self.scan_dependency_risk();
    }

    async fn run_assignment(&mut self, order: AssignmentOrder) {
        let followups = self.run_assignment_inner(order).await;
        if !followups.is_empty() {
            Box::pin(self.dispatch_assignments(followups)).await;
        }
    }

    async fn run_assignment_inner(&mut self, order: AssignmentOrder) -> Vec<AssignmentOrder> {
        let node = match self.model.sus.get(&order.su) {
            Some(su) => su.node.clone(),
            None => return Vec::new(),
        };
        let msg = AvdToAvnd::SuAssign {
            su: order.su.clone(),
            si: order.si.clone(),
            ha: order.ha,
            op: order.op,
        };
        // A graceful quiesce gets the components' quiescing-complete budget
        // instead of the plain send deadline.
        let deadline = if matches!(order.ha, HaState::Quiescing | HaState::Quiesced)
            && order.op == engine::AssignOp::Modify
        {
            self.quiescing_budget(&order.su)
        } else {
            self.config.sync_send_timeout
        };
        let ok = match codec::encode(&msg) {
            Ok(payload) => {
                match self
                    .bus
                    .sync_send(
                        &self.my_dest,
                        &node_dest(&node),
                        SVC_AVND,
                        payload,
                        deadline,
                    )
                    .await
                {
                    Ok(reply) => match codec::decode::<AvndToAvd>(&reply) {
                        Ok(AvndToAvd::SuAssignResult { ok, .. }) => ok,
                        _ => false,
                    },
                    Err(e) => {
                        warn!(su = %order.su, si = %order.si, error = %e, "assignment send failed");
                        false
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "assignment encode failed");
                false
            }
        };

        let key = PendingKey::Edge(order.su.clone(), order.si.clone());
        let invocation = self.admin.pending_invocation(&key);
        let followups =
            match engine::assign_done(&mut self.model, &order.su, &order.si, order.op, ok) {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, "assignment completion failed");
                    Vec::new()
                }
            };
        self.drain_effects();
        self.admin
            .note_ack(&mut self.model, &self.alarms, key, ok);
        if let Some(inv) = invocation {
            let as_actions: Vec<AdminAction> = followups
                .iter()
                .cloned()
                .map(AdminAction::Assignment)
                .collect();
            self.admin.extend_task(inv, &as_actions);
        }
        followups
    }

    /// The largest quiescing-complete timeout among the SU's components,
    /// floored at the plain send deadline.
    fn quiescing_budget(&self, su: &Dn) -> std::time::Duration {
        self.model
            .comps
            .values()
            .filter(|c| &c.su == su)
            .map(|c| c.quiescing_complete_timeout)
            .max()
            .unwrap_or(self.config.sync_send_timeout)
            .max(self.config.sync_send_timeout)
    }

    async fn send_to_node(&self, node: &Dn, msg: AvdToAvnd) {
        let Ok(payload) = codec::encode(&msg) else { return };
        if let Err(e) = self
            .bus
            .async_send(&self.my_dest, &node_dest(node), SVC_AVND, payload)
            .await
        {
            warn!(%node, error = %e, "send to node director failed");
        }
    }

    /// Pushes the configuration of every component of one SU to its node.
    async fn push_su_config(&mut self, su: &Dn) {
        let node = match self.model.sus.get(su) {
            Some(s) => s.node.clone(),
            None => return,
        };
        for comp in self.model.comps_of_su(su) {
            let config = self.model.comps[&comp].clone();
            self.send_to_node(&node, AvdToAvnd::CompConfig(Box::new(config)))
                .await;
        }
    }

    async fn try_instantiate_su(&mut self, su: &Dn) {
        let instantiate = {
            let s = &self.model.sus[su];
            s.preinstantiable
                && s.presence_state == PresenceState::Uninstantiated
                && s.admin_state != AdminState::LockedInstantiation
        };
        if instantiate {
            let node = self.model.sus[su].node.clone();
            self.send_to_node(&node, AvdToAvnd::InstantiateSu { su: su.clone() })
                .await;
        }
    }

    // --- node director messages ------------------------------------------

    async fn handle_avnd(&mut self, msg: AvndToAvd) {
        match msg {
            AvndToAvd::NodeUp { node } => self.node_up(node).await,
            AvndToAvd::SuInstantiated { su, ok, .. } => {
                let changes = if ok {
                    let _ = self
                        .model
                        .su_set_presence_state(&su, PresenceState::Instantiated);
                    self.model
                        .su_set_oper_state(&su, OperState::Enabled)
                        .unwrap_or_default()
                } else {
                    Vec::new()
                };
                if self.su_restarting.remove(&su) {
                    if ok {
                        let _ = self.model.su_inc_restart_count(&su);
                        if let Some(s) = self.model.sus.get_mut(&su) {
                            s.surestart = false;
                        }
                        info!(%su, "service unit restart complete");
                    } else {
                        if let Some(s) = self.model.sus.get_mut(&su) {
                            s.surestart = false;
                        }
                        self.su_faulted(&su).await;
                    }
                }
                self.admin
                    .note_ack(&mut self.model, &self.alarms, PendingKey::Su(su.clone()), ok);
                self.react_readiness(changes).await;
            }
            AvndToAvd::SuTerminated { su, ok, .. } => {
                let node = self.model.sus.get(&su).map(|s| s.node.clone());
                // An in-flight SU restart continues with re-instantiation.
                if self.su_restarting.contains(&su) {
                    if ok {
                        if let Some(node) = &node {
                            self.send_to_node(node, AvdToAvnd::InstantiateSu { su: su.clone() })
                                .await;
                        }
                    } else {
                        self.su_restarting.remove(&su);
                        if let Some(s) = self.model.sus.get_mut(&su) {
                            s.surestart = false;
                        }
                        self.su_faulted(&su).await;
                    }
                    return;
                }
                self.admin
                    .note_ack(&mut self.model, &self.alarms, PendingKey::Su(su.clone()), ok);
                if let Some(node) = node {
                    self.admin.node_group_progress(&mut self.model, &node);
                }
            }
            AvndToAvd::SuPresence { su, state, .. } => {
                let _ = self.model.su_set_presence_state(&su, state);
            }
            AvndToAvd::CompPresence { node, comp, state } => {
                self.comp_presence(node, comp, state).await;
            }
            AvndToAvd::CompOperState { comp, state, .. } => {
                let _ = self.model.comp_set_oper_state(&comp, state);
            }
            AvndToAvd::SuAssignResult { su, si, op, ok, .. } => {
                // Late result after a sync-send deadline: the engine hears
                // about it here instead.
                let key = PendingKey::Edge(su.clone(), si.clone());
                match engine::assign_done(&mut self.model, &su, &si, op, ok) {
                    Ok(followups) => {
                        self.admin.note_ack(&mut self.model, &self.alarms, key, ok);
                        self.dispatch_assignments(followups).await;
                    }
                    Err(e) => debug!(error = %e, "stale assignment result"),
                }
            }
            AvndToAvd::CompRestarted { comp, ok, .. } => {
                if ok {
                    let _ = self.model.comp_inc_restart_count(&comp);
                }
                self.admin.note_ack(
                    &mut self.model,
                    &self.alarms,
                    PendingKey::Comp(comp),
                    ok,
                );
            }
            AvndToAvd::ErrorReport { node, comp, recovery } => {
                self.apply_recovery(node, comp, recovery).await;
            }
            AvndToAvd::ProxyRegistered { proxy, proxied, .. } => {
                debug!(%proxy, %proxied, "proxy registered");
                let _ = self
                    .model
                    .comp_set_proxy(&proxied, ProxyStatus::Proxied, Some(proxy));
            }
            AvndToAvd::CompOrphaned { comp, .. } => {
                self.alarms.emit(Alarm::CompOrphaned(comp.clone()));
                let _ = self
                    .model
                    .comp_set_proxy(&comp, ProxyStatus::Unproxied, None);
            }
        }
    }

    async fn node_up(&mut self, node: Dn) {
        if !self.model.nodes.contains_key(&node) {
            warn!(%node, "unknown node reported in");
            return;
        }
        info!(%node, "node director up");
        let _ = self.model.node_set_node_state(&node, NodeState::Present);
        let changes = self
            .model
            .node_set_oper_state(&node, OperState::Enabled)
            .unwrap_or_default();
        for su in self.model.sus_on_node(&node) {
            self.push_su_config(&su).await;
            self.try_instantiate_su(&su).await;
        }
        self.react_readiness(changes).await;
    }

    async fn comp_presence(&mut self, node: Dn, comp: Dn, state: PresenceState) {
        if self.model.comp_set_presence_state(&comp, state).is_err() {
            return;
        }
        match state {
            PresenceState::InstantiationFailed => {
                self.alarms.emit(Alarm::CompInstantiationFailed(comp.clone()));
                let _ = self.model.comp_set_oper_state(&comp, OperState::Disabled);
                self.maybe_failfast(&node, true).await;
                let su = self.model.comps[&comp].su.clone();
                self.su_faulted(&su).await;
            }
            PresenceState::TerminationFailed => {
                self.alarms.emit(Alarm::CompTerminationFailed(comp.clone()));
                self.maybe_failfast(&node, false).await;
            }
            _ => {}
        }
    }

    /// Node failfast: configured flag plus auto-repair on the node and on
    /// every SG hosted there.
    async fn maybe_failfast(&mut self, node: &Dn, instantiation: bool) {
        let Some(n) = self.model.nodes.get(node) else { return };
        let flagged = if instantiation {
            n.failfast_on_instantiation_failure
        } else {
            n.failfast_on_termination_failure
        };
        if !flagged || !n.auto_repair {
            return;
        }
        let sgs_ok = self
            .model
            .sus_on_node(node)
            .iter()
            .all(|su| self.model.sgs[&self.model.sus[su].sg].auto_repair);
        if sgs_ok {
            self.alarms.emit(Alarm::NodeRebootOrdered(node.clone()));
            self.send_to_node(node, AvdToAvnd::Reboot).await;
        }
    }

    async fn su_faulted(&mut self, su: &Dn) {
        match engine::su_fault(&mut self.model, su) {
            Ok(orders) => self.dispatch_assignments(orders).await,
            Err(AmfError::TryAgain(r)) => debug!(%su, reason = %r, "fault handling deferred"),
            Err(e) => warn!(%su, error = %e, "fault handling failed"),
        }
        self.drain_effects();
    }

    async fn apply_recovery(&mut self, node: Dn, comp: Dn, recovery: Recovery) {
        if !self.model.comps.contains_key(&comp) {
            warn!(%comp, "error report for unknown component dropped");
            return;
        }
        let recovery = recovery.normalized();
        info!(%comp, %recovery, "error report");
        match recovery {
            Recovery::ComponentRestart => {
                let restart_ok = self
                    .model
                    .comps
                    .get(&comp)
                    .map(|c| !c.disable_restart)
                    .unwrap_or(false);
                if restart_ok && !self.comp_restart_exhausted(&comp) {
                    self.send_to_node(&node, AvdToAvnd::RestartComp { comp }).await;
                } else {
                    // Component-restart tier exhausted: move up the ladder.
                    let su = self.model.comps[&comp].su.clone();
                    self.escalate_su_recovery(&su).await;
                }
            }
            Recovery::ComponentFailover => {
                let su = self.model.comps[&comp].su.clone();
                self.su_faulted(&su).await;
            }
            Recovery::NodeSwitchover | Recovery::NodeFailover => {
                self.node_failover(&node).await;
            }
            Recovery::NodeFailfast => {
                self.alarms.emit(Alarm::NodeRebootOrdered(node.clone()));
                self.send_to_node(&node, AvdToAvnd::Reboot).await;
                self.node_failover(&node).await;
            }
            Recovery::ClusterReset => {
                self.alarms.emit(Alarm::ClusterResetOrdered);
            }
            Recovery::NoRecommendation => unreachable!("normalized above"),
        }
    }

    /// Counts component restarts per SU inside the SG's probation window;
    /// exceeding the maximum hands the error to the SU-restart tier.
    fn comp_restart_exhausted(&mut self, comp: &Dn) -> bool {
        let Some(c) = self.model.comps.get(comp) else { return false };
        let su = c.su.clone();
        let sg = &self.model.sgs[&self.model.sus[&su].sg];
        if sg.comp_restart_max == 0 {
            return false;
        }
        let (max, probation) = (sg.comp_restart_max, sg.comp_restart_prob);
        let count = self.comp_restart_window.entry(su.clone()).or_insert(0);
        *count += 1;
        if *count == 1 && !probation.is_zero() {
            self.events
                .arm_timer(probation, TimerEvent::CompRestartProbation { su: su.clone() });
        }
        *count > max
    }

    /// The middle rung of the escalation ladder: restart the whole SU in
    /// place while its restart budget lasts, then fail it over.
    async fn escalate_su_recovery(&mut self, su: &Dn) {
        let Some(sg) = self
            .model
            .sus
            .get(su)
            .and_then(|s| self.model.sgs.get(&s.sg))
        else {
            return;
        };
        let (max, probation) = (sg.su_restart_max, sg.su_restart_prob);
        if max > 0 && !self.su_restarting.contains(su) {
            let count = self.su_restart_window.entry(su.clone()).or_insert(0);
            *count += 1;
            let first = *count == 1;
            let within_budget = *count <= max;
            if first && !probation.is_zero() {
                self.events
                    .arm_timer(probation, TimerEvent::SuRestartProbation { su: su.clone() });
            }
            if within_budget {
                self.restart_su(su).await;
                return;
            }
        }
        self.su_faulted(su).await;
    }

    /// Terminate-then-instantiate one SU in place, keeping its assignments.
    /// The surestart marker stops the intermediate presence changes from
    /// being treated as faults.
    async fn restart_su(&mut self, su: &Dn) {
        let node = match self.model.sus.get_mut(su) {
            Some(s) => {
                s.surestart = true;
                s.node.clone()
            }
            None => return,
        };
        info!(%su, "restarting service unit in place");
        self.su_restarting.insert(su.clone());
        self.send_to_node(&node, AvdToAvnd::TerminateSu { su: su.clone() })
            .await;
    }

    async fn node_failover(&mut self, node: &Dn) {
        let changes = self
            .model
            .node_set_oper_state(node, OperState::Disabled)
            .unwrap_or_default();
        let sus = self.model.sus_on_node(node);
        for su in sus {
            self.su_faulted(&su).await;
        }
        self.react_readiness(changes).await;

        // SU-failover escalation bookkeeping on the node.
        if let Some(n) = self.model.nodes.get_mut(node) {
            n.su_failover_count += 1;
            let exceeded = n.su_failover_max > 0 && n.su_failover_count > n.su_failover_max;
            let first = n.su_failover_count == 1;
            let probation = n.su_failover_prob;
            if first && !probation.is_zero() {
                self.events.arm_timer(
                    probation,
                    TimerEvent::SuFailoverProbation { node: node.clone() },
                );
            }
            if exceeded {
                self.alarms.emit(Alarm::NodeRebootOrdered(node.clone()));
                self.send_to_node(node, AvdToAvnd::Reboot).await;
            }
        }
    }

    /// Reacts to readiness transitions: newly in-service SUs get work,
    /// SUs leaving service shed it.
    async fn react_readiness(&mut self, changes: Vec<ReadinessChange>) {
        for change in changes {
            match change.new {
                ReadinessState::InService => {
                    match engine::su_insvc(&mut self.model, &change.su) {
                        Ok(orders) => self.dispatch_assignments(orders).await,
                        Err(AmfError::TryAgain(r)) => {
                            debug!(su = %change.su, reason = %r, "in-service handling deferred")
                        }
                        Err(e) => warn!(su = %change.su, error = %e, "in-service handling failed"),
                    }
                }
                ReadinessState::OutOfService | ReadinessState::Stopping => {
                    // Admin paths issue their own quiesce orders; a
                    // spontaneous drop (node fault) goes the fault path.
                    if change.old == ReadinessState::InService
                        && self.model.sus[&change.su].admin_pending.is_none()
                    {
                        let has_admin_cause = {
                            let su = &self.model.sus[&change.su];
                            su.admin_state != AdminState::Unlocked
                                || self.model.nodes[&su.node].admin_state != AdminState::Unlocked
                        };
                        if !has_admin_cause {
                            self.su_faulted(&change.su).await;
                        }
                    }
                }
            }
        }
        self.drain_effects();
    }

    // --- dependency tolerance --------------------------------------------

    /// Arms tolerance timers for dependents whose sponsor just dropped out
    /// of full assignment.
    fn scan_dependency_risk(&mut self) {
        let sponsors: Vec<Dn> = self
            .model
            .sis
            .values()
            .filter(|s| !s.deps.is_empty())
            .flat_map(|s| s.deps.iter().map(|d| d.sponsor.clone()))
            .collect();
        for sponsor in sponsors {
            for (dependent, tolerance) in
                engine::sidep::dependents_at_risk(&self.model, &sponsor)
            {
                if self.dep_timers.insert(dependent.clone()) {
                    debug!(si = %dependent, ?tolerance, "dependency tolerance timer armed");
                    self.events
                        .arm_timer(tolerance, TimerEvent::SiDepTolerance { si: dependent });
                }
            }
        }
    }

    // --- timers -----------------------------------------------------------

    async fn handle_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::SiDepTolerance { si } => {
                self.dep_timers.remove(&si);
                if engine::sidep::still_blocked(&self.model, &si) {
                    info!(%si, "dependency tolerance expired; unassigning");
                    match engine::unassign_si(&mut self.model, &si) {
                        Ok(orders) => self.dispatch_assignments(orders).await,
                        Err(e) => debug!(%si, error = %e, "tolerance unassign deferred"),
                    }
                }
            }
            TimerEvent::AdminOpTimeout { invocation } => {
                if self.admin.has_task(invocation) {
                    self.admin.note_timeout(&mut self.model, invocation);
                }
            }
            TimerEvent::SuFailoverProbation { node } => {
                if let Some(n) = self.model.nodes.get_mut(&node) {
                    n.su_failover_count = 0;
                }
            }
            TimerEvent::SuRestartProbation { su } => {
                self.su_restart_window.remove(&su);
            }
            TimerEvent::CompRestartProbation { su } => {
                self.comp_restart_window.remove(&su);
            }
            TimerEvent::CompInstantiateDelay { .. } => {
                // Instantiation retry delays live in the node director.
            }
        }
        self.drain_effects();
    }

    // --- role changes -----------------------------------------------------

    async fn handle_role_change(&mut self, role: HaRole) {
        if role == self.role {
            return;
        }
        info!(from = ?self.role, to = ?role, "HA role change");
        self.role = role;
        match role {
            HaRole::Active => {
                self.model.set_replica_mode(false);
                if let Err(e) = self.oi.become_implementer().await {
                    error!(error = %e, "implementer claim failed after role change");
                }
            }
            HaRole::Standby => {
                self.oi.become_applier();
                self.model.set_replica_mode(true);
            }
        }
        let _ = self.role_tx.send(role);
    }
}

/// Pumps bus deliveries for the director's node-service endpoint into the
/// event queue.
pub async fn spawn_bus_pump(
    bus: Arc<dyn MessageBus>,
    events: EventQueue,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> AmfResult<()> {
    let mut rx = bus.register(SVC_AVND, avd_dest()).await?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(envelope) = rx.recv() => {
                    forward(envelope, &events).await;
                }
                _ = shutdown_rx.recv() => return,
            }
        }
    });
    Ok(())
}

async fn forward(envelope: BusEnvelope, events: &EventQueue) {
    match codec::decode::<AvndToAvd>(&envelope.payload) {
        Ok(msg) => events.post(Event::Avnd(msg)).await,
        Err(e) => warn!(error = %e, "undecodable node director message"),
    }
}
