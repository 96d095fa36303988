// src/core/avnd/mod.rs

//! The node director: per-node component registry and lifecycle driver.
//!
//! One instance runs per cluster node. It keeps the node-local component
//! database, executes CLC-CLI steps against local processes, answers
//! assignment orders, and reports every presence change back to the
//! availability director over the bus.

pub mod clc;
pub mod healthcheck;
pub mod msg;
pub mod presence;

use crate::core::bus::{codec, BusEnvelope, MessageBus, SVC_AVND, VDest};
use crate::core::errors::AmfResult;
use crate::core::model::dn::Dn;
use crate::core::model::states::{HaState, PresenceState};
use clc::{ClcOutcome, ClcStep};
use indexmap::IndexMap;
use msg::{AvdToAvnd, AvndToAvd};
use presence::{AvndComp, CompEffect};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// Virtual destination of the availability director's node-service side.
pub fn avd_dest() -> VDest {
    VDest::new("amfd-director")
}

/// Virtual destination of one node director.
pub fn node_dest(node: &Dn) -> VDest {
    VDest::new(format!("avnd-{node}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuOpKind {
    Instantiate,
    Terminate,
}

/// An in-flight SU-wide lifecycle operation, driven level by level.
struct SuOp {
    kind: SuOpKind,
    /// Levels not yet started, in execution order.
    pending_levels: Vec<Vec<Dn>>,
    /// Components of the level currently executing.
    current: Vec<Dn>,
    failed: bool,
}

pub struct NodeDirector {
    node: Dn,
    bus: Arc<dyn MessageBus>,
    my_dest: VDest,
    comps: IndexMap<Dn, AvndComp>,
    su_ops: HashMap<Dn, SuOp>,
    /// Live proxy relationships on this node: proxied component -> proxy.
    proxy_links: HashMap<Dn, Dn>,
    restart_pending: HashSet<Dn>,
    hc_stop: HashMap<Dn, watch::Sender<bool>>,
    clc_tx: mpsc::Sender<ClcOutcome>,
    clc_rx: mpsc::Receiver<ClcOutcome>,
    retry_tx: mpsc::Sender<Dn>,
    retry_rx: mpsc::Receiver<Dn>,
    bus_rx: mpsc::Receiver<BusEnvelope>,
}

const CLC_CHANNEL_CAPACITY: usize = 256;

impl NodeDirector {
    pub async fn new(node: Dn, bus: Arc<dyn MessageBus>) -> AmfResult<Self> {
        let my_dest = node_dest(&node);
        let bus_rx = bus.register(SVC_AVND, my_dest.clone()).await?;
        let (clc_tx, clc_rx) = mpsc::channel(CLC_CHANNEL_CAPACITY);
        let (retry_tx, retry_rx) = mpsc::channel(CLC_CHANNEL_CAPACITY);
        Ok(Self {
            node,
            bus,
            my_dest,
            comps: IndexMap::new(),
            su_ops: HashMap::new(),
            proxy_links: HashMap::new(),
            restart_pending: HashSet::new(),
            hc_stop: HashMap::new(),
            clc_tx,
            clc_rx,
            retry_tx,
            retry_rx,
            bus_rx,
        })
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(node = %self.node, "node director running");
        self.report(AvndToAvd::NodeUp {
            node: self.node.clone(),
        })
        .await;
        loop {
            tokio::select! {
                Some(envelope) = self.bus_rx.recv() => {
                    self.handle_order(envelope).await;
                }
                Some(outcome) = self.clc_rx.recv() => {
                    self.handle_clc(outcome).await;
                }
                Some(comp) = self.retry_rx.recv() => {
                    self.handle_retry(comp).await;
                }
                _ = shutdown_rx.recv() => {
                    info!(node = %self.node, "node director shutting down");
                    return;
                }
            }
        }
    }

    async fn report(&self, msg: AvndToAvd) {
        let Ok(payload) = codec::encode(&msg) else { return };
        if let Err(e) = self
            .bus
            .async_send(&self.my_dest, &avd_dest(), SVC_AVND, payload)
            .await
        {
            warn!(node = %self.node, error = %e, "report to director failed");
        }
    }

    async fn handle_order(&mut self, mut envelope: BusEnvelope) {
        let order: AvdToAvnd = match codec::decode(&envelope.payload) {
            Ok(o) => o,
            Err(e) => {
                warn!(node = %self.node, error = %e, "undecodable order");
                return;
            }
        };
        match order {
            AvdToAvnd::CompConfig(config) => {
                debug!(node = %self.node, comp = %config.dn, "component registered");
                let dn = config.dn.clone();
                match self.comps.get_mut(&dn) {
                    Some(existing) => existing.config = *config,
                    None => {
                        self.comps.insert(dn, AvndComp::new(*config));
                    }
                }
            }
            AvdToAvnd::CompDelete { comp } => {
                self.stop_healthcheck(&comp);
                self.proxy_links.remove(&comp);
                self.comps.shift_remove(&comp);
            }
            AvdToAvnd::InstantiateSu { su } => self.start_su_op(su, SuOpKind::Instantiate).await,
            AvdToAvnd::TerminateSu { su } => self.start_su_op(su, SuOpKind::Terminate).await,
            AvdToAvnd::SuAssign { su, si, ha, op } => {
                let ok = self.can_carry(&su, ha);
                let result = AvndToAvd::SuAssignResult {
                    node: self.node.clone(),
                    su,
                    si,
                    op,
                    ok,
                };
                // Assignment orders arrive as sync sends; the result is the
                // correlated reply.
                if let Ok(payload) = codec::encode(&result) {
                    if !envelope.respond(payload) {
                        self.report(result).await;
                    }
                }
            }
            AvdToAvnd::RestartComp { comp } => {
                self.restart_pending.insert(comp.clone());
                self.stop_healthcheck(&comp);
                let effects = match self.comps.get_mut(&comp) {
                    Some(c) => presence::start_restart(c),
                    None => Vec::new(),
                };
                if effects.is_empty() {
                    self.restart_pending.remove(&comp);
                    self.report(AvndToAvd::CompRestarted {
                        node: self.node.clone(),
                        comp,
                        ok: false,
                    })
                    .await;
                } else {
                    self.apply_effects(comp, effects).await;
                }
            }
            AvdToAvnd::CleanupComp { comp } => {
                if let Some(c) = self.comps.get(&comp) {
                    clc::spawn(
                        comp.clone(),
                        ClcStep::Cleanup,
                        c.config.clc.cleanup.clone(),
                        self.clc_tx.clone(),
                    );
                }
            }
            AvdToAvnd::Reboot => {
                warn!(node = %self.node, "reboot ordered; dropping all local components");
                let comps: Vec<Dn> = self.comps.keys().cloned().collect();
                for comp in comps {
                    self.stop_healthcheck(&comp);
                    if let Some(c) = self.comps.get_mut(&comp) {
                        c.presence = PresenceState::Uninstantiated;
                    }
                }
            }
        }
    }

    /// Whether the SU's components are in a state to take the assignment.
    fn can_carry(&self, su: &Dn, _ha: HaState) -> bool {
        let mut any = false;
        for comp in self.comps.values().filter(|c| &c.config.su == su) {
            any = true;
            if comp.presence.is_failed() {
                return false;
            }
            if comp.config.category.is_preinstantiable()
                && comp.presence != PresenceState::Instantiated
            {
                return false;
            }
        }
        any
    }

    /// Components of an SU grouped into instantiation levels.
    fn levels_of(&self, su: &Dn, descending: bool) -> Vec<Vec<Dn>> {
        let mut by_level: Vec<(u32, Vec<Dn>)> = Vec::new();
        let mut comps: Vec<(&Dn, u32)> = self
            .comps
            .iter()
            .filter(|(_, c)| &c.config.su == su)
            .map(|(dn, c)| (dn, c.config.instantiation_level))
            .collect();
        comps.sort_by_key(|(dn, level)| (*level, (*dn).clone()));
        for (dn, level) in comps {
            match by_level.last_mut() {
                Some((l, list)) if *l == level => list.push(dn.clone()),
                _ => by_level.push((level, vec![dn.clone()])),
            }
        }
        if descending {
            by_level.reverse();
        }
        by_level.into_iter().map(|(_, list)| list).collect()
    }

    async fn start_su_op(&mut self, su: Dn, kind: SuOpKind) {
        let mut levels = self.levels_of(&su, kind == SuOpKind::Terminate);
        if levels.is_empty() {
            let done = match kind {
                SuOpKind::Instantiate => AvndToAvd::SuInstantiated {
                    node: self.node.clone(),
                    su,
                    ok: false,
                },
                SuOpKind::Terminate => AvndToAvd::SuTerminated {
                    node: self.node.clone(),
                    su,
                    ok: true,
                },
            };
            self.report(done).await;
            return;
        }
        let first = levels.remove(0);
        let op = SuOp {
            kind,
            pending_levels: levels,
            current: first.clone(),
            failed: false,
        };
        self.su_ops.insert(su, op);
        for comp in first {
            if kind == SuOpKind::Terminate {
                self.stop_healthcheck(&comp);
            }
            let effects = match (kind, self.comps.get_mut(&comp)) {
                (SuOpKind::Instantiate, Some(c)) => presence::start_instantiate(c),
                (SuOpKind::Terminate, Some(c)) => presence::start_terminate(c),
                (_, None) => Vec::new(),
            };
            self.apply_effects(comp, effects).await;
        }
    }

    async fn handle_clc(&mut self, outcome: ClcOutcome) {
        let comp = outcome.comp.clone();
        let effects = match self.comps.get_mut(&comp) {
            Some(c) => presence::on_clc(c, &outcome),
            None => Vec::new(),
        };
        self.apply_effects(comp, effects).await;
    }

    async fn handle_retry(&mut self, comp: Dn) {
        let effects = match self.comps.get_mut(&comp) {
            Some(c) => presence::retry_instantiate(c),
            None => Vec::new(),
        };
        self.apply_effects(comp, effects).await;
    }

    async fn apply_effects(&mut self, comp: Dn, effects: Vec<CompEffect>) {
        for effect in effects {
            match effect {
                CompEffect::Exec(step) => {
                    let command = self.command_for(&comp, step);
                    clc::spawn(comp.clone(), step, command, self.clc_tx.clone());
                }
                CompEffect::RetryAfter(delay) => {
                    let tx = self.retry_tx.clone();
                    let dn = comp.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(dn).await;
                    });
                }
                CompEffect::Became(state) => self.presence_changed(&comp, state).await,
                CompEffect::HealthcheckFailed => {
                    let recovery = self
                        .comps
                        .get(&comp)
                        .map(|c| c.config.recovery_on_error)
                        .unwrap_or_default();
                    self.report(AvndToAvd::ErrorReport {
                        node: self.node.clone(),
                        comp: comp.clone(),
                        recovery,
                    })
                    .await;
                }
            }
        }
    }

    /// The command backing one CLC step. Proxied components are driven
    /// through their proxy rather than a local executable, so every step
    /// but cleanup completes without an exec.
    fn command_for(&self, comp: &Dn, step: ClcStep) -> Option<crate::core::model::comp::ClcCommand> {
        let config = &self.comps.get(comp)?.config;
        if config.category.is_proxied() && step != ClcStep::Cleanup {
            return None;
        }
        match step {
            ClcStep::Instantiate => config.clc.instantiate.clone(),
            ClcStep::Terminate => config.clc.terminate.clone(),
            ClcStep::Cleanup => config.clc.cleanup.clone(),
            ClcStep::AmStart => config.clc.am_start.clone(),
            ClcStep::AmStop => config.clc.am_stop.clone(),
            ClcStep::Healthcheck => config.clc.healthcheck.clone(),
        }
    }

    async fn presence_changed(&mut self, comp: &Dn, state: PresenceState) {
        self.report(AvndToAvd::CompPresence {
            node: self.node.clone(),
            comp: comp.clone(),
            state,
        })
        .await;

        if state == PresenceState::Instantiated {
            self.start_healthcheck(comp);
            self.register_proxy_links(comp).await;
            if self.restart_pending.remove(comp) {
                self.report(AvndToAvd::CompRestarted {
                    node: self.node.clone(),
                    comp: comp.clone(),
                    ok: true,
                })
                .await;
            }
        }
        if state.is_failed() {
            self.restart_pending.remove(comp);
        }
        // A proxy leaving service orphans everything it fronted; a restart
        // re-registers the links once the proxy is back up.
        if matches!(
            state,
            PresenceState::Terminating | PresenceState::Restarting | PresenceState::Uninstantiated
        ) || state.is_failed()
        {
            self.orphan_proxied_of(comp).await;
        }

        let su = match self.comps.get(comp) {
            Some(c) => c.config.su.clone(),
            None => return,
        };
        self.advance_su_op(&su, comp, state).await;
    }

    async fn advance_su_op(&mut self, su: &Dn, comp: &Dn, state: PresenceState) {
        enum Step {
            StartLevel(SuOpKind, Vec<Dn>),
            Finish,
        }
        let step = {
            let Some(op) = self.su_ops.get_mut(su) else { return };
            let arrived = match op.kind {
                SuOpKind::Instantiate => state == PresenceState::Instantiated,
                SuOpKind::Terminate => state == PresenceState::Uninstantiated,
            };
            if state.is_failed() {
                op.failed = true;
                op.current.retain(|c| c != comp);
            } else if arrived {
                op.current.retain(|c| c != comp);
            } else {
                return;
            }
            if !op.current.is_empty() {
                return;
            }
            if !op.failed && !op.pending_levels.is_empty() {
                let next = op.pending_levels.remove(0);
                op.current = next.clone();
                Step::StartLevel(op.kind, next)
            } else {
                Step::Finish
            }
        };

        if let Step::StartLevel(kind, next) = step {
            for comp in next {
                if kind == SuOpKind::Terminate {
                    self.stop_healthcheck(&comp);
                }
                let effects = match (kind, self.comps.get_mut(&comp)) {
                    (SuOpKind::Instantiate, Some(c)) => presence::start_instantiate(c),
                    (SuOpKind::Terminate, Some(c)) => presence::start_terminate(c),
                    (_, None) => Vec::new(),
                };
                Box::pin(self.apply_effects(comp, effects)).await;
            }
            return;
        }

        let op = self.su_ops.remove(su).unwrap();
        let ok = !op.failed;
        let (done, su_state) = match op.kind {
            SuOpKind::Instantiate => (
                AvndToAvd::SuInstantiated {
                    node: self.node.clone(),
                    su: su.clone(),
                    ok,
                },
                if ok {
                    PresenceState::Instantiated
                } else {
                    PresenceState::InstantiationFailed
                },
            ),
            SuOpKind::Terminate => (
                AvndToAvd::SuTerminated {
                    node: self.node.clone(),
                    su: su.clone(),
                    ok,
                },
                if ok {
                    PresenceState::Uninstantiated
                } else {
                    PresenceState::TerminationFailed
                },
            ),
        };
        self.report(AvndToAvd::SuPresence {
            node: self.node.clone(),
            su: su.clone(),
            state: su_state,
        })
        .await;
        self.report(done).await;
    }

    /// Establishes proxy links for a freshly instantiated component: a
    /// proxied component binds to a running proxy, and a proxy (re-)takes
    /// every unlinked proxied component on the node.
    async fn register_proxy_links(&mut self, comp: &Dn) {
        let Some(c) = self.comps.get(comp) else { return };
        if c.config.category.is_proxied() {
            match self.find_proxy_for(comp) {
                Some(proxy) => {
                    self.proxy_links.insert(comp.clone(), proxy.clone());
                    self.report(AvndToAvd::ProxyRegistered {
                        node: self.node.clone(),
                        proxy,
                        proxied: comp.clone(),
                    })
                    .await;
                }
                None => {
                    self.report(AvndToAvd::CompOrphaned {
                        node: self.node.clone(),
                        comp: comp.clone(),
                    })
                    .await;
                }
            }
            return;
        }
        // A new (or restarted) proxy picks up every proxied component that
        // currently has nobody fronting it.
        let unlinked: Vec<Dn> = self
            .comps
            .values()
            .filter(|other| {
                other.config.category.is_proxied()
                    && other.presence == PresenceState::Instantiated
                    && !self.proxy_links.contains_key(&other.config.dn)
            })
            .map(|other| other.config.dn.clone())
            .collect();
        for proxied in unlinked {
            self.proxy_links.insert(proxied.clone(), comp.clone());
            self.report(AvndToAvd::ProxyRegistered {
                node: self.node.clone(),
                proxy: comp.clone(),
                proxied,
            })
            .await;
        }
    }

    /// The first running non-proxied component on this node, by registry
    /// order.
    fn find_proxy_for(&self, _proxied: &Dn) -> Option<Dn> {
        self.comps
            .values()
            .find(|c| {
                !c.config.category.is_proxied() && c.presence == PresenceState::Instantiated
            })
            .map(|c| c.config.dn.clone())
    }

    /// Breaks every link fronted by `proxy` and reports the orphans.
    async fn orphan_proxied_of(&mut self, proxy: &Dn) {
        let orphans: Vec<Dn> = self
            .proxy_links
            .iter()
            .filter(|(_, p)| *p == proxy)
            .map(|(proxied, _)| proxied.clone())
            .collect();
        for orphan in orphans {
            self.proxy_links.remove(&orphan);
            self.report(AvndToAvd::CompOrphaned {
                node: self.node.clone(),
                comp: orphan,
            })
            .await;
        }
    }

    fn start_healthcheck(&mut self, comp: &Dn) {
        let Some(c) = self.comps.get(comp) else { return };
        let Some(command) = c.config.clc.healthcheck.clone() else { return };
        self.stop_healthcheck(comp);
        let (stop_tx, stop_rx) = watch::channel(false);
        self.hc_stop.insert(comp.clone(), stop_tx);
        healthcheck::spawn_periodic(
            comp.clone(),
            command,
            healthcheck::DEFAULT_PERIOD,
            self.clc_tx.clone(),
            stop_rx,
        );
    }

    fn stop_healthcheck(&mut self, comp: &Dn) {
        if let Some(stop) = self.hc_stop.remove(comp) {
            let _ = stop.send(true);
        }
    }
}

/// Registers and spawns one node director on the bus.
pub async fn spawn_node_director(
    node: Dn,
    bus: Arc<dyn MessageBus>,
    shutdown_rx: broadcast::Receiver<()>,
) -> AmfResult<tokio::task::JoinHandle<()>> {
    let director = NodeDirector::new(node, bus).await?;
    Ok(tokio::spawn(director.run(shutdown_rx)))
}
