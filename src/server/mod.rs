// src/server/mod.rs

//! Server bootstrap and the public handle used by the binary and tests.
//!
//! Initialization order is fixed: bus, object store, replicator, entity
//! model (the director task), and finally the local node director.

pub mod director;

use crate::config::{Config, HaRole};
use crate::core::admin::{AdminOpId, AdminRequest};
use crate::core::alarm::AlarmService;
use crate::core::bus::MessageBus;
use crate::core::bus::local::LocalBus;
use crate::core::ckpt;
use crate::core::errors::{AmfError, AmfResult};
use crate::core::events::{Event, EventQueue};
use crate::core::imm::ccb::CcbOp;
use crate::core::imm::store::ObjectStore;
use crate::core::import;
use crate::core::model::ModelSnapshot;
use crate::core::model::dn::Dn;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

/// Cloneable handle onto a running director.
#[derive(Clone)]
pub struct DirectorHandle {
    pub events: EventQueue,
    pub alarms: AlarmService,
    ccb_ids: Arc<AtomicU64>,
    invocations: Arc<AtomicU64>,
}

impl DirectorHandle {
    /// Runs one configuration change bundle through validate and apply.
    pub async fn ccb(&self, ops: Vec<CcbOp>) -> AmfResult<()> {
        let ccb_id = self.ccb_ids.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.events
            .post(Event::Ccb {
                ccb_id,
                ops,
                reply: tx,
            })
            .await;
        rx.await
            .map_err(|_| AmfError::Internal("director gone".to_string()))?
    }

    /// Invokes an admin operation and waits for its completion callback.
    pub async fn admin(&self, dn: Dn, op: AdminOpId) -> AmfResult<()> {
        self.admin_with_params(dn, op, Vec::new()).await
    }

    pub async fn admin_with_params(
        &self,
        dn: Dn,
        op: AdminOpId,
        params: Vec<(String, String)>,
    ) -> AmfResult<()> {
        let invocation = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.events
            .post(Event::AdminOp {
                req: AdminRequest {
                    invocation,
                    dn,
                    op,
                    params,
                },
                reply: tx,
            })
            .await;
        rx.await
            .map_err(|_| AmfError::Internal("director gone".to_string()))?
    }

    pub async fn runtime_read(&self, dn: Dn, attr: &str) -> AmfResult<String> {
        let (tx, rx) = oneshot::channel();
        self.events
            .post(Event::RuntimeRead {
                dn,
                attr: attr.to_string(),
                reply: tx,
            })
            .await;
        rx.await
            .map_err(|_| AmfError::Internal("director gone".to_string()))?
    }

    pub async fn snapshot(&self) -> AmfResult<ModelSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.events.post(Event::ModelInspect { reply: tx }).await;
        rx.await
            .map_err(|_| AmfError::Internal("director gone".to_string()))
    }

    pub async fn log_write(&self, stream: &str, severity: u32, record: &str) -> AmfResult<()> {
        let (tx, rx) = oneshot::channel();
        self.events
            .post(Event::LogWrite {
                stream: stream.to_string(),
                severity,
                record: record.to_string(),
                reply: tx,
            })
            .await;
        rx.await
            .map_err(|_| AmfError::Internal("director gone".to_string()))?
    }

    pub async fn role_change(&self, role: HaRole) {
        self.events.post(Event::RoleChange(role)).await;
    }
}

/// Brings up one director instance on the given bus and store. Returns the
/// handle plus the task join handles, so callers control shutdown.
pub async fn spawn_director(
    config: Config,
    bus: Arc<dyn MessageBus>,
    store: Arc<ObjectStore>,
    alarms: AlarmService,
    shutdown: &broadcast::Sender<()>,
) -> AmfResult<(DirectorHandle, Vec<JoinHandle<()>>)> {
    let (events, event_rx) = EventQueue::new();
    let (ckpt_tx, ckpt_rx) = mpsc::unbounded_channel();
    let (role_tx, role_rx) = broadcast::channel(4);

    director::spawn_bus_pump(bus.clone(), events.clone(), shutdown.subscribe()).await?;

    let replicator = ckpt::spawn_replicator(
        config.role,
        bus.clone(),
        events.clone(),
        config.checkpoint.clone(),
        alarms.clone(),
        ckpt_rx,
        role_rx,
        shutdown.subscribe(),
    );

    let d = director::Director::new(
        config,
        store,
        bus,
        alarms.clone(),
        events.clone(),
        event_rx,
        ckpt_tx,
        role_tx,
    );
    let director_task = tokio::spawn(d.run(shutdown.subscribe()));

    let handle = DirectorHandle {
        events,
        alarms,
        ccb_ids: Arc::new(AtomicU64::new(0)),
        invocations: Arc::new(AtomicU64::new(0)),
    };
    Ok((handle, vec![replicator, director_task]))
}

/// Loads an XML model file into the store so the initial load finds it.
pub fn preload_model(store: &ObjectStore, path: &str) -> AmfResult<usize> {
    let ops = import::parse_file(path)?;
    let count = ops.len();
    for op in ops {
        store.insert(op.dn, op.class, op.attrs);
    }
    Ok(count)
}

/// The full server: director plus the local node director, running until
/// interrupted.
pub async fn run(config: Config) -> Result<()> {
    let bus: Arc<dyn MessageBus> = Arc::new(LocalBus::new());
    let store = Arc::new(ObjectStore::new());
    if let Some(path) = &config.model_file {
        let count = preload_model(&store, path)?;
        info!(objects = count, file = %path, "model file loaded into store");
    }
    let alarms = AlarmService::new();
    let (shutdown_tx, _) = broadcast::channel(1);

    let node = Dn::new(config.node_name.clone()).map_err(|e| anyhow::anyhow!(e))?;
    let (_handle, mut tasks) =
        spawn_director(config, bus.clone(), store, alarms, &shutdown_tx).await?;
    tasks.push(
        crate::core::avnd::spawn_node_director(node, bus, shutdown_tx.subscribe()).await?,
    );

    tokio::signal::ctrl_c().await?;
    info!("interrupt received; shutting down");
    let _ = shutdown_tx.send(());
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
