// src/core/bus/local.rs

//! In-process bus: per-destination tokio channels with FIFO delivery per
//! (source, destination) pair.

use super::{BusEnvelope, MessageBus, VDest};
use crate::core::errors::{AmfError, AmfResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

const DELIVERY_QUEUE_CAPACITY: usize = 1024;

struct Route {
    service: u16,
    tx: mpsc::Sender<BusEnvelope>,
}

/// The in-process transport. Cheaply cloneable; all clones share the same
/// routing table.
#[derive(Clone, Default)]
pub struct LocalBus {
    routes: Arc<Mutex<HashMap<VDest, Route>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender_for(&self, to: &VDest) -> AmfResult<mpsc::Sender<BusEnvelope>> {
        let routes = self.routes.lock().await;
        routes
            .get(to)
            .map(|r| r.tx.clone())
            .ok_or_else(|| AmfError::Transient(format!("no route to destination '{to}'")))
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn register(
        &self,
        service: u16,
        dest: VDest,
    ) -> AmfResult<mpsc::Receiver<BusEnvelope>> {
        let (tx, rx) = mpsc::channel(DELIVERY_QUEUE_CAPACITY);
        let mut routes = self.routes.lock().await;
        if routes.insert(dest.clone(), Route { service, tx }).is_some() {
            debug!(%dest, "destination re-registered, replacing delivery queue");
        }
        Ok(rx)
    }

    async fn unregister(&self, dest: &VDest) -> AmfResult<()> {
        self.routes.lock().await.remove(dest);
        Ok(())
    }

    async fn sync_send(
        &self,
        from: &VDest,
        to: &VDest,
        service: u16,
        payload: Bytes,
        timeout: Duration,
    ) -> AmfResult<Bytes> {
        let tx = self.sender_for(to).await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = BusEnvelope {
            service,
            from: from.clone(),
            payload,
            reply: Some(reply_tx),
        };
        tx.send(envelope)
            .await
            .map_err(|_| AmfError::Transient(format!("destination '{to}' is gone")))?;
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AmfError::Transient(format!(
                "destination '{to}' dropped the request"
            ))),
            Err(_) => Err(AmfError::Timeout(format!(
                "no reply from '{to}' within {timeout:?}"
            ))),
        }
    }

    async fn async_send(
        &self,
        from: &VDest,
        to: &VDest,
        service: u16,
        payload: Bytes,
    ) -> AmfResult<()> {
        let tx = self.sender_for(to).await?;
        let envelope = BusEnvelope {
            service,
            from: from.clone(),
            payload,
            reply: None,
        };
        tx.send(envelope)
            .await
            .map_err(|_| AmfError::Transient(format!("destination '{to}' is gone")))
    }

    async fn broadcast(&self, from: &VDest, service: u16, payload: Bytes) -> AmfResult<()> {
        let targets: Vec<(VDest, mpsc::Sender<BusEnvelope>)> = {
            let routes = self.routes.lock().await;
            routes
                .iter()
                .filter(|(dest, r)| r.service == service && *dest != from)
                .map(|(dest, r)| (dest.clone(), r.tx.clone()))
                .collect()
        };
        for (dest, tx) in targets {
            let envelope = BusEnvelope {
                service,
                from: from.clone(),
                payload: payload.clone(),
                reply: None,
            };
            // Best-effort: a full or closed queue only logs.
            if tx.try_send(envelope).is_err() {
                warn!(%dest, "broadcast dropped for destination");
            }
        }
        Ok(())
    }
}
