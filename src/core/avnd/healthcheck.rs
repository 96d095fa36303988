// src/core/avnd/healthcheck.rs

//! Periodic healthcheck execution for instantiated components.

use super::clc::{ClcOutcome, ClcStep};
use crate::core::model::comp::ClcCommand;
use crate::core::model::dn::Dn;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Default probe period when the command carries no explicit cadence.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(10);

/// Runs `command` every `period` until the stop signal flips. Outcomes ride
/// the same channel as every other CLC result.
pub fn spawn_periodic(
    comp: Dn,
    command: ClcCommand,
    period: Duration,
    tx: mpsc::Sender<ClcOutcome>,
    mut stop: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; skip it so
        // a freshly instantiated component gets a full period of grace.
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    super::clc::spawn(
                        comp.clone(),
                        ClcStep::Healthcheck,
                        Some(command.clone()),
                        tx.clone(),
                    );
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        debug!(%comp, "healthcheck stopped");
                        return;
                    }
                }
            }
        }
    });
}
