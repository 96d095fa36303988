// src/core/avnd/clc.rs

//! CLC-CLI command execution.
//!
//! Every step runs asynchronously on a worker task with the per-command
//! timeout; the node director's main loop never blocks on a child process.
//! A component without a configured command for a step completes that step
//! immediately, which is also how proxied and test components are driven.

use crate::core::model::comp::ClcCommand;
use crate::core::model::dn::Dn;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Which lifecycle step a finished command belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClcStep {
    Instantiate,
    Terminate,
    Cleanup,
    AmStart,
    AmStop,
    Healthcheck,
}

/// Result of one CLC execution, posted back to the node director loop.
#[derive(Debug, Clone)]
pub struct ClcOutcome {
    pub comp: Dn,
    pub step: ClcStep,
    pub ok: bool,
    pub timed_out: bool,
}

/// Spawns one CLC command. The outcome arrives on `tx` when the child
/// exits or the timeout fires; a missing command reports instant success.
pub fn spawn(comp: Dn, step: ClcStep, command: Option<ClcCommand>, tx: mpsc::Sender<ClcOutcome>) {
    tokio::spawn(async move {
        let outcome = match command {
            None => ClcOutcome {
                comp: comp.clone(),
                step,
                ok: true,
                timed_out: false,
            },
            Some(cmd) => run(comp.clone(), step, cmd).await,
        };
        if tx.send(outcome).await.is_err() {
            warn!(%comp, "node director gone; CLC outcome dropped");
        }
    });
}

async fn run(comp: Dn, step: ClcStep, spec: ClcCommand) -> ClcOutcome {
    debug!(%comp, ?step, cmd = %spec.cmd, "executing CLC command");
    let child = Command::new(&spec.cmd)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let mut child = match child {
        Ok(c) => c,
        Err(e) => {
            warn!(%comp, ?step, error = %e, "CLC command failed to spawn");
            return ClcOutcome {
                comp,
                step,
                ok: false,
                timed_out: false,
            };
        }
    };
    match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => ClcOutcome {
            comp,
            step,
            ok: status.success(),
            timed_out: false,
        },
        Ok(Err(e)) => {
            warn!(%comp, ?step, error = %e, "CLC command wait failed");
            ClcOutcome {
                comp,
                step,
                ok: false,
                timed_out: false,
            }
        }
        Err(_) => {
            // The child is killed by kill_on_drop when it leaves scope.
            warn!(%comp, ?step, timeout = ?spec.timeout, "CLC command timed out");
            ClcOutcome {
                comp,
                step,
                ok: false,
                timed_out: true,
            }
        }
    }
}
