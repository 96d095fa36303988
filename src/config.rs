// src/config.rs

//! Manages director configuration: loading, environment fallbacks, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// The high-availability role this director instance starts in. The
/// external availability supervisor may change it at runtime.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HaRole {
    #[default]
    Active,
    Standby,
}

/// Timer settings for the AvD-to-AvD checkpoint session.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckpointConfig {
    /// Interval between warm-sync counter probes sent by the standby.
    #[serde(with = "humantime_serde", default = "default_warm_sync_interval")]
    pub warm_sync_interval: Duration,
    /// How long the standby waits for cold-sync completion before re-requesting.
    #[serde(with = "humantime_serde", default = "default_cold_sync_timeout")]
    pub cold_sync_timeout: Duration,
    /// How long the standby waits for a data response before declaring the
    /// peer unreachable.
    #[serde(with = "humantime_serde", default = "default_data_resp_timeout")]
    pub data_resp_timeout: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            warm_sync_interval: default_warm_sync_interval(),
            cold_sync_timeout: default_cold_sync_timeout(),
            data_resp_timeout: default_data_resp_timeout(),
        }
    }
}

fn default_warm_sync_interval() -> Duration {
    Duration::from_secs(10)
}
fn default_cold_sync_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_data_resp_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Cluster-wide defaults applied to components that configure no values of
/// their own and whose component type is silent as well.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompGlobalConfig {
    #[serde(default = "default_inst_without_delay")]
    pub num_max_instantiate_without_delay: u32,
    #[serde(default = "default_inst_with_delay")]
    pub num_max_instantiate_with_delay: u32,
    #[serde(with = "humantime_serde", default = "default_inst_delay")]
    pub delay_between_instantiate_attempts: Duration,
    #[serde(default = "default_am_attempts")]
    pub num_max_am_start_attempts: u32,
    #[serde(default = "default_am_attempts")]
    pub num_max_am_stop_attempts: u32,
}

impl Default for CompGlobalConfig {
    fn default() -> Self {
        Self {
            num_max_instantiate_without_delay: default_inst_without_delay(),
            num_max_instantiate_with_delay: default_inst_with_delay(),
            delay_between_instantiate_attempts: default_inst_delay(),
            num_max_am_start_attempts: default_am_attempts(),
            num_max_am_stop_attempts: default_am_attempts(),
        }
    }
}

fn default_inst_without_delay() -> u32 {
    2
}
fn default_inst_with_delay() -> u32 {
    0
}
fn default_inst_delay() -> Duration {
    Duration::from_secs(10)
}
fn default_am_attempts() -> u32 {
    3
}

/// The director's static configuration, loaded from a TOML file at startup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// The DN of the cluster node this process runs on.
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// Initial HA role of this director instance.
    #[serde(default)]
    pub role: HaRole,
    /// Optional XML model file imported through the CCB path at boot.
    #[serde(default)]
    pub model_file: Option<String>,
    /// Root directory for the log stream service.
    #[serde(default = "default_log_root")]
    pub log_root_directory: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Deadline for a single sync-send to a node director.
    #[serde(with = "humantime_serde", default = "default_sync_send_timeout")]
    pub sync_send_timeout: Duration,
    /// Grace period an admin operation waits for its secondary effects.
    #[serde(with = "humantime_serde", default = "default_admin_op_timeout")]
    pub admin_op_timeout: Duration,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub comp_globals: CompGlobalConfig,
}

fn default_node_name() -> String {
    "safAmfNode=SC-1,safAmfCluster=myAmfCluster".to_string()
}
fn default_log_root() -> String {
    "/var/log/amfd".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_sync_send_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_admin_op_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            role: HaRole::default(),
            model_file: None,
            log_root_directory: default_log_root(),
            log_level: default_log_level(),
            sync_send_timeout: default_sync_send_timeout(),
            admin_op_timeout: default_admin_op_timeout(),
            checkpoint: CheckpointConfig::default(),
            comp_globals: CompGlobalConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file, then layers environment
    /// fallbacks on top of any field the file left at its default.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("could not read config file '{path}'"))?;
        let mut config: Config =
            toml::from_str(&content).with_context(|| format!("could not parse '{path}'"))?;
        config.apply_env_fallbacks();
        config.validate()?;
        Ok(config)
    }

    /// Tunables may be supplied as `AMFD_<NAME>` environment variables when
    /// the configuration file does not set them. A variable that fails to
    /// parse is logged and the default is kept.
    pub fn apply_env_fallbacks(&mut self) {
        if self.log_root_directory == default_log_root() {
            if let Ok(v) = std::env::var("AMFD_LOG_ROOT_DIRECTORY") {
                self.log_root_directory = v;
            }
        }
        if self.sync_send_timeout == default_sync_send_timeout() {
            env_duration_secs("AMFD_SYNC_SEND_TIMEOUT", &mut self.sync_send_timeout);
        }
        if self.admin_op_timeout == default_admin_op_timeout() {
            env_duration_secs("AMFD_ADMIN_OP_TIMEOUT", &mut self.admin_op_timeout);
        }
        if self.checkpoint.warm_sync_interval == default_warm_sync_interval() {
            env_duration_secs(
                "AMFD_WARM_SYNC_INTERVAL",
                &mut self.checkpoint.warm_sync_interval,
            );
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_name.is_empty() {
            return Err(anyhow!("node_name must not be empty"));
        }
        if self.node_name.len() >= crate::core::model::dn::MAX_DN_LEN {
            return Err(anyhow!(
                "node_name exceeds the maximum DN length of {}",
                crate::core::model::dn::MAX_DN_LEN
            ));
        }
        if self.sync_send_timeout.is_zero() {
            return Err(anyhow!("sync_send_timeout must be non-zero"));
        }
        if self.checkpoint.warm_sync_interval.is_zero() {
            return Err(anyhow!("checkpoint.warm_sync_interval must be non-zero"));
        }
        Ok(())
    }
}

fn env_duration_secs(var: &str, slot: &mut Duration) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<u64>() {
            Ok(secs) => *slot = Duration::from_secs(secs),
            Err(_) => warn!("ignoring {}: '{}' is not a number of seconds", var, raw),
        }
    }
}
