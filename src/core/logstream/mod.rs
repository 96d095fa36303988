// src/core/logstream/mod.rs

//! The log stream service: configured streams writing size-rotated files
//! under a common root directory.
//!
//! The root directory is itself configuration; changing it closes every
//! open file, renames the current file with a timestamp suffix, and
//! recreates the configuration and log files under the new root, so each
//! stream observes a single atomic rename.

use crate::core::errors::{AmfError, AmfResult};
use crate::core::model::dn::MAX_DN_LEN;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration of one stream, as validated by the config adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// The stream object's DN.
    pub name: String,
    pub file_name: String,
    /// Directory relative to the log root.
    pub rel_path: String,
    pub max_log_file_size: u64,
    pub fixed_log_record_size: u32,
    pub max_files_rotated: u32,
    pub severity_filter: u32,
}

struct OpenStream {
    cfg: StreamConfig,
    file: Option<File>,
    current_path: PathBuf,
    written: u64,
}

/// All open streams plus the root they live under. Owned by the director
/// task; the file operations are small and synchronous, matching the
/// single-writer model.
pub struct LogStreamService {
    root: PathBuf,
    streams: HashMap<String, OpenStream>,
}

impl LogStreamService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            streams: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    pub fn open_count(&self) -> usize {
        self.streams.len()
    }

    fn dir_of(&self, cfg: &StreamConfig) -> PathBuf {
        self.root.join(&cfg.rel_path)
    }

    fn log_path(&self, cfg: &StreamConfig) -> PathBuf {
        self.dir_of(cfg).join(format!("{}.log", cfg.file_name))
    }

    fn cfg_path(&self, cfg: &StreamConfig) -> PathBuf {
        self.dir_of(cfg).join(format!("{}.cfg", cfg.file_name))
    }

    /// Opens (or reopens with fresh configuration) one stream.
    pub fn open(&mut self, cfg: StreamConfig) -> AmfResult<()> {
        if cfg.name.len() >= MAX_DN_LEN {
            return Err(AmfError::InvalidParam(format!(
                "stream name length {} exceeds maximum {}",
                cfg.name.len(),
                MAX_DN_LEN - 1
            )));
        }
        let dir = self.dir_of(&cfg);
        fs::create_dir_all(&dir)?;
        let cfg_path = self.cfg_path(&cfg);
        fs::write(&cfg_path, format_cfg_file(&cfg))?;
        let path = self.log_path(&cfg);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        info!(stream = %cfg.name, path = %path.display(), "log stream open");
        self.streams.insert(
            cfg.name.clone(),
            OpenStream {
                cfg,
                file: Some(file),
                current_path: path,
                written,
            },
        );
        Ok(())
    }

    pub fn close(&mut self, name: &str) -> AmfResult<()> {
        match self.streams.remove(name) {
            Some(_) => {
                info!(stream = %name, "log stream closed");
                Ok(())
            }
            None => Err(AmfError::NotExist(name.to_string())),
        }
    }

    /// Appends one record, honoring the severity filter, fixed record size
    /// and rotation policy.
    pub fn write(&mut self, name: &str, severity: u32, record: &str) -> AmfResult<()> {
        let stream = self
            .streams
            .get_mut(name)
            .ok_or_else(|| AmfError::NotExist(name.to_string()))?;
        if severity != 0 && stream.cfg.severity_filter & severity == 0 {
            return Ok(());
        }
        let mut line = record.to_string();
        let fixed = stream.cfg.fixed_log_record_size as usize;
        if fixed > 0 {
            line.truncate(fixed.saturating_sub(1));
            while line.len() < fixed.saturating_sub(1) {
                line.push(' ');
            }
        }
        line.push('\n');

        if stream.written + line.len() as u64 > stream.cfg.max_log_file_size {
            self.rotate(name)?;
        }
        let stream = self.streams.get_mut(name).unwrap();
        if let Some(file) = stream.file.as_mut() {
            file.write_all(line.as_bytes())?;
            stream.written += line.len() as u64;
        }
        Ok(())
    }

    /// Renames the full current file with a timestamp suffix, prunes old
    /// rotations past the configured limit, and starts a fresh file.
    fn rotate(&mut self, name: &str) -> AmfResult<()> {
        let (cfg, current) = {
            let s = self
                .streams
                .get(name)
                .ok_or_else(|| AmfError::NotExist(name.to_string()))?;
            (s.cfg.clone(), s.current_path.clone())
        };
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%f");
        let rotated = self
            .dir_of(&cfg)
            .join(format!("{}_{}.log", cfg.file_name, stamp));
        let stream = self.streams.get_mut(name).unwrap();
        stream.file = None;
        fs::rename(&current, &rotated)?;
        debug!(stream = %name, to = %rotated.display(), "log file rotated");
        self.prune_rotations(&cfg)?;
        let file = OpenOptions::new().create(true).append(true).open(&current)?;
        let stream = self.streams.get_mut(name).unwrap();
        stream.file = Some(file);
        stream.written = 0;
        Ok(())
    }

    fn prune_rotations(&self, cfg: &StreamConfig) -> AmfResult<()> {
        let dir = self.dir_of(cfg);
        let prefix = format!("{}_", cfg.file_name);
        let mut rotated: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();
        rotated.sort();
        while rotated.len() > cfg.max_files_rotated as usize {
            let oldest = rotated.remove(0);
            if let Err(e) = fs::remove_file(&oldest) {
                warn!(path = %oldest.display(), error = %e, "failed to prune rotation");
            }
        }
        Ok(())
    }

    /// Moves every stream under a new root: close, rename the current file
    /// with a timestamp suffix, recreate config and log files at the new
    /// location. Subsequent writes land under the new root.
    pub fn change_root(&mut self, new_root: impl Into<PathBuf>) -> AmfResult<()> {
        let new_root = new_root.into();
        info!(from = %self.root.display(), to = %new_root.display(), "log root changing");
        let names: Vec<String> = self.streams.keys().cloned().collect();
        for name in &names {
            let (cfg, current) = {
                let s = &self.streams[name];
                (s.cfg.clone(), s.current_path.clone())
            };
            // Close and seal the file under the old root.
            self.streams.get_mut(name).unwrap().file = None;
            if current.exists() {
                let stamp = Utc::now().format("%Y%m%d_%H%M%S%f");
                let sealed = current.with_file_name(format!("{}_{}.log", cfg.file_name, stamp));
                fs::rename(&current, &sealed)?;
            }
        }
        self.root = new_root;
        for name in names {
            let cfg = self.streams[&name].cfg.clone();
            self.open(cfg)?;
        }
        Ok(())
    }

    /// CHANGE-FILTER admin operation on one stream.
    pub fn change_filter(&mut self, name: &str, severity_filter: u32) -> AmfResult<()> {
        let stream = self
            .streams
            .get_mut(name)
            .ok_or_else(|| AmfError::NotExist(name.to_string()))?;
        stream.cfg.severity_filter = severity_filter;
        info!(stream = %name, filter = severity_filter, "severity filter changed");
        Ok(())
    }

    /// Current log file path of one stream, for verification.
    pub fn current_path(&self, name: &str) -> Option<&Path> {
        self.streams.get(name).map(|s| s.current_path.as_path())
    }
}

fn format_cfg_file(cfg: &StreamConfig) -> String {
    format!(
        "name={}\nfile={}\npath={}\nmaxLogFileSize={}\nfixedLogRecordSize={}\nmaxFilesRotated={}\nseverityFilter={:#x}\n",
        cfg.name,
        cfg.file_name,
        cfg.rel_path,
        cfg.max_log_file_size,
        cfg.fixed_log_record_size,
        cfg.max_files_rotated,
        cfg.severity_filter,
    )
}
