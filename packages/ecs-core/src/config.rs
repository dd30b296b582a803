//! Kernel configuration.
//!
//! Supports TOML config files, environment variable overrides, and sensible
//! defaults, the same shape the reference engine uses for its own persistence
//! configuration.

use crate::error::{EcsError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Kernel-wide configuration: tick cadence, table sizing, and recorder cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcsConfig {
    /// Tick rate in Hz; drives the runtime's per-tick wall-clock budget.
    pub tickrate: u32,
    /// Initial capacity (in entities) reserved per byte-packed table.
    pub initial_table_capacity: usize,
    /// Chunk page size in bytes. Defaults to 64 KiB; only ever overridden by
    /// tests that want small chunks to exercise boundary behavior cheaply.
    pub chunk_size_bytes: usize,
    /// Maximum number of entity slots the index may ever issue.
    pub max_entities: usize,
    /// Directory `.fdp` snapshot streams are written to / read from.
    pub data_dir: PathBuf,
    /// Flight Recorder keyframe cadence, in ticks.
    pub keyframe_interval_ticks: u32,
    /// Enable zstd compression of recorded frames.
    pub compress_snapshots: bool,
    /// zstd compression level (1-22).
    pub snapshot_compression_level: i32,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            tickrate: 60,
            initial_table_capacity: 1024,
            chunk_size_bytes: 64 * 1024,
            max_entities: 1 << 20,
            data_dir: PathBuf::from("./snapshots"),
            keyframe_interval_ticks: 600,
            compress_snapshots: true,
            snapshot_compression_level: 3,
        }
    }
}

impl EcsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tickrate.max(1) as f64)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EcsError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| EcsError::Config(format!("invalid TOML: {e}")))
    }

    /// Saves the configuration to a TOML file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| EcsError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path.as_ref(), toml)
            .map_err(|e| EcsError::Config(format!("failed to write config file: {e}")))?;
        Ok(())
    }

    /// Applies environment variable overrides, prefixed `ECSCORE_`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("ECSCORE_TICKRATE") {
            self.tickrate = val
                .parse()
                .map_err(|_| EcsError::Config(format!("invalid tickrate: {val}")))?;
        }
        if let Ok(val) = env::var("ECSCORE_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("ECSCORE_KEYFRAME_INTERVAL_TICKS") {
            self.keyframe_interval_ticks = val
                .parse()
                .map_err(|_| EcsError::Config(format!("invalid keyframe_interval_ticks: {val}")))?;
        }
        if let Ok(val) = env::var("ECSCORE_COMPRESS_SNAPSHOTS") {
            self.compress_snapshots = val
                .parse()
                .map_err(|_| EcsError::Config(format!("invalid compress_snapshots: {val}")))?;
        }
        Ok(())
    }

    pub fn create_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| EcsError::Config(format!("failed to create data dir: {e}")))?;
        Ok(())
    }
}
