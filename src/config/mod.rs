//! Configuration system for taskpipe.
//!
//! Loaded from ./taskpipe.yml or ~/.config/taskpipe/taskpipe.yml, falling
//! back to built-in defaults. Each executor section may be given partially;
//! missing keys take their defaults.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use self::pipes::{PipeConfig, PoolConfig, cpu_count};

mod pipes;

/// Project name used for config file lookup.
pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

/// Scheduling configuration, constructed once by the embedding application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Shared worker pool.
    pub pool: PoolConfig,

    /// IO-bound pipe (also backs the IO dedup lane).
    pub io: PipeConfig,

    /// CPU-bound pipe (also backs the CPU dedup lane).
    pub computation: PipeConfig,

    /// Pipe behind the serialize-all lane.
    pub serial: PipeConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            io: PipeConfig::io(),
            computation: PipeConfig::computation(),
            serial: PipeConfig::serial(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. ./taskpipe.yml
    /// 3. ~/.config/taskpipe/taskpipe.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project config
        let project_config = PathBuf::from(format!("{}.yml", PROJECT_NAME));
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load {}: {}", project_config.display(), e);
                }
            }
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(PROJECT_NAME).join(format!("{}.yml", PROJECT_NAME));
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate a single YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_threads == 0 {
            eyre::bail!("pool.max-threads must be > 0");
        }
        for (name, pipe) in [("io", &self.io), ("computation", &self.computation), ("serial", &self.serial)] {
            if pipe.window == 0 {
                eyre::bail!("{}.window must be > 0", name);
            }
            if let Some(capacity) = pipe.capacity_limit()
                && capacity < pipe.window
            {
                eyre::bail!("{}.capacity ({}) must be 0 or >= window ({})", name, capacity, pipe.window);
            }
        }
        Ok(())
    }
}
