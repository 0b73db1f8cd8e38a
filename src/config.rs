use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::orchestration::{
    EngineConfig, FailurePolicy, DEFAULT_REASONING_TIMEOUT_SECS, DEFAULT_TASK_TIMEOUT_SECS,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Timeout for tasks that do not set their own.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub planner: PlannerConfig,
    /// Constructor parameters per worker type, keyed by worker type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub workers: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub command: Option<String>,
    #[serde(default = "default_planner_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_task_timeout_secs() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

fn default_planner_timeout_secs() -> u64 {
    DEFAULT_REASONING_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task_timeout_secs: default_task_timeout_secs(),
            failure_policy: FailurePolicy::default(),
            planner: PlannerConfig::default(),
            workers: BTreeMap::new(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_planner_timeout_secs(),
        }
    }
}

impl PlannerConfig {
    pub fn effective_command(&self) -> &str {
        self.command.as_deref().unwrap_or("claude")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn taskweave_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".taskweave"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::taskweave_dir()?.join("taskweave.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Config::load path={}", path.display());
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.check()?;
        debug!(
            "Config loaded: task_timeout_secs={}, failure_policy={}, workers={:?}",
            config.task_timeout_secs,
            config.failure_policy,
            config.workers.keys().collect::<Vec<_>>()
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!("Config saved to {}", path.display());
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.task_timeout_secs == 0 {
            return Err(Error::Config("task_timeout_secs must be positive".to_string()));
        }
        if self.planner.timeout_secs == 0 {
            return Err(Error::Config("planner.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            task_timeout: Duration::from_secs(self.task_timeout_secs),
            failure_policy: self.failure_policy,
        }
    }

    /// Worker parameters in the shape `WorkerRegistry::build` takes.
    pub fn worker_params(&self) -> HashMap<String, Map<String, Value>> {
        self.workers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
