//! Engine configuration.
//!
//! Lookup order: an explicit path, then `./conductor.toml`, then built-in
//! defaults. `CONDUCTOR_*` environment variables override whatever was read.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Root tasks running at once.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    /// Subtasks running at once, shared across every root.
    #[serde(default = "default_max_parallel_subtasks")]
    pub max_parallel_subtasks: usize,

    #[serde(default = "default_abort_timeout_secs")]
    pub abort_timeout_secs: u64,

    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,

    /// Written on every task row this process creates.
    #[serde(default = "default_owner")]
    pub owner: String,
}

fn default_max_parallel_tasks() -> usize {
    10
}

fn default_max_parallel_subtasks() -> usize {
    50
}

fn default_abort_timeout_secs() -> u64 {
    30
}

fn default_shutdown_drain_secs() -> u64 {
    60
}

fn default_owner() -> String {
    format!("conductor-{}", std::process::id())
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
            max_parallel_subtasks: default_max_parallel_subtasks(),
            abort_timeout_secs: default_abort_timeout_secs(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
            owner: default_owner(),
        }
    }
}

impl ExecutorConfig {
    pub fn abort_timeout(&self) -> Duration {
        Duration::from_secs(self.abort_timeout_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

/// Defaults for each run's `ExecutionContext`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_true")]
    pub blacklist_leaders: bool,

    #[serde(default = "default_leader_blacklist_wait_ms")]
    pub leader_blacklist_wait_ms: u64,

    #[serde(default = "default_wait_for_server_ready_timeout_secs")]
    pub wait_for_server_ready_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub follower_lag_check_enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_leader_blacklist_wait_ms() -> u64 {
    60_000
}

fn default_wait_for_server_ready_timeout_secs() -> u64 {
    300
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            blacklist_leaders: true,
            leader_blacklist_wait_ms: default_leader_blacklist_wait_ms(),
            wait_for_server_ready_timeout_secs: default_wait_for_server_ready_timeout_secs(),
            follower_lag_check_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info,conductor_core=debug"`.
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl ConductorConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let local = Path::new("conductor.toml");
        let source = match path {
            Some(p) => Some(p),
            None if local.exists() => Some(local),
            None => None,
        };

        let mut cfg = match source {
            Some(p) => {
                let s = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.display().to_string(),
                    source,
                })?;
                Self::from_toml(&s)?
            }
            None => Self::default(),
        };

        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overrides from `lookup`, normally the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("CONDUCTOR_MAX_PARALLEL_TASKS") {
            self.executor.max_parallel_tasks = parse_usize("CONDUCTOR_MAX_PARALLEL_TASKS", &v)?;
        }
        if let Some(v) = non_empty("CONDUCTOR_MAX_PARALLEL_SUBTASKS") {
            self.executor.max_parallel_subtasks =
                parse_usize("CONDUCTOR_MAX_PARALLEL_SUBTASKS", &v)?;
        }
        if let Some(v) = non_empty("CONDUCTOR_OWNER") {
            self.executor.owner = v;
        }
        if let Some(v) = non_empty("CONDUCTOR_LOG") {
            self.logging.filter = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_parallel_tasks == 0 {
            return Err(ConfigError::Invalid("executor.max_parallel_tasks must be > 0".into()));
        }
        if self.executor.max_parallel_subtasks == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_parallel_subtasks must be > 0".into(),
            ));
        }
        if self.executor.abort_timeout_secs == 0 {
            return Err(ConfigError::Invalid("executor.abort_timeout_secs must be > 0".into()));
        }
        if self.executor.owner.trim().is_empty() {
            return Err(ConfigError::Invalid("executor.owner must not be empty".into()));
        }
        Ok(())
    }
}

fn parse_usize(key: &str, v: &str) -> Result<usize, ConfigError> {
    v.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}={v} is not a positive integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = ConductorConfig::from_toml("").unwrap();
        assert_eq!(cfg.executor.max_parallel_tasks, 10);
        assert_eq!(cfg.executor.max_parallel_subtasks, 50);
        assert_eq!(cfg.executor.abort_timeout(), Duration::from_secs(30));
        assert!(cfg.execution.blacklist_leaders);
        assert_eq!(cfg.execution.leader_blacklist_wait_ms, 60_000);
        assert_eq!(cfg.logging.filter, "info");
        assert!(cfg.executor.owner.starts_with("conductor-"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = ConductorConfig::from_toml(
            r#"
            [executor]
            max_parallel_tasks = 2
            owner = "node-a"

            [execution]
            blacklist_leaders = false

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.executor.max_parallel_tasks, 2);
        assert_eq!(cfg.executor.max_parallel_subtasks, 50);
        assert_eq!(cfg.executor.owner, "node-a");
        assert!(!cfg.execution.blacklist_leaders);
        assert!(cfg.execution.follower_lag_check_enabled);
        assert!(cfg.logging.json);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("CONDUCTOR_MAX_PARALLEL_TASKS", "4"),
            ("CONDUCTOR_OWNER", "worker-7"),
            ("CONDUCTOR_LOG", " "),
        ]
        .into_iter()
        .collect();

        let mut cfg = ConductorConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.executor.max_parallel_tasks, 4);
        assert_eq!(cfg.executor.owner, "worker-7");
        assert_eq!(cfg.logging.filter, "info");
    }

    #[test]
    fn bad_env_number_is_reported() {
        let mut cfg = ConductorConfig::default();
        let err = cfg
            .apply_env(|k| (k == "CONDUCTOR_MAX_PARALLEL_SUBTASKS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_pool_is_rejected() {
        let cfg = ConductorConfig::from_toml("[executor]\nmax_parallel_subtasks = 0").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            ConductorConfig::from_toml("[executor\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
