use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tracing: TracingConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TracingConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two scans for due scripts (default: 30)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
    /// Seconds between two scans for runs stuck in `running` (default: 300)
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_seconds: u64,
}

impl SchedulerConfig {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }

    pub const fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_seconds)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_tick_interval(),
            recovery_interval_seconds: default_recovery_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Wall-clock limit for one run in seconds (default: 300)
    #[serde(default = "default_execution_timeout")]
    pub timeout_seconds: u64,
    /// Captured output beyond this many bytes is cut off (default: 65536)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl ExecutorConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_execution_timeout(),
            max_output_bytes: default_max_output_bytes(),
            runner: RunnerConfig::default(),
        }
    }
}

/// Which backend executes script code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RunnerConfig {
    /// Embedded Rhai sandbox
    Rhai {
        #[serde(default = "default_max_operations")]
        max_operations: u64,
    },
    /// External interpreter, invoked as `program [args..] <code>`
    Process {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<String>,
    },
}

impl RunnerConfig {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rhai { .. } => "rhai",
            Self::Process { .. } => "process",
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::Rhai {
            max_operations: default_max_operations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Runs returned when the client gives no limit (default: 20)
    #[serde(default = "default_history_limit")]
    pub default_limit: u64,
    /// Upper bound on a requested limit (default: 500)
    #[serde(default = "default_history_max_limit")]
    pub max_limit: u64,
    /// Finished runs older than this are deleted, 0 keeps them forever (default: 30 days)
    #[serde(default = "default_retention")]
    pub retention_seconds: u64,
    /// Interval between cleanup runs in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Maximum number of runs to delete in a single batch (default: 1000)
    #[serde(default = "default_cleanup_batch_size")]
    pub batch_size: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_history_limit(),
            max_limit: default_history_max_limit(),
            retention_seconds: default_retention(),
            cleanup_interval_seconds: default_cleanup_interval(),
            batch_size: default_cleanup_batch_size(),
        }
    }
}

const fn default_tick_interval() -> u64 {
    30
}

const fn default_recovery_interval() -> u64 {
    300 // 5 minutes
}

const fn default_execution_timeout() -> u64 {
    300 // 5 minutes
}

const fn default_max_output_bytes() -> usize {
    64 * 1024
}

const fn default_max_operations() -> u64 {
    50_000_000
}

const fn default_history_limit() -> u64 {
    20
}

const fn default_history_max_limit() -> u64 {
    500
}

const fn default_retention() -> u64 {
    2_592_000 // 30 days
}

const fn default_cleanup_interval() -> u64 {
    3600 // 1 hour
}

const fn default_cleanup_batch_size() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_sections_fall_back_to_defaults() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "tracing": { "log_level": "info" },
            "database": { "url": "sqlite::memory:", "pool_size": 1 },
            "server": { "port": 8080 }
        }))
        .unwrap();

        assert_eq!(config.scheduler.tick_interval_seconds, 30);
        assert_eq!(config.executor.timeout_seconds, 300);
        assert_eq!(config.executor.runner.name(), "rhai");
        assert_eq!(config.history.default_limit, 20);
        assert_eq!(config.history.max_limit, 500);
    }

    #[test]
    fn test_process_runner_is_tagged_by_type() {
        let runner: RunnerConfig = serde_json::from_value(serde_json::json!({
            "type": "process",
            "program": "python3",
            "args": ["-c"]
        }))
        .unwrap();

        assert_eq!(
            runner,
            RunnerConfig::Process {
                program: "python3".to_string(),
                args: vec!["-c".to_string()],
                working_dir: None,
            }
        );
    }
}
