//! Worker configuration, read from the environment the way the source project does it.

use crate::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Full configuration for a supervisor run, assembled from environment
/// variables at process start (see [`WorkerConfig::from_env`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub process: ProcessConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            process: ProcessConfig::default(),
        }
    }
}

/// Redis connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "redwork".to_string()
}

fn default_pool_size() -> u32 {
    10
}

/// Process-model configuration: supervisor/child counts, timeouts, queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Configured queue patterns, in priority order (may contain wildcards).
    pub queues: Vec<String>,

    /// `WORKER_COUNT` — number of child processors the supervisor keeps alive.
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,

    /// `JOBS_PER_FORK` — jobs a child processes before exiting for refork.
    #[serde(default = "default_jobs_per_fork")]
    pub jobs_per_fork: u32,

    /// `THREAD_COUNT` — reserved; must be 1.
    #[serde(default = "default_thread_count")]
    pub thread_count: u32,

    /// `RESQUE_TERM_TIMEOUT` — seconds to await cooperative shutdown before SIGKILL.
    #[serde(default = "default_term_timeout")]
    pub term_timeout_secs: f64,

    /// Cadence of the heartbeat loop and of the prune lock TTL.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// A heartbeat older than this marks a worker dead.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,

    /// Poll interval used between empty reservation attempts.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// `RESQUE_PROCLINE_PREFIX` — prefixed to the process title.
    #[serde(default)]
    pub procline_prefix: String,

    /// `PIDFILE` — if set, the supervisor's PID is written there.
    #[serde(default)]
    pub pidfile: Option<String>,

    /// `BACKGROUND` — daemonize at startup if set (any non-empty value).
    #[serde(default)]
    pub background: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            worker_count: default_worker_count(),
            jobs_per_fork: default_jobs_per_fork(),
            thread_count: default_thread_count(),
            term_timeout_secs: default_term_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            prune_interval_secs: default_prune_interval(),
            poll_interval_secs: default_poll_interval(),
            procline_prefix: String::new(),
            pidfile: None,
            background: false,
        }
    }
}

fn default_worker_count() -> u32 {
    1
}

fn default_jobs_per_fork() -> u32 {
    1
}

fn default_thread_count() -> u32 {
    1
}

fn default_term_timeout() -> f64 {
    30.0
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_prune_interval() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    5
}

impl ProcessConfig {
    pub fn term_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.term_timeout_secs.max(0.0))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl WorkerConfig {
    /// Build configuration from the environment variables documented in the
    /// external-interfaces section: `QUEUES`/`QUEUE`, `WORKER_COUNT`,
    /// `JOBS_PER_FORK`, `THREAD_COUNT`, `RESQUE_TERM_TIMEOUT`,
    /// `RESQUE_PROCLINE_PREFIX`, `PIDFILE`, `BACKGROUND`.
    pub fn from_env() -> JobResult<Self> {
        let mut cfg = WorkerConfig::default();

        if let Ok(url) = std::env::var("REDIS_URL") {
            cfg.redis.url = url;
        }

        let queues_var = std::env::var("QUEUES")
            .or_else(|_| std::env::var("QUEUE"))
            .unwrap_or_default();
        cfg.process.queues = queues_var
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if let Ok(v) = std::env::var("WORKER_COUNT") {
            cfg.process.worker_count = parse_env("WORKER_COUNT", &v)?;
        }
        if let Ok(v) = std::env::var("JOBS_PER_FORK") {
            cfg.process.jobs_per_fork = parse_env("JOBS_PER_FORK", &v)?;
        }
        if let Ok(v) = std::env::var("THREAD_COUNT") {
            cfg.process.thread_count = parse_env("THREAD_COUNT", &v)?;
        }
        if let Ok(v) = std::env::var("RESQUE_TERM_TIMEOUT") {
            cfg.process.term_timeout_secs = parse_env("RESQUE_TERM_TIMEOUT", &v)?;
        }
        if let Ok(prefix) = std::env::var("RESQUE_PROCLINE_PREFIX") {
            cfg.process.procline_prefix = prefix;
        }
        if let Ok(pidfile) = std::env::var("PIDFILE") {
            cfg.process.pidfile = Some(pidfile);
        }
        cfg.process.background = std::env::var("BACKGROUND").is_ok();

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject the configuration errors the source project treats as fatal at
    /// construction: no queues, and `thread_count != 1` (reserved, unimplemented).
    pub fn validate(&self) -> JobResult<()> {
        if self.process.queues.is_empty() {
            return Err(JobError::configuration("no queue(s) configured"));
        }
        if self.process.thread_count != 1 {
            return Err(JobError::configuration(
                "thread_count > 1 is reserved and not implemented",
            ));
        }
        if self.process.worker_count < 1 {
            return Err(JobError::configuration("worker_count must be >= 1"));
        }
        if self.process.jobs_per_fork < 1 {
            return Err(JobError::configuration("jobs_per_fork must be >= 1"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> JobResult<T> {
    raw.parse()
        .map_err(|_| JobError::configuration(format!("invalid value for {name}: '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_invalid_without_queues() {
        let cfg = WorkerConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn thread_count_above_one_is_rejected() {
        let mut cfg = WorkerConfig::default();
        cfg.process.queues = vec!["default".into()];
        cfg.process.thread_count = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn valid_config_passes() {
        let mut cfg = WorkerConfig::default();
        cfg.process.queues = vec!["default".into()];
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn background_defaults_to_false() {
        let cfg = WorkerConfig::default();
        assert!(!cfg.process.background);
    }

    #[test]
    fn term_timeout_zero_is_a_valid_degenerate_case() {
        let mut cfg = WorkerConfig::default();
        cfg.process.queues = vec!["default".into()];
        cfg.process.term_timeout_secs = 0.0;
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.process.term_timeout(), Duration::from_secs(0));
    }
}
