//! Error taxonomy for the worker runtime.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type JobResult<T> = Result<T, JobError>;

/// Errors produced by the worker runtime.
#[derive(Debug, Error)]
pub enum JobError {
    /// Rejected at construction: empty queue list, `thread_count != 1`, etc.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The data store connection could not be (re-)established.
    #[error("data store connectivity error: {0}")]
    Connection(String),

    /// Underlying Redis client error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON encode/decode failure on a job payload.
    #[error("payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// No handler registered for the class name carried by a payload.
    #[error("no handler registered for job class '{0}'")]
    NoHandler(String),

    /// A job's `perform` raised. Carries the class name for context.
    #[error("job '{class}' failed: {source}")]
    Execution {
        class: String,
        #[source]
        source: anyhow::Error,
    },

    /// A before-hook asked that the job not be performed at all. Not a failure:
    /// swallowed by the child processor, never counted as processed or failed.
    #[error("job execution aborted by before-hook (DontPerform)")]
    DontPerform,

    /// An error was raised while running failure hooks themselves. Names both
    /// the original failure and the secondary one, per the one-shot contract.
    #[error("failure hook raised '{secondary}' while handling original error '{original}'")]
    CompositeFailure {
        original: String,
        secondary: String,
    },

    /// A worker unregistered itself (normal teardown, signal handling, a
    /// failed reconnect) while still holding a working payload.
    #[error("dirty exit: {0}")]
    DirtyExit(String),

    /// The pruner unregistered a worker it judged dead (expired heartbeat or
    /// a PID no longer live on its host) while that worker still held a
    /// working payload.
    #[error("prune dead worker dirty exit: {0}")]
    PruneDeadWorkerDirtyExit(String),
}

impl JobError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        JobError::Configuration(msg.into())
    }
}
