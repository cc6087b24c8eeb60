//! The data store adapter: typed operations against the shared key-value
//! server backing queues, the worker registry, heartbeats and counters.

pub mod redis_store;

#[cfg(test)]
pub mod memory;

use crate::error::JobResult;
use std::collections::HashMap;

pub use redis_store::RedisStore;

/// Key layout builder, namespaced under a single prefix so multiple
/// applications can share one Redis instance without colliding.
#[derive(Debug, Clone)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn queue(&self, name: &str) -> String {
        format!("{}:queue:{}", self.prefix, name)
    }

    pub fn queues_set(&self) -> String {
        format!("{}:queues", self.prefix)
    }

    pub fn workers_set(&self) -> String {
        format!("{}:workers", self.prefix)
    }

    pub fn worker_payload(&self, id: &str) -> String {
        format!("{}:worker:{}", self.prefix, id)
    }

    pub fn worker_started(&self, id: &str) -> String {
        format!("{}:worker:{}:started", self.prefix, id)
    }

    pub fn heartbeats(&self) -> String {
        format!("{}:workers:heartbeat", self.prefix)
    }

    pub fn stat(&self, name: &str) -> String {
        format!("{}:stat:{}", self.prefix, name)
    }

    pub fn prune_lock(&self) -> String {
        format!("{}:pruning_dead_worker_in_progress", self.prefix)
    }
}

/// Typed operations the rest of the runtime needs from the shared key-value
/// server. Deliberately synchronous/blocking: the process model is
/// fork-based, and each process (supervisor, each child) owns exactly one
/// connection opened after it came into being (see `reconnect`).
pub trait DataStore: Send {
    fn push(&mut self, queue: &str, payload: &str) -> JobResult<()>;
    fn pop(&mut self, queue: &str) -> JobResult<Option<String>>;
    fn range(&mut self, queue: &str, lo: isize, hi: isize) -> JobResult<Vec<String>>;
    fn remove(&mut self, queue: &str, payload: &str) -> JobResult<u64>;
    fn queues(&mut self) -> JobResult<Vec<String>>;

    fn worker_ids(&mut self) -> JobResult<Vec<String>>;
    fn worker_exists(&mut self, id: &str) -> JobResult<bool>;
    fn register(&mut self, id: &str) -> JobResult<()>;
    fn unregister(&mut self, id: &str) -> JobResult<()>;

    fn set_payload(&mut self, id: &str, encoded: &str) -> JobResult<()>;
    fn get_payload(&mut self, id: &str) -> JobResult<Option<String>>;
    fn clear_payload(&mut self, id: &str) -> JobResult<()>;
    fn workers_map(&mut self, ids: &[String]) -> JobResult<HashMap<String, Option<String>>>;

    fn heartbeat(&mut self, id: &str, time: i64) -> JobResult<()>;
    fn all_heartbeats(&mut self) -> JobResult<HashMap<String, i64>>;
    fn remove_heartbeat(&mut self, id: &str) -> JobResult<()>;
    fn server_time(&mut self) -> JobResult<i64>;

    fn acquire_prune_lock(&mut self, ttl_secs: u64) -> JobResult<bool>;

    fn counter_incr(&mut self, key: &str) -> JobResult<i64>;
    fn counter_get(&mut self, key: &str) -> JobResult<i64>;
    fn counter_clear(&mut self, key: &str) -> JobResult<()>;

    /// Re-open the underlying connection. Called on child entry after fork,
    /// and by callers that want to retry after a connectivity error.
    fn reconnect(&mut self) -> JobResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_documented_namespace() {
        let k = Keys::new("redwork");
        assert_eq!(k.queue("default"), "redwork:queue:default");
        assert_eq!(k.workers_set(), "redwork:workers");
        assert_eq!(k.worker_payload("abc"), "redwork:worker:abc");
        assert_eq!(k.heartbeats(), "redwork:workers:heartbeat");
        assert_eq!(k.stat("processed"), "redwork:stat:processed");
        assert_eq!(k.prune_lock(), "redwork:pruning_dead_worker_in_progress");
    }
}
