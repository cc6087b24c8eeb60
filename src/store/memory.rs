//! In-memory `DataStore` double used by unit tests so resolver, registry and
//! pruner logic can be exercised without a live Redis server.

use super::DataStore;
use crate::error::JobResult;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Default)]
pub struct MemoryStore {
    queues: HashMap<String, VecDeque<String>>,
    workers: HashSet<String>,
    payloads: HashMap<String, String>,
    heartbeats: HashMap<String, i64>,
    counters: HashMap<String, i64>,
    prune_lock_held_until: Option<i64>,
    clock: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the fake clock; used by tests that exercise heartbeat expiry.
    pub fn advance_clock(&mut self, secs: i64) {
        self.clock += secs;
    }
}

impl DataStore for MemoryStore {
    fn push(&mut self, queue: &str, payload: &str) -> JobResult<()> {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        Ok(())
    }

    fn pop(&mut self, queue: &str) -> JobResult<Option<String>> {
        Ok(self.queues.get_mut(queue).and_then(|q| q.pop_front()))
    }

    fn range(&mut self, queue: &str, lo: isize, hi: isize) -> JobResult<Vec<String>> {
        let Some(q) = self.queues.get(queue) else {
            return Ok(Vec::new());
        };
        let len = q.len() as isize;
        let norm = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len)
            }
        };
        let (lo, hi) = (norm(lo), norm(hi));
        if lo > hi {
            return Ok(Vec::new());
        }
        Ok(q.iter()
            .skip(lo as usize)
            .take((hi - lo + 1) as usize)
            .cloned()
            .collect())
    }

    fn remove(&mut self, queue: &str, payload: &str) -> JobResult<u64> {
        let Some(q) = self.queues.get_mut(queue) else {
            return Ok(0);
        };
        let before = q.len();
        q.retain(|p| p != payload);
        Ok((before - q.len()) as u64)
    }

    fn queues(&mut self) -> JobResult<Vec<String>> {
        Ok(self.queues.keys().cloned().collect())
    }

    fn worker_ids(&mut self) -> JobResult<Vec<String>> {
        Ok(self.workers.iter().cloned().collect())
    }

    fn worker_exists(&mut self, id: &str) -> JobResult<bool> {
        Ok(self.workers.contains(id))
    }

    fn register(&mut self, id: &str) -> JobResult<()> {
        self.workers.insert(id.to_string());
        Ok(())
    }

    fn unregister(&mut self, id: &str) -> JobResult<()> {
        self.workers.remove(id);
        self.payloads.remove(id);
        self.heartbeats.remove(id);
        self.counters.remove(&format!("processed:{id}"));
        self.counters.remove(&format!("failed:{id}"));
        Ok(())
    }

    fn set_payload(&mut self, id: &str, encoded: &str) -> JobResult<()> {
        self.payloads.insert(id.to_string(), encoded.to_string());
        Ok(())
    }

    fn get_payload(&mut self, id: &str) -> JobResult<Option<String>> {
        Ok(self.payloads.get(id).cloned())
    }

    fn clear_payload(&mut self, id: &str) -> JobResult<()> {
        self.payloads.remove(id);
        Ok(())
    }

    fn workers_map(&mut self, ids: &[String]) -> JobResult<HashMap<String, Option<String>>> {
        Ok(ids
            .iter()
            .map(|id| (id.clone(), self.payloads.get(id).cloned()))
            .collect())
    }

    fn heartbeat(&mut self, id: &str, time: i64) -> JobResult<()> {
        self.heartbeats.insert(id.to_string(), time);
        Ok(())
    }

    fn all_heartbeats(&mut self) -> JobResult<HashMap<String, i64>> {
        Ok(self.heartbeats.clone())
    }

    fn remove_heartbeat(&mut self, id: &str) -> JobResult<()> {
        self.heartbeats.remove(id);
        Ok(())
    }

    fn server_time(&mut self) -> JobResult<i64> {
        Ok(self.clock)
    }

    fn acquire_prune_lock(&mut self, ttl_secs: u64) -> JobResult<bool> {
        if let Some(until) = self.prune_lock_held_until {
            if until > self.clock {
                return Ok(false);
            }
        }
        self.prune_lock_held_until = Some(self.clock + ttl_secs as i64);
        Ok(true)
    }

    fn counter_incr(&mut self, key: &str) -> JobResult<i64> {
        let v = self.counters.entry(key.to_string()).or_insert(0);
        *v += 1;
        Ok(*v)
    }

    fn counter_get(&mut self, key: &str) -> JobResult<i64> {
        Ok(self.counters.get(key).copied().unwrap_or(0))
    }

    fn counter_clear(&mut self, key: &str) -> JobResult<()> {
        self.counters.remove(key);
        Ok(())
    }

    fn reconnect(&mut self) -> JobResult<()> {
        Ok(())
    }
}
