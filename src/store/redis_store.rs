//! Redis-backed `DataStore`. One connection per process; never shared
//! across a fork (see `reconnect`, invoked fresh by every child on entry).

use super::{DataStore, Keys};
use crate::error::{JobError, JobResult};
use redis::Commands;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

const RECONNECT_ATTEMPTS: u32 = 3;
const RECONNECT_BACKOFF: Duration = Duration::from_millis(200);

pub struct RedisStore {
    client: redis::Client,
    conn: redis::Connection,
    keys: Keys,
}

impl RedisStore {
    pub fn connect(url: &str, key_prefix: &str) -> JobResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| JobError::Connection(format!("invalid redis url '{url}': {e}")))?;
        let conn = client
            .get_connection()
            .map_err(|e| JobError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            conn,
            keys: Keys::new(key_prefix),
        })
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }
}

impl DataStore for RedisStore {
    fn push(&mut self, queue: &str, payload: &str) -> JobResult<()> {
        let _: () = self.conn.rpush(self.keys.queue(queue), payload)?;
        let _: () = self.conn.sadd(self.keys.queues_set(), queue)?;
        Ok(())
    }

    fn pop(&mut self, queue: &str) -> JobResult<Option<String>> {
        Ok(self.conn.lpop(self.keys.queue(queue), None)?)
    }

    fn range(&mut self, queue: &str, lo: isize, hi: isize) -> JobResult<Vec<String>> {
        Ok(self.conn.lrange(self.keys.queue(queue), lo, hi)?)
    }

    fn remove(&mut self, queue: &str, payload: &str) -> JobResult<u64> {
        Ok(self.conn.lrem(self.keys.queue(queue), 0, payload)?)
    }

    fn queues(&mut self) -> JobResult<Vec<String>> {
        Ok(self.conn.smembers(self.keys.queues_set())?)
    }

    fn worker_ids(&mut self) -> JobResult<Vec<String>> {
        Ok(self.conn.smembers(self.keys.workers_set())?)
    }

    fn worker_exists(&mut self, id: &str) -> JobResult<bool> {
        Ok(self.conn.sismember(self.keys.workers_set(), id)?)
    }

    fn register(&mut self, id: &str) -> JobResult<()> {
        let _: () = self.conn.sadd(self.keys.workers_set(), id)?;
        let now = self.server_time()?;
        let _: () = self.conn.set(self.keys.worker_started(id), now)?;
        Ok(())
    }

    fn unregister(&mut self, id: &str) -> JobResult<()> {
        let _: () = self.conn.srem(self.keys.workers_set(), id)?;
        let _: () = self.conn.del(self.keys.worker_payload(id))?;
        let _: () = self.conn.hdel(self.keys.heartbeats(), id)?;
        let _: () = self.conn.del(self.keys.worker_started(id))?;
        self.counter_clear(&format!("processed:{id}"))?;
        self.counter_clear(&format!("failed:{id}"))?;
        Ok(())
    }

    fn set_payload(&mut self, id: &str, encoded: &str) -> JobResult<()> {
        Ok(self.conn.set(self.keys.worker_payload(id), encoded)?)
    }

    fn get_payload(&mut self, id: &str) -> JobResult<Option<String>> {
        Ok(self.conn.get(self.keys.worker_payload(id))?)
    }

    fn clear_payload(&mut self, id: &str) -> JobResult<()> {
        Ok(self.conn.del(self.keys.worker_payload(id))?)
    }

    fn workers_map(&mut self, ids: &[String]) -> JobResult<HashMap<String, Option<String>>> {
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            out.insert(id.clone(), self.get_payload(id)?);
        }
        Ok(out)
    }

    fn heartbeat(&mut self, id: &str, time: i64) -> JobResult<()> {
        Ok(self.conn.hset(self.keys.heartbeats(), id, time)?)
    }

    fn all_heartbeats(&mut self) -> JobResult<HashMap<String, i64>> {
        Ok(self.conn.hgetall(self.keys.heartbeats())?)
    }

    fn remove_heartbeat(&mut self, id: &str) -> JobResult<()> {
        Ok(self.conn.hdel(self.keys.heartbeats(), id)?)
    }

    fn server_time(&mut self) -> JobResult<i64> {
        let (secs, _micros): (i64, i64) = redis::cmd("TIME").query(&mut self.conn)?;
        Ok(secs)
    }

    fn acquire_prune_lock(&mut self, ttl_secs: u64) -> JobResult<bool> {
        // Atomic set-if-absent-with-expiry: SET key 1 NX EX ttl. Never a
        // get-then-set pair, so a crashed holder releases on its own.
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.keys.prune_lock())
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query(&mut self.conn)?;
        Ok(reply.is_some())
    }

    fn counter_incr(&mut self, key: &str) -> JobResult<i64> {
        Ok(self.conn.incr(self.keys.stat(key), 1)?)
    }

    fn counter_get(&mut self, key: &str) -> JobResult<i64> {
        let v: Option<i64> = self.conn.get(self.keys.stat(key))?;
        Ok(v.unwrap_or(0))
    }

    fn counter_clear(&mut self, key: &str) -> JobResult<()> {
        Ok(self.conn.del(self.keys.stat(key))?)
    }

    fn reconnect(&mut self) -> JobResult<()> {
        let mut last_err = None;
        for attempt in 1..=RECONNECT_ATTEMPTS {
            match self.client.get_connection() {
                Ok(conn) => {
                    self.conn = conn;
                    return Ok(());
                }
                Err(e) => {
                    last_err = Some(e);
                    thread::sleep(RECONNECT_BACKOFF * attempt);
                }
            }
        }
        Err(JobError::Connection(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }
}
