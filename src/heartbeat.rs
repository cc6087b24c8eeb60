//! Heartbeat loop: a background thread that stamps the registry on a
//! cadence and clears its own entry on exit. The wait is interruptible via a
//! channel so teardown does not have to wait out a full cadence.

use crate::identity::WorkerIdentity;
use crate::registry;
use crate::store::DataStore;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

pub struct HeartbeatHandle {
    stop_tx: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

/// Start the loop on its own thread, taking ownership of a dedicated store
/// connection (never the supervisor's own).
pub fn spawn(
    mut store: Box<dyn DataStore>,
    identity: WorkerIdentity,
    interval: Duration,
) -> HeartbeatHandle {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let id = identity.as_key();

    let join = thread::spawn(move || {
        loop {
            if let Err(e) = registry::stamp_heartbeat(store.as_mut(), &id) {
                warn!(worker = %id, error = %e, "heartbeat stamp failed");
            }
            metrics::gauge!("redwork_heartbeat_age_seconds").set(0.0);
            match stop_rx.recv_timeout(interval) {
                Ok(()) => break,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
            }
        }
        if let Err(e) = store.remove_heartbeat(&id) {
            warn!(worker = %id, error = %e, "failed to clear heartbeat on exit");
        }
    });

    HeartbeatHandle {
        stop_tx,
        join: Some(join),
    }
}

impl HeartbeatHandle {
    /// Signal the loop to stop and block until its final heartbeat-clear
    /// completes.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::{Arc, Mutex};

    #[test]
    fn stamps_then_clears_heartbeat_on_stop() {
        let shared = Arc::new(Mutex::new(MemoryStore::new()));
        let identity = WorkerIdentity::new("host", 1, vec!["q".into()]);
        shared.lock().unwrap().register(&identity.as_key()).unwrap();

        struct Proxy(Arc<Mutex<MemoryStore>>);
        impl DataStore for Proxy {
            fn push(&mut self, q: &str, p: &str) -> crate::error::JobResult<()> {
                self.0.lock().unwrap().push(q, p)
            }
            fn pop(&mut self, q: &str) -> crate::error::JobResult<Option<String>> {
                self.0.lock().unwrap().pop(q)
            }
            fn range(&mut self, q: &str, lo: isize, hi: isize) -> crate::error::JobResult<Vec<String>> {
                self.0.lock().unwrap().range(q, lo, hi)
            }
            fn remove(&mut self, q: &str, p: &str) -> crate::error::JobResult<u64> {
                self.0.lock().unwrap().remove(q, p)
            }
            fn queues(&mut self) -> crate::error::JobResult<Vec<String>> {
                self.0.lock().unwrap().queues()
            }
            fn worker_ids(&mut self) -> crate::error::JobResult<Vec<String>> {
                self.0.lock().unwrap().worker_ids()
            }
            fn worker_exists(&mut self, id: &str) -> crate::error::JobResult<bool> {
                self.0.lock().unwrap().worker_exists(id)
            }
            fn register(&mut self, id: &str) -> crate::error::JobResult<()> {
                self.0.lock().unwrap().register(id)
            }
            fn unregister(&mut self, id: &str) -> crate::error::JobResult<()> {
                self.0.lock().unwrap().unregister(id)
            }
            fn set_payload(&mut self, id: &str, enc: &str) -> crate::error::JobResult<()> {
                self.0.lock().unwrap().set_payload(id, enc)
            }
            fn get_payload(&mut self, id: &str) -> crate::error::JobResult<Option<String>> {
                self.0.lock().unwrap().get_payload(id)
            }
            fn clear_payload(&mut self, id: &str) -> crate::error::JobResult<()> {
                self.0.lock().unwrap().clear_payload(id)
            }
            fn workers_map(
                &mut self,
                ids: &[String],
            ) -> crate::error::JobResult<std::collections::HashMap<String, Option<String>>> {
                self.0.lock().unwrap().workers_map(ids)
            }
            fn heartbeat(&mut self, id: &str, t: i64) -> crate::error::JobResult<()> {
                self.0.lock().unwrap().heartbeat(id, t)
            }
            fn all_heartbeats(&mut self) -> crate::error::JobResult<std::collections::HashMap<String, i64>> {
                self.0.lock().unwrap().all_heartbeats()
            }
            fn remove_heartbeat(&mut self, id: &str) -> crate::error::JobResult<()> {
                self.0.lock().unwrap().remove_heartbeat(id)
            }
            fn server_time(&mut self) -> crate::error::JobResult<i64> {
                self.0.lock().unwrap().server_time()
            }
            fn acquire_prune_lock(&mut self, ttl: u64) -> crate::error::JobResult<bool> {
                self.0.lock().unwrap().acquire_prune_lock(ttl)
            }
            fn counter_incr(&mut self, k: &str) -> crate::error::JobResult<i64> {
                self.0.lock().unwrap().counter_incr(k)
            }
            fn counter_get(&mut self, k: &str) -> crate::error::JobResult<i64> {
                self.0.lock().unwrap().counter_get(k)
            }
            fn counter_clear(&mut self, k: &str) -> crate::error::JobResult<()> {
                self.0.lock().unwrap().counter_clear(k)
            }
            fn reconnect(&mut self) -> crate::error::JobResult<()> {
                Ok(())
            }
        }

        let mut handle = spawn(
            Box::new(Proxy(shared.clone())),
            identity.clone(),
            Duration::from_millis(20),
        );
        thread::sleep(Duration::from_millis(60));
        handle.stop();

        let heartbeats = shared.lock().unwrap().all_heartbeats().unwrap();
        assert!(!heartbeats.contains_key(&identity.as_key()));
    }
}
