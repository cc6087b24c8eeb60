//! Dead-worker pruning: detects workers whose heartbeat expired or whose
//! claimed PID is no longer live on this host, and removes them.

use crate::error::JobResult;
use crate::identity::WorkerIdentity;
use crate::registry;
use crate::store::DataStore;
use std::collections::HashSet;
use std::time::Duration;
use tracing::info;

/// Collect the PIDs of `redworkd`-titled processes currently running on this
/// host, via an OS process listing filtered by title pattern. Used as the
/// "is this worker still actually alive here" check in the soft-prune rule.
pub fn collect_live_pids(title_pattern: &str) -> HashSet<u32> {
    use sysinfo::System;
    let mut sys = System::new_all();
    sys.refresh_all();
    sys.processes()
        .iter()
        .filter(|(_, proc)| {
            proc.name().to_string_lossy().contains(title_pattern)
                || proc
                    .cmd()
                    .iter()
                    .any(|arg| arg.to_string_lossy().contains(title_pattern))
        })
        .map(|(pid, _)| pid.as_u32())
        .collect()
}

/// Run one prune pass. Skips entirely if the distributed lock isn't
/// acquired. `live_pids` is the set of worker PIDs observed alive on this
/// host (see [`collect_live_pids`]); passed in so the decision rules below
/// are unit-testable without a real process listing.
pub fn run(
    store: &mut dyn DataStore,
    this: &WorkerIdentity,
    prune_interval: Duration,
    lock_ttl: Duration,
    live_pids: &HashSet<u32>,
) -> JobResult<()> {
    if !store.acquire_prune_lock(lock_ttl.as_secs())? {
        return Ok(());
    }

    let now = store.server_time()?;
    let heartbeats = store.all_heartbeats()?;
    let worker_ids = store.worker_ids()?;

    for raw_id in worker_ids {
        let Some(w) = WorkerIdentity::parse(&raw_id) else {
            continue;
        };

        if let Some(&last) = heartbeats.get(&raw_id) {
            if now - last > prune_interval.as_secs() as i64 {
                info!(worker = %raw_id, "pruning dead worker: heartbeat expired");
                registry::unregister(store, &raw_id, registry::DirtyExitCause::PruneDeadWorker)?;
                continue;
            }
        }
        // Workers that never heartbeated fall through here untouched by the
        // expiry rule (I6, B3); they may still be soft-pruned below.

        if w.host != this.host {
            continue;
        }
        if w.queues != this.queues && !this.watches_all() {
            continue;
        }
        if !live_pids.contains(&w.pid) {
            if let Ok(Some(working)) = registry::working_payload(store, &raw_id) {
                info!(
                    worker = %raw_id,
                    class = %working.payload.class,
                    started_at = %working.started_at(),
                    "pruning dead worker: pid not live on this host, abandoning its working job"
                );
            } else {
                info!(worker = %raw_id, "pruning dead worker: pid not live on this host");
            }
            registry::unregister(store, &raw_id, registry::DirtyExitCause::PruneDeadWorker)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn lock_ttl() -> Duration {
        Duration::from_secs(30)
    }

    #[test]
    fn heartbeat_expired_worker_is_pruned_with_dirty_cause() {
        let mut store = MemoryStore::new();
        let dead = WorkerIdentity::new("host1", 999, vec!["qA".into()]);
        store.register(&dead.as_key()).unwrap();
        store.heartbeat(&dead.as_key(), 0).unwrap();
        store.advance_clock(120);

        let this = WorkerIdentity::new("host1", 1, vec!["qA".into()]);
        run(&mut store, &this, Duration::from_secs(60), lock_ttl(), &HashSet::new()).unwrap();

        assert!(!store.worker_exists(&dead.as_key()).unwrap());
    }

    #[test]
    fn never_heartbeated_worker_is_not_pruned_by_expiry() {
        let mut store = MemoryStore::new();
        let w = WorkerIdentity::new("host1", 999, vec!["qA".into()]);
        store.register(&w.as_key()).unwrap();
        store.advance_clock(1_000_000);

        let this = WorkerIdentity::new("host1", 1, vec!["qA".into()]);
        let mut live = HashSet::new();
        live.insert(999);
        run(&mut store, &this, Duration::from_secs(60), lock_ttl(), &live).unwrap();

        assert!(store.worker_exists(&w.as_key()).unwrap());
    }

    #[test]
    fn different_host_is_never_pruned_by_pid_absence() {
        let mut store = MemoryStore::new();
        let w = WorkerIdentity::new("host1", 999, vec!["qA".into()]);
        store.register(&w.as_key()).unwrap();

        let this = WorkerIdentity::new("host2", 1, vec!["qA".into()]);
        run(&mut store, &this, Duration::from_secs(60), lock_ttl(), &HashSet::new()).unwrap();

        assert!(store.worker_exists(&w.as_key()).unwrap());
    }

    #[test]
    fn same_host_watching_queue_with_pid_absent_is_soft_pruned() {
        let mut store = MemoryStore::new();
        let w = WorkerIdentity::new("host1", 999, vec!["qA".into()]);
        store.register(&w.as_key()).unwrap();

        let this = WorkerIdentity::new("host1", 1, vec!["qA".into()]);
        run(&mut store, &this, Duration::from_secs(60), lock_ttl(), &HashSet::new()).unwrap();

        assert!(!store.worker_exists(&w.as_key()).unwrap());
    }

    #[test]
    fn different_queues_without_wildcard_is_skipped() {
        let mut store = MemoryStore::new();
        let w = WorkerIdentity::new("host1", 999, vec!["qB".into()]);
        store.register(&w.as_key()).unwrap();

        let this = WorkerIdentity::new("host1", 1, vec!["qA".into()]);
        run(&mut store, &this, Duration::from_secs(60), lock_ttl(), &HashSet::new()).unwrap();

        assert!(store.worker_exists(&w.as_key()).unwrap());
    }

    #[test]
    fn second_prune_on_already_pruned_fleet_is_a_no_op() {
        let mut store = MemoryStore::new();
        let this = WorkerIdentity::new("host1", 1, vec!["qA".into()]);
        run(&mut store, &this, Duration::from_secs(60), lock_ttl(), &HashSet::new()).unwrap();
        store.advance_clock(31); // release the lock so a second pass can acquire it
        run(&mut store, &this, Duration::from_secs(60), lock_ttl(), &HashSet::new()).unwrap();
        assert!(store.worker_ids().unwrap().is_empty());
    }

    #[test]
    fn skipped_when_lock_not_acquired() {
        let mut store = MemoryStore::new();
        let w = WorkerIdentity::new("host1", 999, vec!["qA".into()]);
        store.register(&w.as_key()).unwrap();
        // Hold the lock ourselves first.
        assert!(store.acquire_prune_lock(60).unwrap());

        let this = WorkerIdentity::new("host1", 1, vec!["qA".into()]);
        run(&mut store, &this, Duration::from_secs(60), lock_ttl(), &HashSet::new()).unwrap();

        assert!(store.worker_exists(&w.as_key()).unwrap());
    }
}
