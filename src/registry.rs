//! Semantic worker-registry operations layered over the data store adapter:
//! register/unregister, working-payload bookkeeping, dirty-exit recording.

use crate::error::{JobError, JobResult};
use crate::payload::Payload;
use crate::stats;
use crate::store::DataStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Who detected the dirty exit being recorded by [`unregister`]: the worker
/// itself, or the pruner judging it dead from elsewhere. Kept distinct
/// because they carry different causes in the job failure taxonomy (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyExitCause {
    SelfDetected,
    PruneDeadWorker,
}

/// The value stored at `worker:<id>` while a worker is executing a job.
/// Its presence is exactly what I1 means by "working".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingPayload {
    pub queue: String,
    pub run_at: i64,
    pub payload: Payload,
}

impl WorkingPayload {
    /// `run_at` rendered as a UTC timestamp, for logging.
    pub fn started_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.run_at, 0).unwrap_or_else(Utc::now)
    }
}

pub fn register(store: &mut dyn DataStore, id: &str) -> JobResult<()> {
    store.register(id)
}

/// Unregister `id`, recording a dirty-exit failure if it still held a
/// working payload (the orphaned job is counted as failed) before clearing
/// the worker's own counters and registry entries (§7, I1). `cause`
/// distinguishes a worker unregistering itself from the pruner unregistering
/// one it judged dead, tagging the dirty-exit cause named in the failure
/// taxonomy rather than just incrementing the counter blind to why.
pub fn unregister(store: &mut dyn DataStore, id: &str, cause: DirtyExitCause) -> JobResult<()> {
    if let Some(raw) = store.get_payload(id)? {
        if !raw.is_empty() {
            let err = match cause {
                DirtyExitCause::SelfDetected => JobError::DirtyExit(id.to_string()),
                DirtyExitCause::PruneDeadWorker => JobError::PruneDeadWorkerDirtyExit(id.to_string()),
            };
            warn!(worker = id, cause = %err, "unregistering worker with a dirty working payload");
            stats::record_failed(store, id)?;
        }
    }
    store.unregister(id)
}

pub fn mark_working(store: &mut dyn DataStore, id: &str, queue: &str, payload: &Payload) -> JobResult<()> {
    let now = store.server_time()?;
    let working = WorkingPayload {
        queue: queue.to_string(),
        run_at: now,
        payload: payload.clone(),
    };
    store.set_payload(id, &serde_json::to_string(&working)?)
}

pub fn clear_working(store: &mut dyn DataStore, id: &str) -> JobResult<()> {
    store.clear_payload(id)
}

pub fn working_payload(store: &mut dyn DataStore, id: &str) -> JobResult<Option<WorkingPayload>> {
    match store.get_payload(id)? {
        Some(raw) if !raw.is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
        _ => Ok(None),
    }
}

pub fn stamp_heartbeat(store: &mut dyn DataStore, id: &str) -> JobResult<()> {
    let now = store.server_time()?;
    store.heartbeat(id, now)
}
