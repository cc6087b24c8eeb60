//! Statistics: monotone processed/failed counters, global and per-worker.

use crate::error::JobResult;
use crate::store::DataStore;

pub fn record_processed(store: &mut dyn DataStore, worker_id: &str) -> JobResult<()> {
    store.counter_incr("processed")?;
    store.counter_incr(&format!("processed:{worker_id}"))?;
    metrics::counter!("redwork_jobs_processed_total").increment(1);
    Ok(())
}

pub fn record_failed(store: &mut dyn DataStore, worker_id: &str) -> JobResult<()> {
    store.counter_incr("failed")?;
    store.counter_incr(&format!("failed:{worker_id}"))?;
    metrics::counter!("redwork_jobs_failed_total").increment(1);
    Ok(())
}

pub fn processed(store: &mut dyn DataStore) -> JobResult<i64> {
    store.counter_get("processed")
}

pub fn failed(store: &mut dyn DataStore) -> JobResult<i64> {
    store.counter_get("failed")
}
