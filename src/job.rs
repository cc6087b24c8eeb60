//! Job Record: reservation, creation (enqueue or inline), recreation and
//! destruction of queued payloads.

use crate::error::{JobError, JobResult};
use crate::handler::HandlerRegistry;
use crate::hooks::{self, Outcome};
use crate::identity::WorkerIdentity;
use crate::payload::Payload;
use crate::store::DataStore;
use serde_json::Value;
use std::cell::Cell;

/// A reserved job: the queue it came from, its decoded payload, and a
/// (non-owning) reference to the worker executing it.
///
/// The one-shot "failure hooks ran already" guarantee (I3) is structural: a
/// single call into [`execute`] runs the hook pipeline exactly once and
/// returns after at most one failure-hook pass (see `hooks::run`), so there
/// is nothing further to guard here.
pub struct JobRecord {
    pub queue: String,
    pub payload: Payload,
    pub worker: Option<WorkerIdentity>,
}

impl JobRecord {
    /// Pop the next payload off `queue`, if any.
    pub fn reserve(store: &mut dyn DataStore, queue: &str) -> JobResult<Option<Self>> {
        match store.pop(queue)? {
            Some(raw) => Ok(Some(Self {
                queue: queue.to_string(),
                payload: Payload::decode(&raw)?,
                worker: None,
            })),
            None => Ok(None),
        }
    }

    /// Build a fresh payload and push it to `queue`.
    pub fn create(store: &mut dyn DataStore, queue: &str, class: &str, args: Vec<Value>) -> JobResult<Payload> {
        let payload = Payload::new(class, args);
        store.push(queue, &payload.encode()?)?;
        Ok(payload)
    }

    /// Build a fresh payload and execute it immediately in the caller's
    /// thread instead of enqueuing it. Round-trips through encode/decode
    /// first so inline execution sees exactly what an enqueued job would.
    pub fn create_inline(registry: &HandlerRegistry, class: &str, args: Vec<Value>) -> JobResult<Outcome> {
        let payload = Payload::new(class, args);
        let roundtripped = Payload::decode(&payload.encode()?)?;
        execute(registry, &roundtripped, &Cell::new(false))
    }

    /// Requeue this payload with the same id and `generation + 1`.
    pub fn recreate(&self, store: &mut dyn DataStore) -> JobResult<Payload> {
        let next = self.payload.recreated();
        store.push(&self.queue, &next.encode()?)?;
        Ok(next)
    }

    /// Scan `queue` linearly, removing entries whose class (and, if given,
    /// args) match. Returns the number removed.
    pub fn destroy(
        store: &mut dyn DataStore,
        queue: &str,
        class: &str,
        args: Option<&[Value]>,
    ) -> JobResult<u64> {
        let entries = store.range(queue, 0, -1)?;
        let mut removed = 0;
        for raw in entries {
            let Ok(payload) = Payload::decode(&raw) else {
                continue;
            };
            if payload.matches(class, args) {
                removed += store.remove(queue, &raw)?;
            }
        }
        Ok(removed)
    }

    /// Run this record's payload through the hook pipeline.
    pub fn execute(&self, registry: &HandlerRegistry) -> JobResult<Outcome> {
        execute(registry, &self.payload, &Cell::new(false))
    }

    /// Run the pipeline, additionally reporting whether a failure hook asked
    /// that this job's failure not be counted against the failed queue (the
    /// `skip_failed_queue` flag). Used by the child processor, which is the
    /// component that actually decides whether to record a failure.
    pub fn execute_tracking_skip(&self, registry: &HandlerRegistry) -> (JobResult<Outcome>, bool) {
        let skip = Cell::new(false);
        let result = execute(registry, &self.payload, &skip);
        (result, skip.get())
    }
}

/// Look up the handler and hooks for `payload.class` and run the pipeline,
/// filling in the class name on execution errors for diagnostics.
fn execute(registry: &HandlerRegistry, payload: &Payload, skip_failed_queue: &Cell<bool>) -> JobResult<Outcome> {
    let handler = registry.handler(&payload.class)?;
    let job_hooks = registry.hooks(&payload.class);
    let perform = move |args: &[Value]| handler.perform(args);

    match hooks::run(&job_hooks, &payload.args, &perform, skip_failed_queue) {
        Err(JobError::Execution { source, .. }) => Err(JobError::Execution {
            class: payload.class.clone(),
            source,
        }),
        other => other,
    }
}
