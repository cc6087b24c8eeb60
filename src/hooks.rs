//! Before/around/after/failure hook composition and execution.
//!
//! Execution order for a successful job: all before hooks, then the nested
//! around-hook stack (outermost first, innermost invokes `perform`), then
//! all after hooks. A before hook may abort cleanly via `DontPerform`. Any
//! other error runs the failure hooks exactly once, then is returned to the
//! caller (the child processor).

use crate::error::{JobError, JobResult};
use serde_json::Value;
use std::cell::Cell;
use std::sync::Arc;

pub type BeforeHook = Arc<dyn Fn(&[Value]) -> JobResult<()> + Send + Sync>;
pub type AroundHook =
    Arc<dyn Fn(&[Value], &dyn Fn(&[Value]) -> anyhow::Result<()>) -> anyhow::Result<()> + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(&[Value]) -> anyhow::Result<()> + Send + Sync>;
/// A failure hook gets the error, the args, and a flag it may set to ask the
/// child processor to not count this job against the failed queue.
pub type FailureHook =
    Arc<dyn Fn(&anyhow::Error, &[Value], &Cell<bool>) -> anyhow::Result<()> + Send + Sync>;

/// The hook sets discovered for one job class, in discovery order.
#[derive(Clone, Default)]
pub struct JobHooks {
    pub before: Vec<BeforeHook>,
    pub around: Vec<AroundHook>,
    pub after: Vec<AfterHook>,
    pub failure: Vec<FailureHook>,
}

impl JobHooks {
    pub fn before(mut self, hook: impl Fn(&[Value]) -> JobResult<()> + Send + Sync + 'static) -> Self {
        self.before.push(Arc::new(hook));
        self
    }

    pub fn around(
        mut self,
        hook: impl Fn(&[Value], &dyn Fn(&[Value]) -> anyhow::Result<()>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.around.push(Arc::new(hook));
        self
    }

    pub fn after(mut self, hook: impl Fn(&[Value]) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        self.after.push(Arc::new(hook));
        self
    }

    pub fn on_failure(
        mut self,
        hook: impl Fn(&anyhow::Error, &[Value], &Cell<bool>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.failure.push(Arc::new(hook));
        self
    }
}

/// Outcome of running the pipeline once. `DontPerform` is distinguished from
/// `Success` so the child processor can avoid counting it as processed.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    DontPerform,
}

/// Run the full pipeline for one job. `perform` is the class's handler body.
/// `skip_failed_queue` starts at `false`; a failure hook may set it to ask
/// the caller not to count this job's failure against the failed queue.
pub fn run(
    hooks: &JobHooks,
    args: &[Value],
    perform: &dyn Fn(&[Value]) -> anyhow::Result<()>,
    skip_failed_queue: &Cell<bool>,
) -> JobResult<Outcome> {
    for before in &hooks.before {
        match before(args) {
            Ok(()) => {}
            Err(JobError::DontPerform) => return Ok(Outcome::DontPerform),
            Err(e) => return fail_once(hooks, anyhow::Error::new(e), args, skip_failed_queue),
        }
    }

    // Fold the around hooks right-to-left so the first-registered hook is
    // outermost and the innermost link finally calls `perform`.
    let chained: Box<dyn Fn(&[Value]) -> anyhow::Result<()> + '_> =
        hooks.around.iter().rev().fold(
            Box::new(move |a: &[Value]| perform(a)) as Box<dyn Fn(&[Value]) -> anyhow::Result<()>>,
            |inner, around| {
                let around = around.clone();
                Box::new(move |a: &[Value]| around(a, inner.as_ref()))
            },
        );

    if let Err(e) = chained(args) {
        return fail_once(hooks, e, args, skip_failed_queue);
    }

    for after in &hooks.after {
        if let Err(e) = after(args) {
            return fail_once(hooks, e, args, skip_failed_queue);
        }
    }

    Ok(Outcome::Success)
}

/// Run every failure hook exactly once for this error, then return the
/// original error (or a composite naming both, if a failure hook itself
/// errored).
fn fail_once(
    hooks: &JobHooks,
    original: anyhow::Error,
    args: &[Value],
    skip_failed_queue: &Cell<bool>,
) -> JobResult<Outcome> {
    let mut secondary = None;
    for hook in &hooks.failure {
        if let Err(e) = hook(&original, args, skip_failed_queue) {
            secondary.get_or_insert(e);
        }
    }

    match secondary {
        Some(e) => Err(JobError::CompositeFailure {
            original: original.to_string(),
            secondary: e.to_string(),
        }),
        None => Err(JobError::Execution {
            class: String::new(),
            source: original,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn ok_perform(_args: &[Value]) -> anyhow::Result<()> {
        Ok(())
    }

    fn failing_perform(_args: &[Value]) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("boom"))
    }

    #[test]
    fn success_runs_before_around_after_in_order() {
        let trace = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let t1 = trace.clone();
        let t2 = trace.clone();
        let t3 = trace.clone();
        let hooks = JobHooks::default()
            .before(move |_| {
                t1.lock().push("before");
                Ok(())
            })
            .around(move |args, inner| {
                t2.lock().push("around-pre");
                let r = inner(args);
                t2.lock().push("around-post");
                r
            })
            .after(move |_| {
                t3.lock().push("after");
                Ok(())
            });

        let outcome = run(&hooks, &[], &ok_perform, &Cell::new(false)).unwrap();
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(
            *trace.lock(),
            vec!["before", "around-pre", "around-post", "after"]
        );
    }

    #[test]
    fn dont_perform_skips_perform_after_and_failure() {
        let after_ran = Arc::new(Mutex::new(false));
        let failure_ran = Arc::new(Mutex::new(false));
        let a = after_ran.clone();
        let f = failure_ran.clone();
        let hooks = JobHooks::default()
            .before(|_| Err(JobError::DontPerform))
            .after(move |_| {
                *a.lock() = true;
                Ok(())
            })
            .on_failure(move |_, _, _| {
                *f.lock() = true;
                Ok(())
            });

        let outcome = run(&hooks, &[], &failing_perform, &Cell::new(false)).unwrap();
        assert_eq!(outcome, Outcome::DontPerform);
        assert!(!*after_ran.lock());
        assert!(!*failure_ran.lock());
    }

    #[test]
    fn perform_failure_runs_failure_hooks_exactly_once() {
        let calls = Arc::new(Mutex::new(0u32));
        let c = calls.clone();
        let hooks = JobHooks::default().on_failure(move |_, _, _| {
            *c.lock() += 1;
            Ok(())
        });

        let err = run(&hooks, &[json!("x")], &failing_perform, &Cell::new(false)).unwrap_err();
        assert!(matches!(err, JobError::Execution { .. }));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn failure_hook_error_produces_composite_and_still_marks_one_shot() {
        let calls = Arc::new(Mutex::new(0u32));
        let c = calls.clone();
        let hooks = JobHooks::default().on_failure(move |_, _, _| {
            *c.lock() += 1;
            Err(anyhow::anyhow!("hook blew up"))
        });

        let err = run(&hooks, &[], &failing_perform, &Cell::new(false)).unwrap_err();
        match err {
            JobError::CompositeFailure { original, secondary } => {
                assert!(original.contains("boom"));
                assert!(secondary.contains("hook blew up"));
            }
            other => panic!("expected CompositeFailure, got {other:?}"),
        }
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn after_hook_error_also_triggers_failure_pipeline() {
        let failure_ran = Arc::new(Mutex::new(false));
        let f = failure_ran.clone();
        let hooks = JobHooks::default()
            .after(|_| Err(anyhow::anyhow!("after blew up")))
            .on_failure(move |_, _, _| {
                *f.lock() = true;
                Ok(())
            });

        let err = run(&hooks, &[], &ok_perform, &Cell::new(false)).unwrap_err();
        assert!(matches!(err, JobError::Execution { .. }));
        assert!(*failure_ran.lock());
    }

    #[test]
    fn failure_hook_can_request_skip_failed_queue() {
        let hooks = JobHooks::default().on_failure(|_, _, skip| {
            skip.set(true);
            Ok(())
        });

        let skip = Cell::new(false);
        let err = run(&hooks, &[], &failing_perform, &skip).unwrap_err();
        assert!(matches!(err, JobError::Execution { .. }));
        assert!(skip.get());
    }
}
