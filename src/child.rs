//! Child Processor: pulls one job at a time off its resolved queues and
//! runs it, up to `jobs_per_fork` times, then exits for the supervisor to
//! refork a replacement.
//!
//! There is no async runtime here to cancel a stuck handler mid-flight, so
//! each job is itself run in a freshly forked grandchild process. TERM
//! forwarded down from the supervisor (or raised here directly) is relayed
//! to that grandchild, followed by SIGKILL once `term_timeout` elapses —
//! the same fork-and-bound-wait shape used for sandboxing a single
//! execution elsewhere in this codebase, just one level deeper.

use crate::config::WorkerConfig;
use crate::handler::HandlerRegistry;
use crate::hooks::Outcome;
use crate::identity::WorkerIdentity;
use crate::job::JobRecord;
use crate::proctitle;
use crate::registry;
use crate::resolver::QueueResolver;
use crate::signals::{self, SignalFlags};
use crate::stats;
use crate::store::{DataStore, RedisStore};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use rand::{RngCore, SeedableRng};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Exit status conventions for the per-job grandchild process.
mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const DONT_PERFORM: i32 = 2;
    pub const FAILURE_SKIP_QUEUE: i32 = 3;
}

enum JobOutcome {
    Success,
    DontPerform,
    Failed { skip_failed_queue: bool },
    Abandoned,
}

/// Run the child processor loop. Returns the process exit code.
pub fn run(cfg: &WorkerConfig, identity: WorkerIdentity, registry: Arc<HandlerRegistry>) -> i32 {
    // A forked process inherits its parent's thread-local RNG state verbatim
    // (fork only copies memory, it does not re-seed); reseed from fresh OS
    // entropy here so sibling children don't draw correlated jitter.
    let mut rng = rand::rngs::StdRng::from_entropy();
    let _ = rng.next_u64();

    let mut store = match RedisStore::connect(&cfg.redis.url, &cfg.redis.key_prefix) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "child failed to connect to data store");
            return 1;
        }
    };

    let resolver = match QueueResolver::new(cfg.process.queues.clone()) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "child failed to build queue resolver");
            return 1;
        }
    };

    let flags = SignalFlags::new();
    let mut watcher = match signals::install(flags.clone(), |_sig| {}) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!(error = %e, "child failed to install its own signal handlers");
            None
        }
    };

    let id_key = identity.as_key();
    let prefix = &cfg.process.procline_prefix;
    let term_timeout = cfg.process.term_timeout();
    let poll_interval = cfg.process.poll_interval();
    let mut processed_count = 0u32;
    let mut exit_code = 0;

    while processed_count < cfg.process.jobs_per_fork {
        if flags.is_shutdown() {
            break;
        }
        if flags.is_paused() {
            proctitle::paused(prefix);
            thread::sleep(poll_interval);
            continue;
        }

        let queues = match resolver.resolve(&mut store) {
            Ok(q) => q,
            Err(e) => {
                error!(error = %e, "child failed to resolve queues");
                exit_code = 1;
                break;
            }
        };

        let reserved = queues
            .iter()
            .find_map(|q| match JobRecord::reserve(&mut store, q) {
                Ok(Some(record)) => Some(Ok(record)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            });

        let record = match reserved {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                error!(error = %e, "child failed to reserve a job");
                exit_code = 1;
                break;
            }
            None => {
                proctitle::waiting(prefix, &queues);
                if cfg.process.poll_interval_secs == 0 {
                    break;
                }
                thread::sleep(poll_interval);
                continue;
            }
        };

        let now = store.server_time().unwrap_or(0);
        if let Err(e) = registry::mark_working(&mut store, &id_key, &record.queue, &record.payload) {
            warn!(error = %e, "child failed to mark working payload");
        }
        proctitle::processing(prefix, &record.queue, now, &record.payload.class);

        let outcome = execute_job_in_subprocess(&registry, &record, &flags, term_timeout);

        match outcome {
            JobOutcome::Success => {
                processed_count += 1;
                if let Err(e) = stats::record_processed(&mut store, &id_key) {
                    warn!(error = %e, "child failed to record processed counter");
                }
            }
            JobOutcome::DontPerform => {}
            JobOutcome::Abandoned => {
                info!(class = %record.payload.class, "job abandoned: subprocess killed before completion");
            }
            JobOutcome::Failed { skip_failed_queue } => {
                warn!(class = %record.payload.class, skip_failed_queue, "job failed");
                if !skip_failed_queue {
                    if let Err(e) = stats::record_failed(&mut store, &id_key) {
                        warn!(error = %e, "child failed to record failed counter");
                    }
                }
            }
        }

        if let Err(e) = registry::clear_working(&mut store, &id_key) {
            warn!(error = %e, "child failed to clear working payload");
        }
    }

    if let Some(w) = watcher.as_mut() {
        w.stop();
    }
    exit_code
}

/// Fork a grandchild to run `record` through the hook pipeline; wait for it
/// with TERM-then-KILL escalation driven by `flags` and `term_timeout`.
fn execute_job_in_subprocess(
    registry: &HandlerRegistry,
    record: &JobRecord,
    flags: &SignalFlags,
    term_timeout: Duration,
) -> JobOutcome {
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let (result, skip_failed_queue) = record.execute_tracking_skip(registry);
            match result {
                Ok(Outcome::Success) => std::process::exit(exit_code::SUCCESS),
                Ok(Outcome::DontPerform) => std::process::exit(exit_code::DONT_PERFORM),
                Err(e) => {
                    eprintln!("job '{}' failed: {e}", record.payload.class);
                    std::process::exit(if skip_failed_queue {
                        exit_code::FAILURE_SKIP_QUEUE
                    } else {
                        exit_code::FAILURE
                    });
                }
            }
        }
        Ok(ForkResult::Parent { child }) => wait_for_job(child, flags, term_timeout),
        Err(e) => {
            error!(error = %e, "failed to fork a job subprocess");
            JobOutcome::Failed {
                skip_failed_queue: false,
            }
        }
    }
}

/// Wait for the per-job grandchild, bounding and escalating against it only
/// on TERM/INT (`immediate_shutdown`) or USR1 (`abort_job`). A QUIT-driven
/// shutdown (`cooperative_shutdown`) never sends it a signal here: the job
/// finishes naturally, with no timeout, and `run`'s outer loop is the one
/// that stops reserving further work afterward.
fn wait_for_job(pid: Pid, flags: &SignalFlags, term_timeout: Duration) -> JobOutcome {
    let start = Instant::now();
    let mut term_sent = false;

    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => {
                let abort_requested = flags.abort_job.swap(false, std::sync::atomic::Ordering::SeqCst);
                if (flags.is_immediate_shutdown() || abort_requested) && !term_sent {
                    let _ = kill(pid, Signal::SIGTERM);
                    term_sent = true;
                }
                if term_sent && start.elapsed() >= term_timeout {
                    let _ = kill(pid, Signal::SIGKILL);
                    let _ = waitpid(pid, None);
                    return JobOutcome::Abandoned;
                }
                thread::sleep(Duration::from_millis(50));
            }
            Ok(WaitStatus::Exited(_, code)) => {
                return match code {
                    exit_code::SUCCESS => JobOutcome::Success,
                    exit_code::DONT_PERFORM => JobOutcome::DontPerform,
                    exit_code::FAILURE_SKIP_QUEUE => JobOutcome::Failed {
                        skip_failed_queue: true,
                    },
                    _ => JobOutcome::Failed {
                        skip_failed_queue: false,
                    },
                };
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                warn!(signal = ?sig, "job subprocess terminated by signal");
                return JobOutcome::Abandoned;
            }
            Ok(_) => continue,
            Err(e) => {
                error!(error = %e, "waitpid failed on job subprocess");
                return JobOutcome::Failed {
                    skip_failed_queue: false,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let all = [
            exit_code::SUCCESS,
            exit_code::FAILURE,
            exit_code::DONT_PERFORM,
            exit_code::FAILURE_SKIP_QUEUE,
        ];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }
}
