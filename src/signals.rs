//! Signal lifecycle: TERM/INT/QUIT/USR1/USR2/CONT.
//!
//! Registration goes through `signal_hook`, whose own OS-level handler only
//! ever writes to a self-pipe (the textbook async-signal-safe primitive) and
//! wakes a plain background thread to do the real work. Our callback runs on
//! that thread, never inside the actual signal handler, so it is free to
//! forward signals to children and flip ordinary flags without the usual
//! restriction that a raw signal handler may only set a flag.

use signal_hook::consts::{SIGCONT, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::warn;

/// Shared flags flipped by the signal thread and observed by the supervisor
/// loop and (via IPC in a full implementation) the child processors.
///
/// TERM/INT and QUIT both mean "stop taking new work", but only TERM/INT
/// bound the current job with `term_timeout` and escalate to a hard kill;
/// QUIT lets the running job finish naturally, however long that takes. The
/// two are tracked as separate flags so callers can tell them apart instead
/// of collapsing them into one "shutting down" bit.
#[derive(Clone, Default)]
pub struct SignalFlags {
    /// TERM or INT: cancel the current job once `term_timeout` elapses.
    pub immediate_shutdown: Arc<AtomicBool>,
    /// QUIT: let the current job finish, no timeout enforced.
    pub cooperative_shutdown: Arc<AtomicBool>,
    pub paused: Arc<AtomicBool>,
    /// Set on USR1: the currently running job should be aborted.
    pub abort_job: Arc<AtomicBool>,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Either shutdown flag: stop reserving new jobs.
    pub fn is_shutdown(&self) -> bool {
        self.is_immediate_shutdown() || self.is_cooperative_shutdown()
    }

    /// TERM/INT specifically: bound and escalate against the running job.
    pub fn is_immediate_shutdown(&self) -> bool {
        self.immediate_shutdown.load(Ordering::SeqCst)
    }

    /// QUIT specifically: never escalate against the running job.
    pub fn is_cooperative_shutdown(&self) -> bool {
        self.cooperative_shutdown.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

pub struct SignalWatcher {
    handle: signal_hook::iterator::Handle,
    join: Option<JoinHandle<()>>,
}

impl SignalWatcher {
    pub fn stop(&mut self) {
        self.handle.close();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// Install handlers for the signal table in §4.5. `on_signal` is invoked on
/// the watcher thread for every delivered signal and is responsible for
/// forwarding to children; this module only owns the supervisor-local flags.
pub fn install(flags: SignalFlags, mut on_signal: impl FnMut(i32) + Send + 'static) -> std::io::Result<SignalWatcher> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGUSR1, SIGUSR2, SIGCONT])?;
    let handle = signals.handle();

    let join = thread::spawn(move || {
        for sig in &mut signals {
            match sig {
                SIGTERM | SIGINT => {
                    flags.immediate_shutdown.store(true, Ordering::SeqCst);
                }
                SIGQUIT => {
                    flags.cooperative_shutdown.store(true, Ordering::SeqCst);
                }
                SIGUSR1 => {
                    flags.paused.store(false, Ordering::SeqCst);
                    flags.abort_job.store(true, Ordering::SeqCst);
                }
                SIGUSR2 => {
                    flags.paused.store(true, Ordering::SeqCst);
                }
                SIGCONT => {
                    flags.paused.store(false, Ordering::SeqCst);
                }
                other => {
                    warn!(signal = other, "received unsupported signal, ignoring");
                }
            }
            on_signal(sig);
        }
    });

    Ok(SignalWatcher {
        handle,
        join: Some(join),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_to_running_and_unpaused() {
        let flags = SignalFlags::new();
        assert!(!flags.is_shutdown());
        assert!(!flags.is_paused());
    }

    #[test]
    fn immediate_and_cooperative_shutdown_are_distinguishable() {
        let flags = SignalFlags::new();
        flags.cooperative_shutdown.store(true, Ordering::SeqCst);
        assert!(flags.is_shutdown());
        assert!(flags.is_cooperative_shutdown());
        assert!(!flags.is_immediate_shutdown());
    }
}
