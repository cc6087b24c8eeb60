//! Supervisor: owns the worker's registry identity, forks and refork the
//! configured number of child processors, and relays the signal table in
//! §4.5 down to them.

use crate::child;
use crate::config::WorkerConfig;
use crate::error::{JobError, JobResult};
use crate::handler::HandlerRegistry;
use crate::heartbeat::{self, HeartbeatHandle};
use crate::identity::WorkerIdentity;
use crate::proctitle;
use crate::pruner;
use crate::registry;
use crate::signals::{self, SignalFlags, SignalWatcher};
use crate::store::{DataStore, RedisStore};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const REAP_TICK: Duration = Duration::from_millis(200);

/// Write `pid` to `path`, per the `PIDFILE` external interface.
fn write_pidfile(path: &str, pid: u32) -> JobResult<()> {
    std::fs::write(path, pid.to_string())
        .map_err(|e| JobError::configuration(format!("failed to write pidfile '{path}': {e}")))
}

pub struct Supervisor {
    config: WorkerConfig,
    identity: WorkerIdentity,
    registry: Arc<HandlerRegistry>,
    flags: SignalFlags,
    live_children: Arc<Mutex<Vec<i32>>>,
}

impl Supervisor {
    pub fn new(config: WorkerConfig, registry: HandlerRegistry) -> Self {
        let identity = WorkerIdentity::for_current_process(config.process.queues.clone());
        Self {
            config,
            identity,
            registry: Arc::new(registry),
            flags: SignalFlags::new(),
            live_children: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run the full lifecycle: startup, fan-out, supervise loop, teardown.
    /// `interval` is the supervise-loop tick; `Duration::ZERO` makes the
    /// supervisor do exactly one fan-out/reap pass and return (used for
    /// tests and one-shot invocations).
    pub fn work(&mut self, interval: Duration) -> JobResult<()> {
        let mut store = RedisStore::connect(&self.config.redis.url, &self.config.redis.key_prefix)?;
        let prefix = self.config.process.procline_prefix.clone();

        proctitle::starting(&prefix);
        registry::register(&mut store, &self.identity.as_key())?;
        if let Some(path) = &self.config.process.pidfile {
            write_pidfile(path, std::process::id())?;
        }

        let mut heartbeat = heartbeat::spawn(
            Box::new(RedisStore::connect(&self.config.redis.url, &self.config.redis.key_prefix)?),
            self.identity.clone(),
            self.config.process.heartbeat_interval(),
        );

        let mut watcher = self.install_signal_relay()?;

        for _ in 0..self.config.process.worker_count {
            self.spawn_child()?;
        }
        let now = store.server_time().unwrap_or(0);
        let pids: Vec<u32> = self.live_children.lock().iter().map(|&p| p as u32).collect();
        proctitle::forked(&prefix, &pids, now);

        let mut last_prune = Instant::now() - self.config.process.prune_interval();
        loop {
            self.reap_and_refork(true)?;

            if last_prune.elapsed() >= self.config.process.prune_interval() {
                let live_pids = pruner::collect_live_pids(&prefix);
                if let Err(e) = pruner::run(
                    &mut store,
                    &self.identity,
                    self.config.process.prune_interval(),
                    self.config.process.heartbeat_interval(),
                    &live_pids,
                ) {
                    warn!(error = %e, "prune pass failed");
                }
                last_prune = Instant::now();
            }

            if self.flags.is_shutdown() || interval.is_zero() {
                break;
            }
            self.sleep_interruptible(interval);
        }

        self.teardown(&mut store, &mut heartbeat)?;
        if let Some(w) = watcher.as_mut() {
            w.stop();
        }
        Ok(())
    }

    fn install_signal_relay(&self) -> JobResult<Option<SignalWatcher>> {
        let live_children = self.live_children.clone();
        let watcher = signals::install(self.flags.clone(), move |sig| {
            let Ok(signal) = Signal::try_from(sig) else {
                return;
            };
            let pids = live_children.lock().clone();
            for pid in pids {
                let _ = kill(Pid::from_raw(pid), signal);
            }
        })
        .map_err(|e| JobError::configuration(format!("failed to install signal handlers: {e}")))?;
        Ok(Some(watcher))
    }

    fn spawn_child(&mut self) -> JobResult<()> {
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let child_identity = self.identity.for_child(std::process::id());
                let code = child::run(&self.config, child_identity, self.registry.clone());
                std::process::exit(code);
            }
            Ok(ForkResult::Parent { child }) => {
                let mut children = self.live_children.lock();
                children.push(child.as_raw());
                metrics::gauge!("redwork_active_children").set(children.len() as f64);
                Ok(())
            }
            Err(e) => Err(JobError::Connection(format!("fork failed: {e}"))),
        }
    }

    /// Non-blocking reap of any exited children. When `respawn` is set (the
    /// normal supervise loop, not teardown), a replacement is forked for
    /// every child that exited while the supervisor isn't shutting down.
    fn reap_and_refork(&mut self, respawn: bool) -> JobResult<()> {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    info!(pid = pid.as_raw(), code, "child processor exited");
                    self.live_children.lock().retain(|&p| p != pid.as_raw());
                    metrics::gauge!("redwork_active_children").set(self.live_children.lock().len() as f64);
                    if respawn && !self.flags.is_shutdown() {
                        self.spawn_child()?;
                    }
                }
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    warn!(pid = pid.as_raw(), signal = ?sig, "child processor killed by signal");
                    self.live_children.lock().retain(|&p| p != pid.as_raw());
                    metrics::gauge!("redwork_active_children").set(self.live_children.lock().len() as f64);
                    if respawn && !self.flags.is_shutdown() {
                        self.spawn_child()?;
                    }
                }
                Ok(WaitStatus::StillAlive) => break,
                Ok(_) => continue,
                Err(nix::errno::Errno::ECHILD) => break,
                Err(e) => {
                    warn!(error = %e, "waitpid failed while reaping children");
                    break;
                }
            }
        }
        Ok(())
    }

    fn sleep_interruptible(&self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.flags.is_shutdown() {
                return;
            }
            let step = remaining.min(REAP_TICK);
            thread::sleep(step);
            remaining -= step;
        }
    }

    /// On a TERM/INT-driven shutdown: forward TERM to every remaining child,
    /// wait up to `term_timeout` for them to exit, then SIGKILL stragglers.
    /// On a QUIT-only shutdown: the signal relay already forwarded QUIT to
    /// every child when it arrived, so this just waits for them to exit on
    /// their own once their current job finishes, with no forced signal and
    /// no timeout.
    fn teardown(&mut self, store: &mut RedisStore, heartbeat: &mut HeartbeatHandle) -> JobResult<()> {
        let cooperative_only = self.flags.is_cooperative_shutdown() && !self.flags.is_immediate_shutdown();

        if cooperative_only {
            loop {
                self.reap_and_refork(false)?;
                if self.live_children.lock().is_empty() {
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
        } else {
            for pid in self.live_children.lock().iter() {
                let _ = kill(Pid::from_raw(*pid), Signal::SIGTERM);
            }

            let deadline = Instant::now() + self.config.process.term_timeout();
            loop {
                self.reap_and_refork(false)?;
                if self.live_children.lock().is_empty() {
                    break;
                }
                if Instant::now() >= deadline {
                    let stragglers: Vec<i32> = self.live_children.lock().drain(..).collect();
                    for pid in stragglers {
                        warn!(pid, "hard-killing child after term_timeout elapsed");
                        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
                        let _ = waitpid(Pid::from_raw(pid), None);
                    }
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
        }

        heartbeat.stop();
        registry::unregister(store, &self.identity.as_key(), registry::DirtyExitCause::SelfDetected)?;
        Ok(())
    }
}
