//! `BACKGROUND`-driven daemonization: detach from the controlling terminal
//! before the supervisor does anything else.

use crate::error::{JobError, JobResult};

/// Fork, start a new session, chdir to `/`, and redirect stdin/stdout/stderr
/// to `/dev/null`. Must run before any thread exists (the heartbeat thread,
/// the signal watcher thread) since `fork` only carries the calling thread
/// into the child.
pub fn daemonize() -> JobResult<()> {
    nix::unistd::daemon(false, false)
        .map_err(|e| JobError::configuration(format!("failed to daemonize: {e}")))?;
    Ok(())
}
