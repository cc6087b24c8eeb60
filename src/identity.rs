//! Worker identity: `host:pid:q1,q2,...`, immutable for the life of the supervisor.

use std::fmt;

/// A worker's identity tuple, rendered as `host:pid:q1,q2,...`. Equality and
/// registry lookups are string equality on this rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerIdentity {
    pub host: String,
    pub pid: u32,
    pub queues: Vec<String>,
}

impl WorkerIdentity {
    pub fn new(host: impl Into<String>, pid: u32, queues: Vec<String>) -> Self {
        Self {
            host: host.into(),
            pid,
            queues,
        }
    }

    /// Identity for the current process, using the local hostname.
    pub fn for_current_process(queues: Vec<String>) -> Self {
        let host = hostname();
        Self::new(host, std::process::id(), queues)
    }

    /// Derive a child's identity from its supervisor's, substituting the
    /// child's own pid. Queue list is inherited unchanged.
    pub fn for_child(&self, child_pid: u32) -> Self {
        Self::new(self.host.clone(), child_pid, self.queues.clone())
    }

    /// True if this worker watches every queue (`*` literal among its patterns).
    pub fn watches_all(&self) -> bool {
        self.queues.iter().any(|q| q == "*")
    }

    pub fn as_key(&self) -> String {
        self.to_string()
    }

    /// Parse a rendered identity back into its parts. Returns `None` if the
    /// string does not have the `host:pid:queues` shape.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, ':');
        let host = parts.next()?.to_string();
        let pid: u32 = parts.next()?.parse().ok()?;
        let queues = parts
            .next()
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Some(Self { host, pid, queues })
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.pid, self.queues.join(","))
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}
