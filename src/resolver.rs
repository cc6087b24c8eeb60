//! Resolves a worker's configured queue patterns to a concrete, ordered
//! queue list on every reservation cycle.

use crate::error::{JobError, JobResult};
use crate::store::DataStore;
use glob::Pattern;

const WILDCARD_CHARS: &[char] = &['*', '?', '{', '}', '[', ']'];

/// The queues a worker was configured to watch, possibly containing
/// shell-style wildcards that must be re-resolved against the live queue
/// set on every reservation.
#[derive(Debug, Clone)]
pub struct QueueResolver {
    patterns: Vec<String>,
    dynamic: bool,
}

impl QueueResolver {
    /// `patterns` must be non-empty; an empty list is a configuration error.
    pub fn new(patterns: Vec<String>) -> JobResult<Self> {
        if patterns.is_empty() {
            return Err(JobError::configuration("no queue(s) configured"));
        }
        let dynamic = patterns
            .iter()
            .any(|p| p.chars().any(|c| WILDCARD_CHARS.contains(&c)));
        Ok(Self { patterns, dynamic })
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn configured(&self) -> &[String] {
        &self.patterns
    }

    /// Resolve to a concrete, ordered, de-duplicated queue list. Static
    /// configurations (no wildcards) resolve to themselves verbatim,
    /// preserving configured priority order even without hitting the store.
    pub fn resolve(&self, store: &mut dyn DataStore) -> JobResult<Vec<String>> {
        if !self.dynamic {
            return Ok(self.patterns.clone());
        }

        let live = store.queues()?;
        let mut resolved = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for pattern in &self.patterns {
            let mut matches: Vec<&String> = if pattern == "*" {
                live.iter().collect()
            } else {
                let glob = Pattern::new(pattern).map_err(|e| {
                    JobError::configuration(format!("invalid queue pattern '{pattern}': {e}"))
                })?;
                live.iter().filter(|q| glob.matches(q)).collect()
            };
            matches.sort();
            for q in matches {
                if seen.insert(q.clone()) {
                    resolved.push(q.clone());
                }
            }
        }
        Ok(resolved)
    }
}
