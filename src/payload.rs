//! Wire representation of a queued job: `{class, args, id, generation}`.

use crate::error::JobResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Canonical JSON-shaped envelope for a queued job. Field order here is
/// insertion order for `serde_json`'s default map, which keeps `encode`
/// deterministic enough for `destroy`'s string-equality matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub class: String,
    pub args: Vec<Value>,
    pub id: String,
    pub generation: u64,
}

impl Payload {
    /// Build a fresh payload: 128-bit random hex id, generation 1.
    pub fn new(class: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            class: class.into(),
            args,
            id: fresh_id(),
            generation: 1,
        }
    }

    /// Requeue with the same id, generation + 1 (see `recreate`, I4).
    pub fn recreated(&self) -> Self {
        Self {
            class: self.class.clone(),
            args: self.args.clone(),
            id: self.id.clone(),
            generation: self.generation + 1,
        }
    }

    pub fn encode(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(bytes: &str) -> JobResult<Self> {
        Ok(serde_json::from_str(bytes)?)
    }

    /// True if this payload's class (and, when given, args) match the
    /// destroy-by-args filter. Args compare by JSON equality.
    pub fn matches(&self, class: &str, args: Option<&[Value]>) -> bool {
        if self.class != class {
            return false;
        }
        match args {
            Some(a) => self.args == a,
            None => true,
        }
    }
}

/// A fresh 32-character hex id: a UUID v4 rendered without hyphens, i.e. the
/// 128 random bits the spec calls for.
fn fresh_id() -> String {
    Uuid::new_v4().simple().to_string()
}
