//! A Redis-backed, multi-process background job queue worker runtime.
//!
//! A [`supervisor::Supervisor`] forks a fixed number of child processors,
//! each pulling payloads off a set of (possibly wildcard) queues and
//! running them through a per-class hook pipeline. See the module docs on
//! [`supervisor`] and [`child`] for the process model, and [`hooks`] for the
//! before/around/after/failure lifecycle.

pub mod child;
pub mod config;
pub mod daemon;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod hooks;
pub mod identity;
pub mod job;
pub mod payload;
pub mod proctitle;
pub mod pruner;
pub mod registry;
pub mod resolver;
pub mod signals;
pub mod stats;
pub mod store;
pub mod supervisor;

pub mod prelude {
    pub use crate::config::WorkerConfig;
    pub use crate::daemon::daemonize;
    pub use crate::error::{JobError, JobResult};
    pub use crate::handler::{HandlerRegistry, JobHandler};
    pub use crate::hooks::{JobHooks, Outcome};
    pub use crate::identity::WorkerIdentity;
    pub use crate::job::JobRecord;
    pub use crate::payload::Payload;
    pub use crate::store::{DataStore, RedisStore};
    pub use crate::supervisor::Supervisor;
}
