//! Dynamic class dispatch: the wire payload carries a class name resolved at
//! execution time, so handlers are registered by name at process init.

use crate::error::{JobError, JobResult};
use crate::hooks::JobHooks;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A single job class's executable body. `args` are the decoded payload
/// arguments, in order.
pub trait JobHandler: Send + Sync {
    fn perform(&self, args: &[Value]) -> anyhow::Result<()>;
}

impl<F> JobHandler for F
where
    F: Fn(&[Value]) -> anyhow::Result<()> + Send + Sync,
{
    fn perform(&self, args: &[Value]) -> anyhow::Result<()> {
        self(args)
    }
}

/// Maps class names to their handler and hook set. Registration happens at
/// process init; an unregistered class name surfaces as [`JobError::NoHandler`].
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    hooks: HashMap<String, JobHooks>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: impl Into<String>, handler: impl JobHandler + 'static) {
        self.register_with_hooks(class, handler, JobHooks::default());
    }

    pub fn register_with_hooks(
        &mut self,
        class: impl Into<String>,
        handler: impl JobHandler + 'static,
        hooks: JobHooks,
    ) {
        let class = class.into();
        self.handlers.insert(class.clone(), Arc::new(handler));
        self.hooks.insert(class, hooks);
    }

    pub fn handler(&self, class: &str) -> JobResult<Arc<dyn JobHandler>> {
        self.handlers
            .get(class)
            .cloned()
            .ok_or_else(|| JobError::NoHandler(class.to_string()))
    }

    pub fn hooks(&self, class: &str) -> JobHooks {
        self.hooks.get(class).cloned().unwrap_or_default()
    }
}
