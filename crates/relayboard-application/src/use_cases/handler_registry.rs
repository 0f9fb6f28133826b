//! Process-wide handler registry (spec §4.1 "Handler registry").
//!
//! Populated once at startup before the first tick; read-only thereafter
//! (spec §5 "The handler registry is read-only after startup").

use std::collections::HashMap;
use std::sync::Arc;

use relayboard_domain::entities::JobType;
use relayboard_domain::ports::JobHandler;

/// Maps a job type's canonical key to its registered handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `job_type`. Registering the same type twice
    /// replaces the previous handler.
    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.as_key(), handler);
    }

    /// Look up the handler registered for `job_type`, if any.
    #[must_use]
    pub fn get(&self, job_type: &JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type.as_key()).cloned()
    }
}
