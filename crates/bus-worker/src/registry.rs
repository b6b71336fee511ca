//! Handler registry: `action_type -> ActionHandler` (spec §4.5).

use crate::error::WorkerError;
use crate::handler::ActionHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps `action_type` strings to the handler that processes them.
///
/// Built once at startup through [`HandlerRegistryBuilder`]; immutable and
/// freely `Clone`-shared across worker tasks afterwards.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("action_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn get(&self, action_type: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(action_type)
    }

    pub fn action_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

/// Accumulates handlers before they're frozen into a [`HandlerRegistry`].
/// Registering the same `action_type` twice is a startup-time configuration
/// error, not a runtime one — the original silently let later registrations
/// win, which the teacher's fail-fast-on-misconfiguration style argues
/// against repeating.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistryBuilder {
    pub fn register(
        mut self,
        action_type: impl Into<String>,
        handler: impl ActionHandler + 'static,
    ) -> Result<Self, WorkerError> {
        let action_type = action_type.into();
        if self.handlers.contains_key(&action_type) {
            return Err(WorkerError::DuplicateHandler(action_type));
        }
        self.handlers.insert(action_type, Arc::new(handler));
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: Arc::new(self.handlers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;

    fn noop_handler() -> FnHandler<impl Fn(bus_core::Action) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, bus_core::ErrorDetail>> + Send>> + Send + Sync>
    {
        FnHandler::new(|_action| Box::pin(async { Ok(serde_json::json!({})) }))
    }

    #[test]
    fn register_rejects_duplicate_action_type() {
        let result = HandlerRegistry::builder()
            .register("a.b", noop_handler())
            .unwrap()
            .register("a.b", noop_handler());
        assert!(matches!(result, Err(WorkerError::DuplicateHandler(_))));
    }

    #[test]
    fn get_returns_none_for_unknown_action_type() {
        let registry = HandlerRegistry::builder().build();
        assert!(registry.get("unknown.action").is_none());
    }

    #[test]
    fn registry_lists_registered_action_types() {
        let registry = HandlerRegistry::builder()
            .register("a.b", noop_handler())
            .unwrap()
            .register("c.d", noop_handler())
            .unwrap()
            .build();
        let mut types: Vec<&str> = registry.action_types().collect();
        types.sort_unstable();
        assert_eq!(types, vec!["a.b", "c.d"]);
    }
}
