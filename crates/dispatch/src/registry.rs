//! Handler registry — resolves routing decisions to invocable handlers.

use std::collections::HashMap;
use std::sync::Arc;

use switchyard_core::handler::Handler;

/// An immutable-after-startup map of handler id → handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own id.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.id().to_string(), handler);
    }

    /// Look up a handler by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(id).cloned()
    }

    /// All registered handler ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::StaticHandler;

    #[test]
    fn register_and_resolve() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(StaticHandler::new("help", "try asking about the weather")));

        assert!(registry.get("help").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.ids(), vec!["help".to_string()]);
    }

    #[test]
    fn later_registration_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(StaticHandler::new("help", "old")));
        registry.register(Arc::new(StaticHandler::new("help", "new")));
        assert_eq!(registry.len(), 1);
    }
}
