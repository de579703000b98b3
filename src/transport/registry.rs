//! Event → handler table.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::identifiers::HandlerId;

use super::EventHandler;

/// Ordered handlers per event name.
///
/// Dispatch copies the handler list out of the lock first, so a handler
/// may register or remove handlers (or emit) without deadlocking.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<FxHashMap<String, Vec<(HandlerId, EventHandler)>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `event`.
    pub fn add(&self, event: &str, handler: EventHandler) -> HandlerId {
        let id = HandlerId::next();
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes one registration.
    pub fn remove(&self, event: &str, id: HandlerId) {
        let mut handlers = self.handlers.write();
        if let Some(list) = handlers.get_mut(event) {
            list.retain(|(existing, _)| *existing != id);
            if list.is_empty() {
                handlers.remove(event);
            }
        }
    }

    /// Invokes every handler for `event` in registration order.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let targets: Vec<EventHandler> = match self.handlers.read().get(event) {
            Some(list) => list.iter().map(|(_, handler)| handler.clone()).collect(),
            None => return 0,
        };

        trace!(event, handlers = targets.len(), "Dispatching event");

        for handler in &targets {
            handler(payload);
        }
        targets.len()
    }

    /// Returns the number of handlers for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let sink = Arc::clone(&order);
            registry.add("evt", Arc::new(move |_| sink.lock().push(tag)));
        }

        assert_eq!(registry.dispatch("evt", &json!({})), 3);
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_is_precise() {
        let registry = HandlerRegistry::new();
        let first = registry.add("evt", Arc::new(|_| {}));
        let _second = registry.add("evt", Arc::new(|_| {}));

        registry.remove("evt", first);
        registry.remove("evt", first);

        assert_eq!(registry.handler_count("evt"), 1);
    }

    #[test]
    fn test_unknown_event_dispatches_nothing() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.dispatch("nothing", &json!(null)), 0);
    }

    #[test]
    fn test_handler_may_reenter_registry() {
        let registry = Arc::new(HandlerRegistry::new());
        let inner = Arc::clone(&registry);
        registry.add(
            "evt",
            Arc::new(move |_| {
                inner.add("other", Arc::new(|_| {}));
            }),
        );

        registry.dispatch("evt", &json!({}));
        assert_eq!(registry.handler_count("other"), 1);
    }
}
