//! Registry coupling function descriptors to user-supplied handlers.
//!
//! The registry is the single owner of every `{descriptor, handler}` entry;
//! the reply server borrows it (through an `Arc` captured in its dispatch
//! closure) to look up handlers for incoming invocations. Registration is
//! reject-duplicate: a second registration under the same id is refused and
//! the first entry is left untouched.

use crate::error::HandlerError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// User callback bound to a function id.
///
/// Invoked by the reply server with the opaque `(context, payload)` bytes of
/// an incoming invocation; the returned bytes become the reply body.
pub type Handler = Arc<dyn Fn(&[u8], &[u8]) -> Result<Vec<u8>, HandlerError> + Send + Sync>;

/// Immutable metadata describing a registered function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Unique function id within the process, e.g. `"player.ban"`
    pub id: String,
    pub version: String,
    pub category: String,
    /// Free-form risk tag such as `"low"` or `"high"`
    pub risk: String,
    pub enabled: bool,
}

impl FunctionDescriptor {
    /// Create a descriptor with default metadata for the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: "1.0.0".to_string(),
            category: "general".to_string(),
            risk: "low".to_string(),
            enabled: true,
        }
    }
}

struct RegistryEntry {
    descriptor: FunctionDescriptor,
    handler: Handler,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, RegistryEntry>,
    // registration order, for stable listings
    order: Vec<String>,
}

/// Thread-safe map from function ids to `{descriptor, handler}` entries
#[derive(Default)]
pub struct HandlerRegistry {
    state: RwLock<RegistryState>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. Returns `false` when the id is empty or a
    /// handler is already registered under the same id.
    pub fn register(&self, descriptor: FunctionDescriptor, handler: Handler) -> bool {
        if descriptor.id.is_empty() {
            warn!("rejecting registration with an empty function id");
            return false;
        }

        let mut state = self.state.write();
        if state.entries.contains_key(&descriptor.id) {
            warn!("function {:?} is already registered", descriptor.id);
            return false;
        }

        debug!("registered function {:?}", descriptor.id);
        state.order.push(descriptor.id.clone());
        state
            .entries
            .insert(descriptor.id.clone(), RegistryEntry { descriptor, handler });
        true
    }

    /// Look up the descriptor and handler for a function id
    pub fn lookup(&self, function_id: &str) -> Option<(FunctionDescriptor, Handler)> {
        let state = self.state.read();
        state
            .entries
            .get(function_id)
            .map(|entry| (entry.descriptor.clone(), entry.handler.clone()))
    }

    /// Snapshot of all descriptors, in registration order
    pub fn list(&self) -> Vec<FunctionDescriptor> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id))
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_handler() -> Handler {
        Arc::new(|_context, payload| Ok(payload.to_vec()))
    }

    #[test]
    fn register_then_lookup() {
        let registry = HandlerRegistry::new();
        assert!(registry.register(FunctionDescriptor::new("player.ban"), echo_handler()));

        let (descriptor, handler) = registry.lookup("player.ban").unwrap();
        assert_eq!(descriptor.id, "player.ban");
        assert_eq!(handler(&[], &[9, 9]).unwrap(), vec![9, 9]);
    }

    #[test]
    fn duplicate_registration_keeps_the_first_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.register(
            FunctionDescriptor::new("player.ban"),
            Arc::new(|_, _| Ok(vec![1])),
        ));
        assert!(!registry.register(
            FunctionDescriptor::new("player.ban"),
            Arc::new(|_, _| Ok(vec![2])),
        ));

        let (_, handler) = registry.lookup("player.ban").unwrap();
        assert_eq!(handler(&[], &[]).unwrap(), vec![1]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_id_is_rejected() {
        let registry = HandlerRegistry::new();
        assert!(!registry.register(FunctionDescriptor::new(""), echo_handler()));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_id_yields_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn list_preserves_registration_order() {
        let registry = HandlerRegistry::new();
        for id in ["gamma", "alpha", "beta"] {
            assert!(registry.register(FunctionDescriptor::new(id), echo_handler()));
        }

        let ids: Vec<_> = registry.list().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["gamma", "alpha", "beta"]);
    }
}
