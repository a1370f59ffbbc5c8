//! Name-keyed provider registry.
//!
//! The dispatcher resolves the provider for each attempt through this
//! registry; providers are polymorphic `dyn Provider` values selected by
//! name, never by structural inspection.

use crate::MockProvider;
use std::collections::HashMap;
use std::sync::Arc;
use waypoint_abstraction::Provider;

/// Registry of available providers, keyed by provider name.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { providers: HashMap::new() }
    }

    /// Registers a provider under its own name, replacing any previous entry.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Looks up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Returns the registered provider names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a provider is registered under the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Creates a registry with a `MockProvider` for each given name.
    ///
    /// Convenience for tests and development runs.
    pub fn with_mocks(names: &[&str]) -> Self {
        let mut registry = Self::new();
        for name in names {
            registry.register(Arc::new(MockProvider::new(*name)));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup_by_name() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("anthropic")));

        assert!(registry.contains("anthropic"));
        assert!(registry.get("anthropic").is_some());
        assert!(registry.get("openai").is_none());
    }

    #[test]
    fn with_mocks_registers_each_name() {
        let registry = ProviderRegistry::with_mocks(&["anthropic", "openai", "google"]);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["anthropic", "google", "openai"]);
    }
}
