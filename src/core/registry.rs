use std::sync::Arc;

use dashmap::DashMap;
use log::{info, warn};

use crate::core::model::SeismicModel;

/// Entry in the live-model registry
#[derive(Clone)]
pub enum RegistryEntry {
    /// A built-in model bound to a live trainable object
    Builtin(Arc<dyn SeismicModel>),
    /// A user-created model with no executable backing yet
    Placeholder,
}

/// In-process registry mapping model ids to live model objects.
///
/// Built-ins are bound at startup; models created through the API get a
/// placeholder entry. The registry is owned by the application state and is
/// rebuilt from the store on every process start.
#[derive(Default)]
pub struct ModelRegistry {
    entries: DashMap<i64, RegistryEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Bind a live model object to a model id
    pub fn register(&self, id: i64, model: Arc<dyn SeismicModel>) {
        if self.entries.contains_key(&id) {
            warn!("Replacing existing registry entry for model id {}", id);
        }
        info!("Registered model object '{}' (id {})", model.name(), id);
        self.entries.insert(id, RegistryEntry::Builtin(model));
    }

    /// Reserve a slot for a user-created model
    pub fn register_placeholder(&self, id: i64) {
        self.entries.insert(id, RegistryEntry::Placeholder);
    }

    /// Remove a registry entry, returns whether one existed
    pub fn unregister(&self, id: i64) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn get(&self, id: i64) -> Option<RegistryEntry> {
        self.entries.get(&id).map(|e| e.clone())
    }

    /// Live model object for the id, if one is bound
    pub fn get_builtin(&self, id: i64) -> Option<Arc<dyn SeismicModel>> {
        match self.get(id) {
            Some(RegistryEntry::Builtin(model)) => Some(model),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ModelError;
    use crate::core::model::{EvalReport, OptParams};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct DummyModel;

    #[async_trait]
    impl SeismicModel for DummyModel {
        fn name(&self) -> &str {
            "Dummy"
        }

        async fn training(&self, _params: &OptParams) -> Result<EvalReport, ModelError> {
            Err(ModelError::Data("not trainable".to_string()))
        }

        async fn testing(&self, _params: &OptParams) -> Result<EvalReport, ModelError> {
            Err(ModelError::Data("not testable".to_string()))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ModelRegistry::new();
        registry.register(1, Arc::new(DummyModel));
        registry.register_placeholder(2);

        assert!(registry.get_builtin(1).is_some());
        assert!(registry.get_builtin(2).is_none());
        assert!(matches!(registry.get(2), Some(RegistryEntry::Placeholder)));
        assert!(registry.get(3).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister() {
        let registry = ModelRegistry::new();
        registry.register_placeholder(7);
        assert!(registry.unregister(7));
        assert!(!registry.unregister(7));
        assert!(registry.is_empty());
    }
}
