//! Built-in model definitions and startup registration.

pub mod baseline;

use std::sync::Arc;

use log::info;

use crate::artifacts::ArtifactStore;
use crate::core::registry::ModelRegistry;
use crate::data::DatasetLoader;
use crate::models::baseline::{Hyperparams, MagEstimator};
use crate::runner::pysrc::default_library;
use crate::store::{ModelStore, StoreError};

/// Protected built-in models, seeded at startup and never deletable
pub const DEFAULT_MODELS: [&str; 5] = [
    "MagInfoNet",
    "EQGraphNet",
    "MagNet",
    "CREIME",
    "ConvNetQuakeINGV",
];

pub fn is_protected(name: &str) -> bool {
    DEFAULT_MODELS.contains(&name)
}

/// Hyperparameters of each built-in estimator
fn builtin_hyper(name: &str) -> Hyperparams {
    match name {
        "MagInfoNet" => Hyperparams {
            epochs: 300,
            learning_rate: 0.05,
            l2: 1e-4,
        },
        "EQGraphNet" => Hyperparams {
            epochs: 400,
            learning_rate: 0.03,
            l2: 1e-3,
        },
        "MagNet" => Hyperparams {
            epochs: 200,
            learning_rate: 0.05,
            l2: 1e-4,
        },
        "CREIME" => Hyperparams {
            epochs: 250,
            learning_rate: 0.02,
            l2: 5e-4,
        },
        "ConvNetQuakeINGV" => Hyperparams {
            epochs: 150,
            learning_rate: 0.08,
            l2: 1e-4,
        },
        _ => Hyperparams::default(),
    }
}

/// Seed the built-in model rows and bind their live objects in the registry.
///
/// Rows that already exist are reused; any situation left over from a previous
/// process (e.g. a crash mid-training) is released back to `Free`.
pub fn register_builtins(
    store: &ModelStore,
    registry: &ModelRegistry,
    artifacts: &ArtifactStore,
    loader: &DatasetLoader,
) -> Result<(), StoreError> {
    for name in DEFAULT_MODELS {
        let id = match store.get_model_by_name(name)? {
            Some(model) => {
                store.release_situation(name)?;
                model.id
            }
            None => store.create_model(name, &default_library().join("\n"), "", "", "", "")?,
        };
        let estimator = MagEstimator::new(
            name,
            builtin_hyper(name),
            store.clone(),
            artifacts.clone(),
            loader.clone(),
        );
        registry.register(id, Arc::new(estimator));
    }
    info!("Registered {} built-in models", DEFAULT_MODELS.len());
    Ok(())
}

/// Reserve registry entries for user-created models already in the store
pub fn register_user_models(store: &ModelStore, registry: &ModelRegistry) -> Result<(), StoreError> {
    for model in store.list_models()? {
        if !is_protected(&model.name) {
            registry.register_placeholder(model.id);
        }
    }
    Ok(())
}
