use std::sync::Arc;

use actix_web::web;
use log::{error, info};

use seismic_workbench::artifacts::ArtifactStore;
use seismic_workbench::config::Config;
use seismic_workbench::core::registry::ModelRegistry;
use seismic_workbench::data::{DatasetLoader, FEATURE_CATALOG};
use seismic_workbench::models::{register_builtins, register_user_models};
use seismic_workbench::runner::CodeRunner;
use seismic_workbench::store::ModelStore;
use seismic_workbench::web::server::{start_web_server, AppState};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting Seismic Workbench...");

    let config = Config::from_env();
    for dir in [&config.data_root, &config.results_root, &config.run_dir] {
        std::fs::create_dir_all(dir)?;
    }
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = ModelStore::open(&config.db_path).unwrap_or_else(|e| {
        error!("Could not open model store at {}: {}", config.db_path, e);
        std::process::exit(1);
    });
    let registry = Arc::new(ModelRegistry::new());
    let artifacts = ArtifactStore::new(&config.results_root);
    let loader = DatasetLoader::new(&config.data_root);
    let runner = CodeRunner::new(&config.python_bin, &config.run_dir, config.run_timeout);

    // Seed built-ins, user-model placeholders, features and the login user
    if let Err(e) = register_builtins(&store, &registry, &artifacts, &loader)
        .and_then(|_| register_user_models(&store, &registry))
    {
        error!("Could not seed the model registry: {}", e);
        std::process::exit(1);
    }
    for (name, label, unit, description) in FEATURE_CATALOG {
        if let Err(e) = store.insert_feature(name, label, unit, description) {
            error!("Could not seed feature '{}': {}", name, e);
        }
    }
    if let Err(e) = store.upsert_user(&config.admin_user, &config.admin_pass) {
        error!("Could not seed login user: {}", e);
    }
    info!("Registry holds {} model objects", registry.len());

    let state = web::Data::new(AppState {
        store,
        registry,
        artifacts,
        loader,
        runner,
    });

    let bind_addr = config.bind_addr.clone();
    let server = tokio::spawn(async move { start_web_server(state, &bind_addr).await });

    info!("Seismic Workbench is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down Seismic Workbench...");

    server.abort();
    info!("Seismic Workbench shutdown complete");
    Ok(())
}
