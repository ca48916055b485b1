use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use log::info;

use crate::artifacts::ArtifactStore;
use crate::core::registry::ModelRegistry;
use crate::data::DatasetLoader;
use crate::runner::CodeRunner;
use crate::store::ModelStore;
use crate::web::handlers;

/// Shared application state for web handlers
pub struct AppState {
    pub store: ModelStore,
    pub registry: Arc<ModelRegistry>,
    pub artifacts: ArtifactStore,
    pub loader: DatasetLoader,
    pub runner: CodeRunner,
}

/// API route table; shared between the server and the integration tests
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Model CRUD
            .route("/models", web::get().to(handlers::models::list_models))
            .route("/models", web::post().to(handlers::models::create_model))
            .route(
                "/models/by-name/{name}",
                web::get().to(handlers::models::model_detail),
            )
            .route("/models/{pk}", web::put().to(handlers::models::edit_model))
            .route(
                "/models/{pk}",
                web::delete().to(handlers::models::delete_model),
            )
            // Train / test / progress
            .route(
                "/models/{name}/train",
                web::get().to(handlers::training::train_records),
            )
            .route(
                "/models/{name}/train",
                web::post().to(handlers::training::train_model),
            )
            .route(
                "/models/{name}/test",
                web::get().to(handlers::training::test_records),
            )
            .route(
                "/models/{name}/test",
                web::post().to(handlers::training::test_model),
            )
            .route(
                "/models/{name}/process",
                web::get().to(handlers::training::get_process),
            )
            .route(
                "/models/{name}/process",
                web::put().to(handlers::training::reset_process),
            )
            // Evaluation results
            .route(
                "/models/{name}/{opt}/compare",
                web::get().to(handlers::results::compare_true_pred),
            )
            .route(
                "/models/{name}/{opt}/loss",
                web::get().to(handlers::results::loss_curve),
            )
            .route(
                "/models/{name}/{opt}/record",
                web::get().to(handlers::results::record_exists),
            )
            .route(
                "/models/{name}/{opt}/record",
                web::delete().to(handlers::results::record_delete),
            )
            // Features
            .route("/features", web::get().to(handlers::features::list_features))
            .route(
                "/features/dist",
                web::get().to(handlers::features::feature_dist),
            )
            .route(
                "/features/locate",
                web::get().to(handlers::features::feature_locate),
            )
            // Code execution and login check
            .route("/run", web::post().to(handlers::run::run_code))
            .route("/login", web::get().to(handlers::auth::login)),
    );
}

/// Start the web server for the workbench API
pub async fn start_web_server(state: web::Data<AppState>, bind_addr: &str) -> std::io::Result<()> {
    info!("Starting web server on http://{}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(routes)
    })
    .bind(bind_addr)?
    .run();
    server.await
}
