//! Train/test dispatch and progress handlers.
//!
//! The train/test slot of a model is claimed with a single conditional update
//! before the job starts and released on every exit path, so the situation
//! can never stick outside `Free` after a run and two jobs can never overlap
//! on one model.

use actix_web::{web, HttpResponse};
use log::{error, info};
use serde_json::json;

use crate::core::error::ApiError;
use crate::core::model::{Operation, OptParams, Situation};
use crate::core::registry::RegistryEntry;
use crate::web::server::AppState;

/// Records of past training runs, recovered from artifact filenames
pub async fn train_records(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    records(state, Operation::Train)
}

/// Records of past testing runs
pub async fn test_records(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    records(state, Operation::Test)
}

fn records(state: web::Data<AppState>, op: Operation) -> Result<HttpResponse, ApiError> {
    let names = state.store.model_names()?;
    Ok(HttpResponse::Ok().json(state.artifacts.records(&names, op)))
}

/// Run a training job on a model
pub async fn train_model(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<OptParams>,
) -> Result<HttpResponse, ApiError> {
    dispatch(state, path.into_inner(), req.into_inner(), Operation::Train).await
}

/// Run a testing job on a model
pub async fn test_model(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<OptParams>,
) -> Result<HttpResponse, ApiError> {
    dispatch(state, path.into_inner(), req.into_inner(), Operation::Test).await
}

async fn dispatch(
    state: web::Data<AppState>,
    name: String,
    params: OptParams,
    op: Operation,
) -> Result<HttpResponse, ApiError> {
    params.validate()?;
    let model = state
        .store
        .get_model_by_name(&name)?
        .ok_or_else(|| ApiError::NotFound(format!("model '{}'", name)))?;

    if !state.store.claim_situation(&name, op)? {
        let busy = state
            .store
            .get_situation(&name)?
            .unwrap_or(Situation::Free);
        return Err(ApiError::Conflict(format!("Is {}", busy)));
    }

    // The slot is claimed from here on: release before every return
    let live = match state.registry.get(model.id) {
        Some(RegistryEntry::Builtin(live)) => live,
        _ => {
            state.store.release_situation(&name)?;
            return Err(ApiError::BadRequest(format!(
                "model '{}' has no executable backing",
                name
            )));
        }
    };

    info!("{}: starting {} job", name, op);
    // Claim, job and release run in their own task: a client disconnect drops
    // this handler future, but the spawned job still finishes and releases
    let job = {
        let store = state.store.clone();
        let name = name.clone();
        tokio::spawn(async move {
            let result = match op {
                Operation::Train => live.training(&params).await,
                Operation::Test => live.testing(&params).await,
            };
            if let Err(e) = store.release_situation(&name) {
                error!("{}: could not release the slot: {}", name, e);
            }
            result
        })
    };
    let result = job
        .await
        .map_err(|e| ApiError::Internal(format!("{} job failed: {}", op, e)))?;

    match result {
        Ok(report) => {
            info!("{}: {} finished, r2 {:.4}", name, op, report.r2);
            Ok(HttpResponse::Ok().json(report))
        }
        Err(e) => {
            error!("{}: {} failed: {}", name, op, e);
            Err(e.into())
        }
    }
}

/// Progress log recorded during train/test runs
pub async fn get_process(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    let process = state
        .store
        .get_process(&name)?
        .ok_or_else(|| ApiError::NotFound(format!("status of model '{}'", name)))?;
    Ok(HttpResponse::Ok().json(process))
}

/// Reset the progress log to empty
pub async fn reset_process(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    if state.store.get_process(&name)?.is_none() {
        return Err(ApiError::NotFound(format!("status of model '{}'", name)));
    }
    state.store.set_process(&name, "")?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
