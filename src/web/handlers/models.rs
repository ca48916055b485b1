//! Model CRUD handlers.

use actix_web::{web, HttpResponse};
use log::info;

use crate::core::error::ApiError;
use crate::models::is_protected;
use crate::runner::pysrc::{dedup_library, default_library, filter_source};
use crate::store::{DlModel, EDITABLE_FIELDS};
use crate::web::models::{CreateModelRequest, ModelOptRequest};
use crate::web::server::AppState;

/// All model definitions
pub async fn list_models(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let models = state.store.list_models()?;
    Ok(HttpResponse::Ok().json(models))
}

/// Create a model and its status row; user models get a registry placeholder
pub async fn create_model(
    state: web::Data<AppState>,
    req: web::Json<CreateModelRequest>,
) -> Result<HttpResponse, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("model name must not be empty".to_string()));
    }
    if state.store.name_exists(name)? {
        return Err(ApiError::Conflict("Model name already exists".to_string()));
    }

    let mut library = default_library();
    if let Some(extra) = &req.library {
        library.extend(extra.iter().cloned());
    }
    let library = dedup_library(library).join("\n");

    let id = state.store.create_model(
        name,
        &library,
        req.code_data.as_deref().unwrap_or(""),
        req.code_model.as_deref().unwrap_or(""),
        req.code_train.as_deref().unwrap_or(""),
        req.code_test.as_deref().unwrap_or(""),
    )?;
    if !is_protected(name) {
        state.registry.register_placeholder(id);
    }
    info!("Created model '{}' (id {})", name, id);

    let model = state
        .store
        .get_model_by_pk(id)?
        .ok_or_else(|| ApiError::Internal("created model disappeared".to_string()))?;
    Ok(HttpResponse::Created().json(model))
}

/// Detail view of one model by name
pub async fn model_detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    let model = state
        .store
        .get_model_by_name(&name)?
        .ok_or_else(|| ApiError::NotFound(format!("model '{}'", name)))?;
    Ok(HttpResponse::Ok().json(model))
}

fn require_model(state: &AppState, pk: i64) -> Result<DlModel, ApiError> {
    state
        .store
        .get_model_by_pk(pk)?
        .ok_or_else(|| ApiError::NotFound(format!("model id {}", pk)))
}

/// Library values arrive as a line array or a single string
fn value_as_lines(value: &serde_json::Value) -> Result<Vec<String>, ApiError> {
    match value {
        serde_json::Value::String(s) => Ok(s.lines().map(|l| l.to_string()).collect()),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::BadRequest("library lines must be strings".to_string()))
            })
            .collect(),
        _ => Err(ApiError::BadRequest("unsupported value type".to_string())),
    }
}

/// Edit stored fields or fill them from an uploaded file
pub async fn edit_model(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    req: web::Json<ModelOptRequest>,
) -> Result<HttpResponse, ApiError> {
    let pk = path.into_inner();
    let model = require_model(&state, pk)?;

    match req.style.as_str() {
        "edit" => {
            let value = req
                .value
                .as_ref()
                .ok_or_else(|| ApiError::BadRequest("missing 'value' for edit".to_string()))?;
            for (field, raw) in value {
                if !EDITABLE_FIELDS.contains(&field.as_str()) {
                    return Err(ApiError::BadRequest(format!(
                        "'{}' is not an editable field",
                        field
                    )));
                }
                let text = if field == "library" {
                    // Default imports always survive an edit
                    let mut lines = default_library();
                    lines.extend(value_as_lines(raw)?);
                    dedup_library(lines).join("\n")
                } else {
                    raw.as_str()
                        .ok_or_else(|| {
                            ApiError::BadRequest(format!("'{}' must be a string", field))
                        })?
                        .to_string()
                };

                if field == "name" {
                    if text.trim().is_empty() {
                        return Err(ApiError::BadRequest("model name must not be empty".to_string()));
                    }
                    if text != model.name && state.store.name_exists(&text)? {
                        return Err(ApiError::Conflict("Model name already exists".to_string()));
                    }
                    state.store.update_model_field(pk, "name", &text)?;
                    state.store.rename_status(&model.name, &text)?;
                } else {
                    state.store.update_model_field(pk, field, &text)?;
                }
            }
            Ok(HttpResponse::NoContent().finish())
        }
        "upload" => {
            let content = req
                .content
                .as_ref()
                .ok_or_else(|| ApiError::BadRequest("missing 'content' for upload".to_string()))?;
            let lines = match req.key.as_str() {
                "library" => filter_source(content, true),
                "code_data" | "code_model" | "code_train" | "code_test" => {
                    filter_source(content, false)
                }
                other => {
                    return Err(ApiError::BadRequest(format!(
                        "unknown upload key '{}', must be 'library', 'code_data', \
                         'code_model', 'code_train' or 'code_test'",
                        other
                    )))
                }
            };
            let text = lines.join("\n");
            state.store.update_model_field(pk, &req.key, &text)?;
            Ok(HttpResponse::Ok().json(text))
        }
        other => Err(ApiError::BadRequest(format!(
            "unknown style '{}', must be 'edit' or 'upload'",
            other
        ))),
    }
}

/// Delete a model unless it is one of the protected built-ins
pub async fn delete_model(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let pk = path.into_inner();
    let model = require_model(&state, pk)?;
    if is_protected(&model.name) {
        return Err(ApiError::Forbidden("Cannot delete default model".to_string()));
    }
    state.store.delete_model(pk, &model.name)?;
    state.registry.unregister(pk);
    info!("Deleted model '{}' (id {})", model.name, pk);
    Ok(HttpResponse::NoContent().finish())
}
