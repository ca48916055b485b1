//! Arbitrary-code execution endpoint.

use actix_web::{web, HttpResponse};
use log::info;

use crate::core::error::ApiError;
use crate::runner::CodeRunner;
use crate::web::models::RunRequest;
use crate::web::server::AppState;

/// Concatenate the named code fields of a model and execute the result
pub async fn run_code(
    state: web::Data<AppState>,
    req: web::Json<RunRequest>,
) -> Result<HttpResponse, ApiError> {
    if req.name.is_empty() || req.depends.is_empty() {
        return Err(ApiError::BadRequest(
            "missing 'name' or 'depends' in request data".to_string(),
        ));
    }
    let model = state
        .store
        .get_model_by_name(&req.name)?
        .ok_or_else(|| ApiError::NotFound(format!("model '{}'", req.name)))?;

    let mut fragments: Vec<&str> = Vec::with_capacity(req.depends.len());
    for depend in &req.depends {
        let fragment = match depend.as_str() {
            "library" => model.library.as_str(),
            "code_data" => model.code_data.as_str(),
            "code_model" => model.code_model.as_str(),
            "code_train" => model.code_train.as_str(),
            "code_test" => model.code_test.as_str(),
            other => {
                return Err(ApiError::BadRequest(format!(
                    "unknown code field '{}', must be 'library', 'code_data', \
                     'code_model', 'code_train' or 'code_test'",
                    other
                )))
            }
        };
        fragments.push(fragment);
    }

    let code = CodeRunner::concat_code(&fragments);
    let outcome = state.runner.run(&code).await?;
    info!(
        "Run {} for model '{}': {}",
        outcome.id,
        req.name,
        if outcome.failed { "failed" } else { "ok" }
    );
    if outcome.failed {
        return Err(ApiError::ExecFailed(outcome.stderr));
    }
    Ok(HttpResponse::Ok().json(outcome.stdout))
}
