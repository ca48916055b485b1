use std::error::Error;
use std::fmt::Display;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

/// Error type for API operations, mapped onto HTTP statuses
#[derive(Debug)]
pub enum ApiError {
    /// Requested model/record/file does not exist
    NotFound(String),
    /// Slot is busy or the resource already exists
    Conflict(String),
    /// Invalid input or unknown model type
    BadRequest(String),
    /// Operation is not allowed (protected models)
    Forbidden(String),
    /// Wrong credentials on the login check
    Unauthorized(String),
    /// Subprocess execution failed
    ExecFailed(String),
    /// Anything else
    Internal(String),
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::ExecFailed(msg) => write!(f, "Execution failed: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error for ApiError {}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::ExecFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": format!("{}", self),
        }))
    }
}

/// Error type for model training/testing operations
#[derive(Debug)]
pub enum ModelError {
    /// Dataset chunk could not be loaded
    Data(String),
    /// Required artifact (e.g. trained weights) is missing
    ArtifactMissing(String),
    /// Artifact could not be written or read
    Artifact(String),
    /// Progress/status bookkeeping failed
    Status(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Data(msg) => write!(f, "Data error: {}", msg),
            ModelError::ArtifactMissing(msg) => write!(f, "Missing artifact: {}", msg),
            ModelError::Artifact(msg) => write!(f, "Artifact error: {}", msg),
            ModelError::Status(msg) => write!(f, "Status error: {}", msg),
        }
    }
}

impl Error for ModelError {}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Data(msg) => ApiError::BadRequest(msg),
            ModelError::ArtifactMissing(msg) => ApiError::NotFound(msg),
            ModelError::Artifact(msg) => ApiError::Internal(msg),
            ModelError::Status(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => {
                ApiError::NotFound("no matching record".to_string())
            }
            other => ApiError::Internal(format!("database error: {}", other)),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ApiError::NotFound(format!("{}", err)),
            _ => ApiError::Internal(format!("io error: {}", err)),
        }
    }
}
