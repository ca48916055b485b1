use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::model::OptParams;

/// Create-model request
#[derive(Deserialize)]
pub struct CreateModelRequest {
    pub name: String,
    /// Library import lines; merged with the defaults
    pub library: Option<Vec<String>>,
    pub code_data: Option<String>,
    pub code_model: Option<String>,
    pub code_train: Option<String>,
    pub code_test: Option<String>,
}

/// Edit/upload request for `PUT /api/models/{pk}`
#[derive(Deserialize)]
pub struct ModelOptRequest {
    /// "edit" or "upload"
    pub style: String,
    /// Primary field being changed
    pub key: String,
    /// Field values for `edit`; strings, or a line array for `library`
    pub value: Option<HashMap<String, serde_json::Value>>,
    /// Uploaded file text for `upload`
    pub content: Option<String>,
}

/// Result-query parameters shared by the compare/loss/record endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ResultQuery {
    pub train_ratio: f64,
    pub data_size: usize,
    pub sm_scale: String,
    pub chunk_name: String,
}

impl From<ResultQuery> for OptParams {
    fn from(q: ResultQuery) -> Self {
        OptParams {
            sm_scale: q.sm_scale,
            chunk_name: q.chunk_name,
            data_size: q.data_size,
            train_ratio: q.train_ratio,
            epochs: None,
            learning_rate: None,
        }
    }
}

/// Feature-distribution query
#[derive(Deserialize)]
pub struct DistQuery {
    pub feature: String,
    pub bins: usize,
    pub chunk_name: String,
    pub data_size: usize,
}

/// Geolocation query
#[derive(Deserialize)]
pub struct LocateQuery {
    pub chunk_name: String,
    pub lo_min: f64,
    pub lo_max: f64,
    pub la_min: f64,
    pub la_max: f64,
}

/// Code-execution request
#[derive(Deserialize)]
pub struct RunRequest {
    pub name: String,
    /// Code fields to concatenate, in execution order
    pub depends: Vec<String>,
}

/// Login-check query
#[derive(Deserialize)]
pub struct LoginQuery {
    pub username: String,
    pub password: String,
}

/// A 2-D chart point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// True-vs-predicted comparison response
#[derive(Serialize)]
pub struct CompareResponse {
    pub points: Vec<Point>,
    pub r2: String,
    pub rmse: String,
    pub e_mean: String,
    pub e_std: String,
}
