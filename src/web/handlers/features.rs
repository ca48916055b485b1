//! Feature catalogue, distribution and geolocation handlers.

use actix_web::{web, HttpResponse};

use crate::core::error::ApiError;
use crate::data::histogram;
use crate::web::models::{DistQuery, LocateQuery};
use crate::web::server::AppState;

/// Upper bound on points returned by the geolocation query
const MAX_LOCATE_POINTS: usize = 20000;

/// All dataset feature descriptors
pub async fn list_features(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let features = state.store.list_features()?;
    Ok(HttpResponse::Ok().json(features))
}

/// Fixed display ranges for features whose tails are uninformative
fn clamp_for(feature: &str) -> (Option<f64>, Option<f64>) {
    match feature {
        "source_depth_km" => (Some(0.0), Some(150.0)),
        "source_magnitude" => (Some(0.0), None),
        _ => (None, None),
    }
}

/// Decimal places for bin centers, per feature
fn rounding_for(feature: &str) -> Option<u32> {
    match feature {
        "source_distance_km" | "source_depth_km" | "snr_db" | "p_arrival_sample"
        | "s_arrival_sample" => Some(0),
        "source_magnitude" => Some(2),
        _ => None,
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Value distribution of one feature over a chunk
pub async fn feature_dist(
    state: web::Data<AppState>,
    query: web::Query<DistQuery>,
) -> Result<HttpResponse, ApiError> {
    if query.bins == 0 {
        return Err(ApiError::BadRequest("bins must be positive".to_string()));
    }
    let q = query.into_inner();
    let feature = q.feature.clone();
    let bins = q.bins;
    let loader = state.loader.clone();
    let values = web::block(move || loader.load_column(&q.chunk_name, &q.feature, q.data_size))
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))??;

    let (v_min, v_max) = clamp_for(&feature);
    let mut points = histogram(&values, bins, v_min, v_max);
    if let Some(decimals) = rounding_for(&feature) {
        for point in &mut points {
            point.x = round_to(point.x, decimals);
        }
    }
    Ok(HttpResponse::Ok().json(points))
}

/// Earthquake sources inside a longitude/latitude box
pub async fn feature_locate(
    state: web::Data<AppState>,
    query: web::Query<LocateQuery>,
) -> Result<HttpResponse, ApiError> {
    let loader = state.loader.clone();
    let q = query.into_inner();
    let sources = web::block(move || {
        loader.locate(
            &q.chunk_name,
            q.lo_min,
            q.lo_max,
            q.la_min,
            q.la_max,
            MAX_LOCATE_POINTS,
        )
    })
    .await
    .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))??;
    Ok(HttpResponse::Ok().json(sources))
}
