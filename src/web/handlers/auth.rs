//! Login check.

use actix_web::{web, HttpResponse};
use log::info;
use serde_json::json;

use crate::core::error::ApiError;
use crate::web::models::LoginQuery;
use crate::web::server::AppState;

/// Check a username/password pair against the users table
pub async fn login(
    state: web::Data<AppState>,
    query: web::Query<LoginQuery>,
) -> Result<HttpResponse, ApiError> {
    let password = match state.store.get_password(&query.username)? {
        Some(password) => password,
        None => {
            info!("Login for unknown user '{}'", query.username);
            return Ok(HttpResponse::NotFound().json(json!({ "msg": "user_not_exist" })));
        }
    };
    if password == query.password {
        info!("User '{}' logged in", query.username);
        Ok(HttpResponse::Ok().json(json!({ "msg": "login_success" })))
    } else {
        info!("Wrong password for user '{}'", query.username);
        Ok(HttpResponse::Unauthorized().json(json!({ "msg": "password_error" })))
    }
}
