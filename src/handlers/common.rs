use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::error::EscrowError;
use crate::models::common::ErrorResponse;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const API_KEY_HEADER: &str = "x-api-key";

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(e: EscrowError) -> ApiError {
    let status = e.status_code();
    if status.is_server_error() {
        tracing::error!(code = e.code(), error = %e, "Request failed");
    } else {
        tracing::debug!(code = e.code(), error = %e, "Request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
            code: e.code().to_string(),
        }),
    )
}

/// The acting user, as asserted by the upstream auth layer
pub fn acting_user(headers: &HeaderMap) -> Result<i32, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "missing or invalid X-User-Id header".to_string(),
                    code: "UNAUTHORIZED".to_string(),
                }),
            )
        })
}

pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    match (state.admin_api_key.as_deref(), provided) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        _ => Err(api_error(EscrowError::forbidden("admin API key required"))),
    }
}
