use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::handlers::common::{acting_user, api_error, require_admin, ApiError};
use crate::models::withdrawal::{CreateWithdrawalRequest, DenyWithdrawalRequest, WithdrawalResponse};
use crate::AppState;

pub async fn create_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalResponse>), ApiError> {
    let publisher_id = acting_user(&headers)?;

    let request = state
        .withdrawals
        .request_withdrawal(publisher_id, body.amount, &body.method, body.details)
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(request.into())))
}

pub async fn list_my_withdrawals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<WithdrawalResponse>>, ApiError> {
    let publisher_id = acting_user(&headers)?;
    let rows = state
        .withdrawals
        .list_for_publisher(publisher_id)
        .await
        .map_err(api_error)?;
    Ok(Json(rows.into_iter().map(WithdrawalResponse::from).collect()))
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(withdrawal_id): Path<i32>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let paid = state.withdrawals.approve(withdrawal_id).await.map_err(api_error)?;
    Ok(Json(paid.into()))
}

pub async fn deny_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(withdrawal_id): Path<i32>,
    Json(body): Json<DenyWithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let denied = state
        .withdrawals
        .deny(withdrawal_id, &body.reason)
        .await
        .map_err(api_error)?;
    Ok(Json(denied.into()))
}
