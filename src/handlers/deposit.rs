use axum::{extract::State, http::HeaderMap, Json};

use crate::handlers::common::{acting_user, api_error, ApiError};
use crate::models::wallet::{ConfirmDepositRequest, ConfirmDepositResponse};
use crate::AppState;

pub async fn confirm_deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ConfirmDepositRequest>,
) -> Result<Json<ConfirmDepositResponse>, ApiError> {
    let user_id = acting_user(&headers)?;

    let outcome = state
        .deposits
        .confirm_deposit(user_id, &body.gateway_transaction_id, body.amount)
        .await
        .map_err(api_error)?;

    Ok(Json(ConfirmDepositResponse {
        transaction: outcome.transaction.into(),
        replayed: outcome.replayed,
    }))
}
