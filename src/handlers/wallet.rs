use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};

use crate::entities::sea_orm_active_enums::WalletType;
use crate::error::EscrowError;
use crate::handlers::common::{acting_user, api_error, require_admin, ApiError};
use crate::models::wallet::{WalletQuery, WalletResponse};
use crate::services::ledger::Reconciliation;
use crate::AppState;

/// The caller's wallet of the requested type (advertiser by default)
pub async fn get_my_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WalletQuery>,
) -> Result<Json<WalletResponse>, ApiError> {
    let owner_id = acting_user(&headers)?;
    let wallet_type = query.wallet_type.unwrap_or(WalletType::Advertiser);
    if wallet_type == WalletType::Platform {
        return Err(api_error(EscrowError::forbidden("platform wallet is not user-owned")));
    }

    let wallet = state
        .ledger
        .ensure_wallet(owner_id, wallet_type)
        .await
        .map_err(api_error)?;
    let credit_pool = state.ledger.credit_pool(wallet.id).await.map_err(api_error)?;
    let txs = state.ledger.transactions_for(wallet.id).await.map_err(api_error)?;

    Ok(Json(WalletResponse::new(wallet, credit_pool, txs)))
}

pub async fn reconcile_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(wallet_id): Path<i32>,
) -> Result<Json<Reconciliation>, ApiError> {
    require_admin(&state, &headers)?;
    let report = state.ledger.reconcile(wallet_id).await.map_err(api_error)?;
    Ok(Json(report))
}
