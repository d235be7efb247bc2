use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::handlers::common::{api_error, require_admin, ApiError};
use crate::services::tat_estimator::{TatOptions, TatRecompute};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TatQuery {
    pub lookback_days: Option<i64>,
    pub min_order_count: Option<usize>,
    pub use_weighted_average: Option<bool>,
}

impl TatQuery {
    fn options(&self) -> TatOptions {
        let defaults = TatOptions::default();
        TatOptions {
            lookback_days: self.lookback_days.unwrap_or(defaults.lookback_days),
            min_order_count: self.min_order_count.unwrap_or(defaults.min_order_count),
            use_weighted_average: self.use_weighted_average.unwrap_or(defaults.use_weighted_average),
        }
    }
}

pub async fn recompute_listing_tat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(listing_id): Path<i32>,
    Query(query): Query<TatQuery>,
) -> Result<Json<TatRecompute>, ApiError> {
    require_admin(&state, &headers)?;
    let result = state
        .tat
        .recompute(listing_id, query.options())
        .await
        .map_err(api_error)?;
    Ok(Json(result))
}
