use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use crate::handlers::common::{acting_user, api_error, ApiError};
use crate::models::order::{
    AuditEntry, CompleteRevisionRequest, CreateOrderRequest, CreateOrderResponse,
    DeliverOrderRequest, DisputeOrderRequest, OrderResponse, RepairPublisherResponse,
    RevisionRequest,
};
use crate::services::orders::NewOrder;
use crate::AppState;

pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), ApiError> {
    let advertiser_id = acting_user(&headers)?;

    let submission = state
        .orders
        .create_order(
            advertiser_id,
            NewOrder {
                listing_ref: body.listing,
                total_amount: body.total_amount,
                fee_rate: body.fee_rate,
                content: body.content,
            },
        )
        .await
        .map_err(api_error)?;

    let status = if submission.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(CreateOrderResponse {
            order: submission.order.into(),
            created: submission.created,
        }),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let (order, content) = state.orders.order_for(order_id, actor).await.map_err(api_error)?;

    let mut response = OrderResponse::from(order);
    response.content = content;
    Ok(Json(response))
}

pub async fn accept_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let order = state.orders.accept_order(order_id, actor).await.map_err(api_error)?;
    Ok(Json(order.into()))
}

pub async fn deliver_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
    Json(body): Json<DeliverOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let order = state
        .orders
        .deliver_order(order_id, actor, &body.proof_url)
        .await
        .map_err(api_error)?;
    Ok(Json(order.into()))
}

pub async fn dispute_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
    Json(body): Json<DisputeOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let order = state
        .orders
        .dispute_order(order_id, actor, &body.reason)
        .await
        .map_err(api_error)?;
    Ok(Json(order.into()))
}

pub async fn complete_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let order = state.orders.complete_order(order_id, actor).await.map_err(api_error)?;
    Ok(Json(order.into()))
}

pub async fn request_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
    body: Option<Json<RevisionRequest>>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let notes = body.and_then(|Json(b)| b.notes);
    let order = state
        .orders
        .request_revision(order_id, actor, notes)
        .await
        .map_err(api_error)?;
    Ok(Json(order.into()))
}

pub async fn start_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let order = state.orders.start_revision(order_id, actor).await.map_err(api_error)?;
    Ok(Json(order.into()))
}

pub async fn complete_revision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
    body: Option<Json<CompleteRevisionRequest>>,
) -> Result<Json<OrderResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let proof = body.and_then(|Json(b)| b.proof_url);
    let order = state
        .orders
        .complete_revision(order_id, actor, proof)
        .await
        .map_err(api_error)?;
    Ok(Json(order.into()))
}

pub async fn repair_publisher(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<i32>,
) -> Result<Json<RepairPublisherResponse>, ApiError> {
    let actor = acting_user(&headers)?;
    let order = state
        .orders
        .repair_publisher_assignment(order_id, actor)
        .await
        .map_err(api_error)?;
    let audit = state.orders.audit_log(order_id).await.map_err(api_error)?;

    Ok(Json(RepairPublisherResponse {
        order: order.into(),
        audit: audit.into_iter().map(AuditEntry::from).collect(),
    }))
}
