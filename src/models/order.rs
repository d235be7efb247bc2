use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{
    order_audit_log, orders,
    sea_orm_active_enums::{OrderStatus, RevisionStatus},
};
use crate::services::content_store::ContentPayload;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Listing id or site URL
    pub listing: Option<String>,
    pub total_amount: Option<Decimal>,
    pub fee_rate: Option<Decimal>,
    #[serde(default)]
    pub content: ContentPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverOrderRequest {
    pub proof_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisputeOrderRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevisionRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRevisionRequest {
    pub proof_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i32,
    pub advertiser_id: i32,
    pub publisher_id: Option<i32>,
    pub listing_id: i32,
    pub total_amount: Decimal,
    pub fee_rate: Decimal,
    pub platform_fee: Decimal,
    pub escrow_held: Decimal,
    pub status: OrderStatus,
    pub revision_status: RevisionStatus,
    pub proof_url: Option<String>,
    pub dispute_reason: Option<String>,
    pub revision_notes: Option<String>,
    pub order_date: DateTime<FixedOffset>,
    pub accepted_date: Option<DateTime<FixedOffset>>,
    pub delivered_date: Option<DateTime<FixedOffset>>,
    pub dispute_date: Option<DateTime<FixedOffset>>,
    pub completed_date: Option<DateTime<FixedOffset>>,
    pub revision_requested_at: Option<DateTime<FixedOffset>>,
    pub revision_deadline: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentPayload>,
}

impl From<orders::Model> for OrderResponse {
    fn from(o: orders::Model) -> Self {
        Self {
            id: o.id,
            advertiser_id: o.advertiser_id,
            publisher_id: o.publisher_id,
            listing_id: o.listing_id,
            total_amount: o.total_amount,
            fee_rate: o.fee_rate,
            platform_fee: o.platform_fee,
            escrow_held: o.escrow_held,
            status: o.status,
            revision_status: o.revision_status,
            proof_url: o.proof_url,
            dispute_reason: o.dispute_reason,
            revision_notes: o.revision_notes,
            order_date: o.order_date,
            accepted_date: o.accepted_date,
            delivered_date: o.delivered_date,
            dispute_date: o.dispute_date,
            completed_date: o.completed_date,
            revision_requested_at: o.revision_requested_at,
            revision_deadline: o.revision_deadline,
            content: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order: OrderResponse,
    /// False when a duplicate submission returned an existing order
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairPublisherResponse {
    pub order: OrderResponse,
    pub audit: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub actor_id: i32,
    pub previous_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

impl From<order_audit_log::Model> for AuditEntry {
    fn from(a: order_audit_log::Model) -> Self {
        Self {
            action: a.action,
            actor_id: a.actor_id,
            previous_value: a.previous_value,
            new_value: a.new_value,
            created_at: a.created_at,
        }
    }
}
