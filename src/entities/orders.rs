//! SeaORM Entity for orders
//!
//! Rows are never deleted; status plus the per-transition timestamps form
//! the audit trail. `escrow_held` is written once at creation.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{OrderStatus, RevisionStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub advertiser_id: i32,
    /// Unset until a publisher accepts the order
    pub publisher_id: Option<i32>,
    pub listing_id: i32,
    /// Agreed price paid to the publisher
    pub total_amount: Decimal,
    pub fee_rate: Decimal,
    /// total_amount * fee_rate
    pub platform_fee: Decimal,
    /// total_amount + platform_fee, debited from the advertiser at creation
    pub escrow_held: Decimal,
    pub status: OrderStatus,
    pub revision_status: RevisionStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub proof_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub dispute_reason: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub revision_notes: Option<String>,
    pub order_date: DateTimeWithTimeZone,
    pub accepted_date: Option<DateTimeWithTimeZone>,
    pub delivered_date: Option<DateTimeWithTimeZone>,
    pub dispute_date: Option<DateTimeWithTimeZone>,
    pub completed_date: Option<DateTimeWithTimeZone>,
    pub revision_requested_at: Option<DateTimeWithTimeZone>,
    pub revision_deadline: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::listings::Entity",
        from = "Column::ListingId",
        to = "super::listings::Column::Id"
    )]
    Listing,
}

impl Related<super::listings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Listing.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
