//! SeaORM Entity for marketplace listings
//!
//! Only `tat` and `placement_speed` are written by this service.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "listings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Site URL as entered by the publisher
    pub url: String,
    /// Owner of the site; matched against the acting user's email
    pub publisher_email: String,
    /// Turnaround time in days
    pub tat: Option<i32>,
    /// "Ultra Fast" | "Fast" | "Normal" | "Slow"
    pub placement_speed: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::orders::Entity")]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
