//! SeaORM Entity for order content payloads (title, body, links, keywords)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_contents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_id: i32,
    pub title: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,
    /// Link targets as JSON array
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub links: Option<Json>,
    /// Keywords as JSON array
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub keywords: Option<Json>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
