//! Order content payload store (title, body, links, keywords).
//!
//! Writes here are best-effort: the order row is authoritative and a failed
//! content write is logged by the caller, never rolled back into the order.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};

use crate::entities::{order_contents, prelude::OrderContents};
use crate::error::EscrowError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ContentPayload {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.links.is_empty() && self.keywords.is_empty()
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn save(&self, order_id: i32, payload: &ContentPayload) -> Result<(), EscrowError>;

    async fn load(&self, order_id: i32) -> Result<Option<ContentPayload>, EscrowError>;
}

#[derive(Clone)]
pub struct DbContentStore {
    db: DatabaseConnection,
}

impl DbContentStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn string_list(value: Option<serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

#[async_trait]
impl ContentStore for DbContentStore {
    async fn save(&self, order_id: i32, payload: &ContentPayload) -> Result<(), EscrowError> {
        let row = order_contents::ActiveModel {
            order_id: Set(order_id),
            title: Set(payload.title.clone()),
            body: Set(payload.body.clone()),
            links: Set(Some(serde_json::json!(payload.links))),
            keywords: Set(Some(serde_json::json!(payload.keywords))),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        row.insert(&self.db).await?;
        Ok(())
    }

    async fn load(&self, order_id: i32) -> Result<Option<ContentPayload>, EscrowError> {
        let row = OrderContents::find()
            .filter(order_contents::Column::OrderId.eq(order_id))
            .one(&self.db)
            .await?;

        Ok(row.map(|r| ContentPayload {
            title: r.title,
            body: r.body,
            links: string_list(r.links),
            keywords: string_list(r.keywords),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_list_tolerates_bad_json() {
        assert_eq!(
            string_list(Some(serde_json::json!(["a", "b"]))),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(string_list(Some(serde_json::json!({"a": 1}))).is_empty());
        assert!(string_list(None).is_empty());
    }

    #[test]
    fn test_payload_defaults_from_json() {
        let payload: ContentPayload = serde_json::from_str(r#"{"title":"Guest post"}"#).unwrap();
        assert_eq!(payload.title.as_deref(), Some("Guest post"));
        assert!(payload.links.is_empty());
        assert!(!payload.is_empty());
        assert!(ContentPayload::default().is_empty());
    }
}
