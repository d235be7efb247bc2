//! Outbound notifications for order and withdrawal events.
//!
//! Delivery is fire-and-forget: `dispatch` spawns the call and logs a
//! failure, it never reports back to the transition that triggered it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::EscrowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewOrder,
    OrderAccepted,
    OrderDelivered,
    OrderDisputed,
    OrderCompleted,
    RevisionRequested,
    RevisionStarted,
    RevisionCompleted,
    WithdrawalApproved,
    WithdrawalDenied,
    WithdrawalPaid,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NewOrder => "new_order",
            Self::OrderAccepted => "order_accepted",
            Self::OrderDelivered => "order_delivered",
            Self::OrderDisputed => "order_disputed",
            Self::OrderCompleted => "order_completed",
            Self::RevisionRequested => "revision_requested",
            Self::RevisionStarted => "revision_started",
            Self::RevisionCompleted => "revision_completed",
            Self::WithdrawalApproved => "withdrawal_approved",
            Self::WithdrawalDenied => "withdrawal_denied",
            Self::WithdrawalPaid => "withdrawal_paid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: i32,
    /// None for system-originated events
    pub sender_id: Option<i32>,
    pub order_id: Option<i32>,
    pub withdrawal_request_id: Option<i32>,
    pub event: EventKind,
}

impl Notification {
    pub fn order(recipient_id: i32, sender_id: i32, order_id: i32, event: EventKind) -> Self {
        Self {
            recipient_id,
            sender_id: Some(sender_id),
            order_id: Some(order_id),
            withdrawal_request_id: None,
            event,
        }
    }

    pub fn withdrawal(recipient_id: i32, withdrawal_request_id: i32, event: EventKind) -> Self {
        Self {
            recipient_id,
            sender_id: None,
            order_id: None,
            withdrawal_request_id: Some(withdrawal_request_id),
            event,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), EscrowError>;
}

/// Spawn delivery and forget about it
pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&notification).await {
            tracing::warn!(
                event = notification.event.as_str(),
                recipient_id = notification.recipient_id,
                error = %e,
                "Notification delivery failed"
            );
        }
    });
}

/// Writes every event to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), EscrowError> {
        tracing::info!(
            event = notification.event.as_str(),
            recipient_id = notification.recipient_id,
            sender_id = ?notification.sender_id,
            order_id = ?notification.order_id,
            withdrawal_request_id = ?notification.withdrawal_request_id,
            "Notification"
        );
        Ok(())
    }
}

/// POSTs each event as JSON to a webhook, tagged with a unique event id
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), EscrowError> {
        let response = self
            .client
            .post(&self.url)
            .header("X-Event-Id", Uuid::new_v4().to_string())
            .json(notification)
            .send()
            .await
            .map_err(|e| EscrowError::ExternalGateway(format!("webhook failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EscrowError::ExternalGateway(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serializes_camel_case() {
        let n = Notification::order(2, 1, 9, EventKind::OrderAccepted);
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["recipientId"], 2);
        assert_eq!(json["orderId"], 9);
        assert_eq!(json["event"], "order_accepted");
        assert!(json["withdrawalRequestId"].is_null());
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let n = Notification::withdrawal(5, 3, EventKind::WithdrawalPaid);
        assert!(LogNotifier.notify(&n).await.is_ok());
    }
}
