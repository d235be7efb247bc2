//! Payment / payout gateway collaborator.
//!
//! The withdrawal engine only ever sees `dyn PayoutGateway`; production wires
//! the HTTP client below, tests inject a scripted fake.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EscrowError;

/// Status reported by the gateway for a payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Success,
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub transaction_id: String,
    pub status: PayoutStatus,
}

#[async_trait]
pub trait PayoutGateway: Send + Sync {
    /// Send `amount` to `destination` (method + details of the withdrawal)
    async fn create_payout(
        &self,
        amount: Decimal,
        destination: &PayoutDestination,
    ) -> Result<PayoutReceipt, EscrowError>;

    /// Whether the gateway confirms a payment with this id as settled
    async fn verify_payment(&self, payment_id: &str) -> Result<bool, EscrowError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutDestination {
    pub method: String,
    pub details: Option<serde_json::Value>,
}

/// Gateway used when no payout provider is configured; every call fails
pub struct UnconfiguredGateway;

#[async_trait]
impl PayoutGateway for UnconfiguredGateway {
    async fn create_payout(
        &self,
        _amount: Decimal,
        _destination: &PayoutDestination,
    ) -> Result<PayoutReceipt, EscrowError> {
        Err(EscrowError::ExternalGateway(
            "payout gateway is not configured".to_string(),
        ))
    }

    async fn verify_payment(&self, _payment_id: &str) -> Result<bool, EscrowError> {
        Err(EscrowError::ExternalGateway(
            "payment gateway is not configured".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayoutBody<'a> {
    amount: Decimal,
    method: &'a str,
    details: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayoutResponse {
    transaction_id: String,
    status: PayoutStatus,
}

#[derive(Debug, Deserialize)]
struct VerifyPaymentResponse {
    verified: bool,
}

/// JSON-over-HTTP payout provider
#[derive(Clone)]
pub struct HttpPayoutGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPayoutGateway {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl PayoutGateway for HttpPayoutGateway {
    async fn create_payout(
        &self,
        amount: Decimal,
        destination: &PayoutDestination,
    ) -> Result<PayoutReceipt, EscrowError> {
        let url = format!("{}/payouts", self.base_url);
        let body = CreatePayoutBody {
            amount,
            method: &destination.method,
            details: destination.details.as_ref(),
        };

        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| EscrowError::ExternalGateway(format!("payout request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EscrowError::ExternalGateway(format!(
                "payout gateway returned {}",
                response.status()
            )));
        }

        let parsed: CreatePayoutResponse = response
            .json()
            .await
            .map_err(|e| EscrowError::ExternalGateway(format!("invalid payout response: {}", e)))?;

        Ok(PayoutReceipt {
            transaction_id: parsed.transaction_id,
            status: parsed.status,
        })
    }

    async fn verify_payment(&self, payment_id: &str) -> Result<bool, EscrowError> {
        let url = format!("{}/payments/{}/verify", self.base_url, payment_id);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| EscrowError::ExternalGateway(format!("verify request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EscrowError::ExternalGateway(format!(
                "payment gateway returned {}",
                response.status()
            )));
        }

        let parsed: VerifyPaymentResponse = response
            .json()
            .await
            .map_err(|e| EscrowError::ExternalGateway(format!("invalid verify response: {}", e)))?;

        Ok(parsed.verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_unconfigured_gateway_always_fails() {
        let gateway = UnconfiguredGateway;
        let destination = PayoutDestination {
            method: "paypal".into(),
            details: None,
        };
        let err = gateway.create_payout(dec!(10), &destination).await.unwrap_err();
        assert_eq!(err.code(), "GATEWAY_ERROR");
        assert!(gateway.verify_payment("pay_1").await.is_err());
    }

    #[test]
    fn test_payout_response_parsing() {
        let parsed: CreatePayoutResponse =
            serde_json::from_str(r#"{"transactionId":"po_123","status":"success"}"#).unwrap();
        assert_eq!(parsed.transaction_id, "po_123");
        assert_eq!(parsed.status, PayoutStatus::Success);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let gateway = HttpPayoutGateway::new("https://pay.example.com/".into(), None, Duration::from_secs(5));
        assert_eq!(gateway.base_url, "https://pay.example.com");
    }
}
