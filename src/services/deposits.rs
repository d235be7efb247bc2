//! Crediting advertiser wallets once the payment gateway confirms a deposit

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::entities::sea_orm_active_enums::WalletType;
use crate::error::EscrowError;
use crate::services::ledger::{DepositOutcome, LedgerStore};
use crate::services::payout_gateway::PayoutGateway;

#[derive(Clone)]
pub struct DepositService {
    ledger: LedgerStore,
    gateway: Arc<dyn PayoutGateway>,
}

impl DepositService {
    pub fn new(ledger: LedgerStore, gateway: Arc<dyn PayoutGateway>) -> Self {
        Self { ledger, gateway }
    }

    /// Verify `gateway_tx_id` with the gateway, then credit the user's
    /// advertiser wallet. Replayed confirmations credit nothing.
    pub async fn confirm_deposit(
        &self,
        user_id: i32,
        gateway_tx_id: &str,
        amount: Decimal,
    ) -> Result<DepositOutcome, EscrowError> {
        let gateway_tx_id = gateway_tx_id.trim();
        if gateway_tx_id.is_empty() {
            return Err(EscrowError::validation("gateway transaction id is required"));
        }
        if amount <= Decimal::ZERO {
            return Err(EscrowError::validation("deposit amount must be positive"));
        }

        if !self.gateway.verify_payment(gateway_tx_id).await? {
            tracing::warn!(user_id = user_id, gateway_id = gateway_tx_id, "Payment not verified");
            return Err(EscrowError::ExternalGateway(format!(
                "payment {} was not confirmed by the gateway",
                gateway_tx_id
            )));
        }

        let wallet = self.ledger.ensure_wallet(user_id, WalletType::Advertiser).await?;
        self.ledger
            .deposit_settled(wallet.id, amount, gateway_tx_id)
            .await
    }
}
