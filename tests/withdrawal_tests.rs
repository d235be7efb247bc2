mod common;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

use backlink_escrow::entities::{
    prelude::Transactions,
    sea_orm_active_enums::{TransactionStatus, TransactionType, WalletType, WithdrawalStatus},
    transactions, wallets,
};
use backlink_escrow::services::content_store::ContentPayload;
use backlink_escrow::services::notifications::EventKind;
use backlink_escrow::services::orders::NewOrder;
use backlink_escrow::services::payout_gateway::PayoutStatus;

use crate::common::{seed_marketplace, Marketplace, PayoutScript, TestApp};

/// Publisher who earned 80 from one completed order and deposited 30
async fn earning_publisher(app: &TestApp) -> (Marketplace, wallets::Model) {
    let m = seed_marketplace(app, dec!(200)).await;
    let orders = &app.state.orders;

    let order = orders
        .create_order(
            m.advertiser_id,
            NewOrder {
                listing_ref: Some(m.listing.id.to_string()),
                total_amount: Some(dec!(80)),
                fee_rate: None,
                content: ContentPayload::default(),
            },
        )
        .await
        .unwrap()
        .order;
    orders.accept_order(order.id, m.publisher_id).await.unwrap();
    orders
        .deliver_order(order.id, m.publisher_id, "https://techblog.example.com/post")
        .await
        .unwrap();
    orders.complete_order(order.id, m.advertiser_id).await.unwrap();

    let wallet = app
        .ledger()
        .find_wallet(m.publisher_id, WalletType::Publisher)
        .await
        .unwrap()
        .expect("publisher wallet");
    app.ledger()
        .deposit_settled(wallet.id, dec!(30), "dep_publisher_topup")
        .await
        .unwrap();

    let wallet = app.wallet(wallet.id).await;
    assert_eq!(wallet.balance, dec!(110));
    (m, wallet)
}

async fn credits_of(app: &TestApp, wallet_id: i32) -> Vec<transactions::Model> {
    Transactions::find()
        .filter(transactions::Column::WalletId.eq(wallet_id))
        .filter(transactions::Column::TxType.eq(TransactionType::EscrowRelease))
        .all(&app.db)
        .await
        .unwrap()
}

fn bank() -> Option<serde_json::Value> {
    Some(json!({ "iban": "DE89370400440532013000" }))
}

#[tokio::test]
async fn test_request_draws_free_balance_then_credits() {
    let app = TestApp::new().await;
    let (m, wallet) = earning_publisher(&app).await;

    let request = app
        .state
        .withdrawals
        .request_withdrawal(m.publisher_id, dec!(100), "bank_transfer", bank())
        .await
        .unwrap();

    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(request.amount_from_wallet, dec!(30));
    assert_eq!(request.amount_from_orders, dec!(70));
    assert!(!request.payout_in_flight);

    let wallet = app.wallet(wallet.id).await;
    assert_eq!(wallet.balance, dec!(10));
    assert_eq!(wallet.escrow_balance, dec!(100));

    let credits = credits_of(&app, wallet.id).await;
    let consumed: Vec<_> = credits
        .iter()
        .filter(|c| c.status == TransactionStatus::Processing)
        .collect();
    let remaining: Vec<_> = credits
        .iter()
        .filter(|c| c.status == TransactionStatus::Pending)
        .collect();
    assert_eq!(consumed.len(), 1);
    assert_eq!(consumed[0].net_amount, dec!(70));
    assert_eq!(consumed[0].withdrawal_request_id, Some(request.id));
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].net_amount, dec!(10));
    assert_eq!(app.ledger().credit_pool(wallet.id).await.unwrap(), dec!(10));

    let report = app.ledger().reconcile(wallet.id).await.unwrap();
    assert!(report.consistent, "{:?}", report);
}

#[tokio::test]
async fn test_request_more_than_available() {
    let app = TestApp::new().await;
    let (m, wallet) = earning_publisher(&app).await;

    let err = app
        .state
        .withdrawals
        .request_withdrawal(m.publisher_id, dec!(111), "bank_transfer", bank())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    let after = app.wallet(wallet.id).await;
    assert_eq!(after.balance, dec!(110));
    assert_eq!(after.escrow_balance, Decimal::ZERO);
    assert!(app.state.withdrawals.list_for_publisher(m.publisher_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_request_validation() {
    let app = TestApp::new().await;
    let (m, _) = earning_publisher(&app).await;
    let withdrawals = &app.state.withdrawals;

    let err = withdrawals
        .request_withdrawal(m.publisher_id, dec!(10), " ", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let err = withdrawals
        .request_withdrawal(m.publisher_id, dec!(0), "paypal", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    // Advertiser has no publisher wallet
    let err = withdrawals
        .request_withdrawal(m.advertiser_id, dec!(10), "paypal", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_approve_pays_out_and_settles() {
    let app = TestApp::new().await;
    let (m, wallet) = earning_publisher(&app).await;
    let withdrawals = &app.state.withdrawals;
    let request = withdrawals
        .request_withdrawal(m.publisher_id, dec!(100), "bank_transfer", bank())
        .await
        .unwrap();
    app.gateway.push(PayoutScript::Succeed("po_42".to_string()));

    let paid = withdrawals.approve(request.id).await.unwrap();

    assert_eq!(paid.status, WithdrawalStatus::Paid);
    assert_eq!(paid.gateway_payout_id.as_deref(), Some("po_42"));
    assert!(!paid.payout_in_flight);
    assert!(paid.resolved_at.is_some());

    let after = app.wallet(wallet.id).await;
    assert_eq!(after.balance, dec!(10));
    assert_eq!(after.escrow_balance, Decimal::ZERO);

    let payouts = app.gateway.payouts.lock().clone();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].0, dec!(100));
    assert_eq!(payouts[0].1.method, "bank_transfer");

    let credits = credits_of(&app, wallet.id).await;
    assert!(credits
        .iter()
        .filter(|c| c.withdrawal_request_id == Some(request.id))
        .all(|c| c.status == TransactionStatus::Success));

    let report = app.ledger().reconcile(wallet.id).await.unwrap();
    assert!(report.consistent, "{:?}", report);

    // Cannot be paid twice
    let err = withdrawals.approve(request.id).await.unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    assert_eq!(app.gateway.payout_count(), 1);

    app.settle().await;
    let kinds = app.notifier.kinds();
    assert!(kinds.contains(&EventKind::WithdrawalApproved));
    assert!(kinds.contains(&EventKind::WithdrawalPaid));
}

#[tokio::test]
async fn test_gateway_failures_leave_request_retryable() {
    let app = TestApp::new().await;
    let (m, wallet) = earning_publisher(&app).await;
    let withdrawals = &app.state.withdrawals;
    let request = withdrawals
        .request_withdrawal(m.publisher_id, dec!(100), "bank_transfer", bank())
        .await
        .unwrap();

    app.gateway.push(PayoutScript::Fail("card network down".to_string()));
    app.gateway.push(PayoutScript::Hang);
    app.gateway.push(PayoutScript::Report(PayoutStatus::Pending));

    for _ in 0..3 {
        let err = withdrawals.approve(request.id).await.unwrap_err();
        assert_eq!(err.code(), "GATEWAY_ERROR");

        let current = withdrawals.get(request.id).await.unwrap();
        assert_eq!(current.status, WithdrawalStatus::Pending);
        assert!(!current.payout_in_flight);

        let held = app.wallet(wallet.id).await;
        assert_eq!(held.escrow_balance, dec!(100));
    }

    let failed_payouts = Transactions::find()
        .filter(transactions::Column::TxType.eq(TransactionType::Payout))
        .filter(transactions::Column::Status.eq(TransactionStatus::Failed))
        .all(&app.db)
        .await
        .unwrap();
    assert_eq!(failed_payouts.len(), 3);

    // Script exhausted: the retry succeeds
    let paid = withdrawals.approve(request.id).await.unwrap();
    assert_eq!(paid.status, WithdrawalStatus::Paid);
    assert_eq!(app.wallet(wallet.id).await.escrow_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_deny_refunds_and_restores_balance() {
    let app = TestApp::new().await;
    let (m, wallet) = earning_publisher(&app).await;
    let withdrawals = &app.state.withdrawals;
    let request = withdrawals
        .request_withdrawal(m.publisher_id, dec!(100), "bank_transfer", bank())
        .await
        .unwrap();

    let err = withdrawals.deny(request.id, "").await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let denied = withdrawals.deny(request.id, "account details mismatch").await.unwrap();
    assert_eq!(denied.status, WithdrawalStatus::Denied);
    assert_eq!(denied.denial_reason.as_deref(), Some("account details mismatch"));

    let after = app.wallet(wallet.id).await;
    assert_eq!(after.balance, dec!(110));
    assert_eq!(after.escrow_balance, Decimal::ZERO);

    // Consumed credits are settled; the refunded amount is free balance now
    assert_eq!(app.ledger().credit_pool(wallet.id).await.unwrap(), dec!(10));
    let report = app.ledger().reconcile(wallet.id).await.unwrap();
    assert!(report.consistent, "{:?}", report);

    let err = withdrawals.approve(request.id).await.unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    let err = withdrawals.deny(request.id, "again").await.unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    assert_eq!(app.gateway.payout_count(), 0);

    // Refunded funds can be withdrawn again
    let again = withdrawals
        .request_withdrawal(m.publisher_id, dec!(110), "bank_transfer", bank())
        .await
        .unwrap();
    assert_eq!(again.amount_from_wallet, dec!(100));
    assert_eq!(again.amount_from_orders, dec!(10));
}

#[tokio::test]
async fn test_concurrent_requests_cannot_overdraw() {
    let app = TestApp::pooled().await;
    let (m, wallet) = earning_publisher(&app).await;
    let withdrawals = &app.state.withdrawals;

    let (a, b) = tokio::join!(
        withdrawals.request_withdrawal(m.publisher_id, dec!(60), "paypal", None),
        withdrawals.request_withdrawal(m.publisher_id, dec!(60), "paypal", None),
    );

    let outcomes = [a, b];
    let granted: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    let refused: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(granted.len(), 1);
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].code(), "INSUFFICIENT_FUNDS");
    assert_eq!(granted[0].amount_from_wallet, dec!(30));
    assert_eq!(granted[0].amount_from_orders, dec!(30));

    let after = app.wallet(wallet.id).await;
    assert_eq!(after.balance, dec!(50));
    assert_eq!(after.escrow_balance, dec!(60));
    assert_eq!(app.ledger().credit_pool(wallet.id).await.unwrap(), dec!(50));
    let report = app.ledger().reconcile(wallet.id).await.unwrap();
    assert!(report.consistent, "{:?}", report);
}

#[tokio::test]
async fn test_concurrent_requests_split_balance_and_credits() {
    let app = TestApp::pooled().await;
    let (m, wallet) = earning_publisher(&app).await;
    let withdrawals = &app.state.withdrawals;

    let (a, b) = tokio::join!(
        withdrawals.request_withdrawal(m.publisher_id, dec!(50), "paypal", None),
        withdrawals.request_withdrawal(m.publisher_id, dec!(50), "paypal", None),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    // Free balance is drawn once, whichever request ran first
    assert_eq!(a.amount_from_wallet + b.amount_from_wallet, dec!(30));
    assert_eq!(a.amount_from_orders + b.amount_from_orders, dec!(70));

    let after = app.wallet(wallet.id).await;
    assert_eq!(after.balance, dec!(10));
    assert_eq!(after.escrow_balance, dec!(100));

    let consumed: Decimal = credits_of(&app, wallet.id)
        .await
        .iter()
        .filter(|c| c.status == TransactionStatus::Processing)
        .map(|c| c.net_amount)
        .sum();
    assert_eq!(consumed, dec!(70));
    assert_eq!(app.ledger().credit_pool(wallet.id).await.unwrap(), dec!(10));
    let report = app.ledger().reconcile(wallet.id).await.unwrap();
    assert!(report.consistent, "{:?}", report);
}

#[tokio::test]
async fn test_concurrent_approvals_pay_once() {
    let app = TestApp::pooled().await;
    let (m, wallet) = earning_publisher(&app).await;
    let withdrawals = &app.state.withdrawals;
    let request = withdrawals
        .request_withdrawal(m.publisher_id, dec!(100), "bank_transfer", bank())
        .await
        .unwrap();

    let (a, b) = tokio::join!(withdrawals.approve(request.id), withdrawals.approve(request.id));

    let outcomes = [a, b];
    let paid: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    let refused: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].status, WithdrawalStatus::Paid);
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].code(), "CONFLICT");

    assert_eq!(app.gateway.payout_count(), 1);
    let after = app.wallet(wallet.id).await;
    assert_eq!(after.balance, dec!(10));
    assert_eq!(after.escrow_balance, Decimal::ZERO);
    let report = app.ledger().reconcile(wallet.id).await.unwrap();
    assert!(report.consistent, "{:?}", report);
}

#[tokio::test]
async fn test_list_for_publisher() {
    let app = TestApp::new().await;
    let (m, _) = earning_publisher(&app).await;
    let withdrawals = &app.state.withdrawals;

    withdrawals
        .request_withdrawal(m.publisher_id, dec!(20), "paypal", None)
        .await
        .unwrap();
    withdrawals
        .request_withdrawal(m.publisher_id, dec!(30), "paypal", None)
        .await
        .unwrap();

    let listed = withdrawals.list_for_publisher(m.publisher_id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(withdrawals.list_for_publisher(m.advertiser_id).await.unwrap().is_empty());
}
