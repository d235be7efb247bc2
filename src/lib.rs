// src/lib.rs

use axum::{
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use config::AppConfig;
use services::{
    content_store::{ContentStore, DbContentStore},
    deposits::DepositService,
    ledger::LedgerStore,
    listing_directory::{DbListingDirectory, ListingDirectory},
    notifications::{LogNotifier, Notifier, WebhookNotifier},
    orders::{OrderPolicy, OrderService},
    payout_gateway::{HttpPayoutGateway, PayoutGateway, UnconfiguredGateway},
    tat_estimator::TatEstimator,
    withdrawals::WithdrawalService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub admin_api_key: Option<String>,
    pub ledger: LedgerStore,
    pub orders: OrderService,
    pub withdrawals: WithdrawalService,
    pub deposits: DepositService,
    pub tat: TatEstimator,
}

/// External systems the core talks to
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn PayoutGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub directory: Arc<dyn ListingDirectory>,
    pub content: Arc<dyn ContentStore>,
}

impl Collaborators {
    /// Production wiring from config
    pub fn from_config(db: &DatabaseConnection, config: &AppConfig) -> Self {
        let gateway: Arc<dyn PayoutGateway> = match &config.payout_gateway_url {
            Some(url) => Arc::new(HttpPayoutGateway::new(
                url.clone(),
                config.payout_gateway_api_key.clone(),
                config.payout_timeout,
            )),
            None => {
                tracing::warn!("PAYOUT_GATEWAY_URL not set, payouts and deposit checks will fail");
                Arc::new(UnconfiguredGateway)
            }
        };

        let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => Arc::new(LogNotifier),
        };

        Self {
            gateway,
            notifier,
            directory: Arc::new(DbListingDirectory::new(db.clone())),
            content: Arc::new(DbContentStore::new(db.clone())),
        }
    }
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: &AppConfig, collaborators: Collaborators) -> Self {
        let ledger = LedgerStore::new(db.clone());
        let tat = TatEstimator::new(db.clone(), collaborators.directory.clone());

        let orders = OrderService::new(
            db.clone(),
            collaborators.directory.clone(),
            collaborators.content.clone(),
            collaborators.notifier.clone(),
            tat.clone(),
            OrderPolicy {
                default_fee_rate: config.platform_fee_rate,
                duplicate_window: config.duplicate_window,
                revision_window_days: config.revision_window_days,
            },
        );

        let withdrawals = WithdrawalService::new(
            db.clone(),
            collaborators.gateway.clone(),
            collaborators.notifier.clone(),
            config.payout_timeout,
        );

        let deposits = DepositService::new(ledger.clone(), collaborators.gateway.clone());

        Self {
            db,
            admin_api_key: config.admin_api_key.clone(),
            ledger,
            orders,
            withdrawals,
            deposits,
            tat,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/orders", post(handlers::order::create_order))
        .route("/api/orders/{id}", get(handlers::order::get_order))
        .route("/api/orders/{id}/accept", post(handlers::order::accept_order))
        .route("/api/orders/{id}/deliver", post(handlers::order::deliver_order))
        .route("/api/orders/{id}/dispute", post(handlers::order::dispute_order))
        .route("/api/orders/{id}/complete", post(handlers::order::complete_order))
        .route("/api/orders/{id}/revision/request", post(handlers::order::request_revision))
        .route("/api/orders/{id}/revision/start", post(handlers::order::start_revision))
        .route("/api/orders/{id}/revision/complete", post(handlers::order::complete_revision))
        .route("/api/orders/{id}/repair-publisher", post(handlers::order::repair_publisher))
        .route("/api/wallets/me", get(handlers::wallet::get_my_wallet))
        .route("/api/wallets/{id}/reconcile", get(handlers::wallet::reconcile_wallet))
        .route("/api/deposits/confirm", post(handlers::deposit::confirm_deposit))
        .route(
            "/api/withdrawals",
            post(handlers::withdrawal::create_withdrawal).get(handlers::withdrawal::list_my_withdrawals),
        )
        .route("/api/withdrawals/{id}/approve", post(handlers::withdrawal::approve_withdrawal))
        .route("/api/withdrawals/{id}/deny", post(handlers::withdrawal::deny_withdrawal))
        .route("/api/listings/{id}/tat", post(handlers::listing::recompute_listing_tat))
        .with_state(state)
}

pub mod config;
pub mod error;

pub mod entities {
    pub mod prelude;
    pub mod sea_orm_active_enums;
    pub mod listings;
    pub mod order_audit_log;
    pub mod order_contents;
    pub mod orders;
    pub mod transactions;
    pub mod users;
    pub mod wallets;
    pub mod withdrawal_requests;
}

pub mod services {
    pub mod content_store;
    pub mod deposits;
    pub mod duplicate_guard;
    pub mod ledger;
    pub mod listing_directory;
    pub mod notifications;
    pub mod order_state;
    pub mod orders;
    pub mod payout_gateway;
    pub mod tat_estimator;
    pub mod withdrawals;
}

pub mod models {
    pub mod common;
    pub mod order;
    pub mod wallet;
    pub mod withdrawal;
}

pub mod handlers {
    pub mod common;
    pub mod deposit;
    pub mod listing;
    pub mod order;
    pub mod wallet;
    pub mod withdrawal;
}

pub mod jobs;
