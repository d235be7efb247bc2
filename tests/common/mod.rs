#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait, Set,
};
use sea_orm_migration::MigratorTrait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use backlink_escrow::config::AppConfig;
use backlink_escrow::entities::{
    listings, prelude::Wallets, sea_orm_active_enums::WalletType, users, wallets,
};
use backlink_escrow::error::EscrowError;
use backlink_escrow::services::content_store::{ContentPayload, ContentStore, DbContentStore};
use backlink_escrow::services::ledger::LedgerStore;
use backlink_escrow::services::listing_directory::DbListingDirectory;
use backlink_escrow::services::notifications::{EventKind, Notification, Notifier};
use backlink_escrow::services::payout_gateway::{
    PayoutDestination, PayoutGateway, PayoutReceipt, PayoutStatus,
};
use backlink_escrow::{AppState, Collaborators};

pub const ADMIN_KEY: &str = "test-admin-key";

/// Fresh migrated in-memory SQLite database.
///
/// A single pooled connection keeps the in-memory database alive for the
/// whole test; code inside a transaction must only use that transaction.
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// Fresh migrated SQLite database in a temp file behind a pool of
/// `connections`, so concurrent transactions run on separate connections
/// and contend for the database lock.
pub async fn setup_pooled_test_db(
    connections: u32,
) -> Result<(DatabaseConnection, PathBuf), DbErr> {
    let path = std::env::temp_dir().join(format!("backlink-escrow-{}.db", Uuid::new_v4()));
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(connections)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok((db, path))
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        admin_api_key: Some(ADMIN_KEY.to_string()),
        payout_timeout: Duration::from_millis(200),
        tat_batch_delay: Duration::ZERO,
        ..AppConfig::default()
    }
}

/// Records notifications instead of sending them
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<EventKind> {
        self.sent.lock().iter().map(|n| n.event).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), EscrowError> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// What the scripted gateway does on the next payout
pub enum PayoutScript {
    Succeed(String),
    Fail(String),
    Report(PayoutStatus),
    Hang,
}

/// Payout gateway that plays back a script; payouts succeed by default
#[derive(Default)]
pub struct ScriptedGateway {
    pub script: Mutex<VecDeque<PayoutScript>>,
    pub payouts: Mutex<Vec<(Decimal, PayoutDestination)>>,
    pub verified_payments: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn push(&self, step: PayoutScript) {
        self.script.lock().push_back(step);
    }

    pub fn verify(&self, payment_id: &str) {
        self.verified_payments.lock().push(payment_id.to_string());
    }

    pub fn payout_count(&self) -> usize {
        self.payouts.lock().len()
    }
}

#[async_trait]
impl PayoutGateway for ScriptedGateway {
    async fn create_payout(
        &self,
        amount: Decimal,
        destination: &PayoutDestination,
    ) -> Result<PayoutReceipt, EscrowError> {
        self.payouts.lock().push((amount, destination.clone()));
        let step = self.script.lock().pop_front();

        match step {
            None => Ok(PayoutReceipt {
                transaction_id: format!("po_{}", Uuid::new_v4()),
                status: PayoutStatus::Success,
            }),
            Some(PayoutScript::Succeed(id)) => Ok(PayoutReceipt {
                transaction_id: id,
                status: PayoutStatus::Success,
            }),
            Some(PayoutScript::Fail(msg)) => Err(EscrowError::ExternalGateway(msg)),
            Some(PayoutScript::Report(status)) => Ok(PayoutReceipt {
                transaction_id: format!("po_{}", Uuid::new_v4()),
                status,
            }),
            Some(PayoutScript::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(EscrowError::ExternalGateway("unreachable".to_string()))
            }
        }
    }

    async fn verify_payment(&self, payment_id: &str) -> Result<bool, EscrowError> {
        Ok(self.verified_payments.lock().iter().any(|p| p == payment_id))
    }
}

/// Content store that is always down
pub struct FailingContentStore;

#[async_trait]
impl ContentStore for FailingContentStore {
    async fn save(&self, _order_id: i32, _payload: &ContentPayload) -> Result<(), EscrowError> {
        Err(EscrowError::Database("content store unavailable".to_string()))
    }

    async fn load(&self, _order_id: i32) -> Result<Option<ContentPayload>, EscrowError> {
        Err(EscrowError::Database("content store unavailable".to_string()))
    }
}

pub struct TestApp {
    pub db: DatabaseConnection,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub gateway: Arc<ScriptedGateway>,
    db_file: Option<PathBuf>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(path) = &self.db_file {
            for suffix in ["", "-journal", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
            }
        }
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let db = setup_test_db().await.expect("Failed to set up test DB");
        let content: Arc<dyn ContentStore> = Arc::new(DbContentStore::new(db.clone()));
        Self::with_content(db, content)
    }

    pub async fn with_failing_content() -> Self {
        let db = setup_test_db().await.expect("Failed to set up test DB");
        Self::with_content(db, Arc::new(FailingContentStore))
    }

    /// App over a multi-connection database for racing operations
    pub async fn pooled() -> Self {
        let (db, path) = setup_pooled_test_db(4)
            .await
            .expect("Failed to set up pooled test DB");
        let content: Arc<dyn ContentStore> = Arc::new(DbContentStore::new(db.clone()));
        let mut app = Self::with_content(db, content);
        app.db_file = Some(path);
        app
    }

    fn with_content(db: DatabaseConnection, content: Arc<dyn ContentStore>) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let gateway = Arc::new(ScriptedGateway::default());

        let collaborators = Collaborators {
            gateway: gateway.clone(),
            notifier: notifier.clone(),
            directory: Arc::new(DbListingDirectory::new(db.clone())),
            content,
        };
        let state = AppState::new(db.clone(), &test_config(), collaborators);

        Self {
            db,
            state,
            notifier,
            gateway,
            db_file: None,
        }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.state.ledger
    }

    /// Wallet with `amount` deposited through the ledger
    pub async fn funded_wallet(
        &self,
        owner_id: i32,
        wallet_type: WalletType,
        amount: Decimal,
    ) -> wallets::Model {
        let wallet = self
            .ledger()
            .ensure_wallet(owner_id, wallet_type)
            .await
            .expect("wallet");
        if amount > Decimal::ZERO {
            self.ledger()
                .deposit_settled(wallet.id, amount, &format!("dep_{}", Uuid::new_v4()))
                .await
                .expect("deposit");
        }
        self.wallet(wallet.id).await
    }

    pub async fn wallet(&self, wallet_id: i32) -> wallets::Model {
        Wallets::find_by_id(wallet_id)
            .one(&self.db)
            .await
            .expect("query wallet")
            .expect("wallet exists")
    }

    /// Σ balance + Σ escrow over every wallet
    pub async fn total_funds(&self) -> Decimal {
        Wallets::find()
            .all(&self.db)
            .await
            .expect("query wallets")
            .iter()
            .map(|w| w.balance + w.escrow_balance)
            .sum()
    }

    /// Let spawned notification tasks run
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub async fn seed_user(db: &DatabaseConnection, email: &str) -> i32 {
    users::ActiveModel {
        email: Set(email.to_string()),
        name: Set(None),
        created_at: Set(Utc::now().fixed_offset()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert user")
    .id
}

pub async fn seed_listing(db: &DatabaseConnection, url: &str, publisher_email: &str) -> listings::Model {
    let now = Utc::now().fixed_offset();
    listings::ActiveModel {
        url: Set(url.to_string()),
        publisher_email: Set(publisher_email.to_string()),
        tat: Set(None),
        placement_speed: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert listing")
}

/// An advertiser, a publisher who owns one listing, and a funded advertiser wallet
pub struct Marketplace {
    pub advertiser_id: i32,
    pub publisher_id: i32,
    pub listing: listings::Model,
    pub advertiser_wallet: wallets::Model,
}

pub async fn seed_marketplace(app: &TestApp, advertiser_funds: Decimal) -> Marketplace {
    let advertiser_id = seed_user(&app.db, "buyer@example.com").await;
    let publisher_id = seed_user(&app.db, "owner@example.com").await;
    let listing = seed_listing(&app.db, "https://www.techblog.example.com", "Owner@Example.com").await;
    let advertiser_wallet = app
        .funded_wallet(advertiser_id, WalletType::Advertiser, advertiser_funds)
        .await;

    Marketplace {
        advertiser_id,
        publisher_id,
        listing,
        advertiser_wallet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_test_db() {
        let db = setup_test_db().await;
        assert!(db.is_ok(), "Test database should migrate: {:?}", db.err());
    }

    #[tokio::test]
    async fn test_setup_pooled_test_db() {
        let (db, path) = setup_pooled_test_db(2).await.expect("pooled test database should migrate");
        drop(db);
        let _ = std::fs::remove_file(path);
    }
}
