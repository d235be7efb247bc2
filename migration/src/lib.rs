pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_users_and_listings;
mod m20261001_000002_create_wallets_and_transactions;
mod m20261001_000003_create_orders;
mod m20261001_000004_create_withdrawal_requests;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_users_and_listings::Migration),
            Box::new(m20261001_000002_create_wallets_and_transactions::Migration),
            Box::new(m20261001_000003_create_orders::Migration),
            Box::new(m20261001_000004_create_withdrawal_requests::Migration),
        ]
    }
}
