use std::env;
use std::sync::Arc;

use sea_orm::Database;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backlink_escrow::config::AppConfig;
use backlink_escrow::services::listing_directory::DbListingDirectory;
use backlink_escrow::services::tat_estimator::{TatEstimator, TatOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,backlink_escrow=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Optional single listing id
    let listing_id: Option<i32> = match env::args().nth(1) {
        Some(raw) => match raw.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                eprintln!("Usage: cargo run --bin recompute_tat [listing_id]");
                std::process::exit(1);
            }
        },
        None => None,
    };

    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    let estimator = TatEstimator::new(db.clone(), Arc::new(DbListingDirectory::new(db)));

    match listing_id {
        Some(id) => {
            let result = estimator.recompute(id, TatOptions::default()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        None => {
            let report = estimator
                .recompute_all(TatOptions::default(), config.tat_batch_size, config.tat_batch_delay)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.failures.is_empty() {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
