//! Runtime configuration read from the environment (and `.env` via dotenvy)

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_ADMIN_API_KEY: &str = "ADMIN_API_KEY";
pub const ENV_PLATFORM_FEE_RATE: &str = "PLATFORM_FEE_RATE";
pub const ENV_DUPLICATE_WINDOW_SECS: &str = "DUPLICATE_WINDOW_SECS";
pub const ENV_REVISION_WINDOW_DAYS: &str = "REVISION_WINDOW_WORKING_DAYS";
pub const ENV_PAYOUT_GATEWAY_URL: &str = "PAYOUT_GATEWAY_URL";
pub const ENV_PAYOUT_GATEWAY_API_KEY: &str = "PAYOUT_GATEWAY_API_KEY";
pub const ENV_PAYOUT_TIMEOUT_SECS: &str = "PAYOUT_TIMEOUT_SECS";
pub const ENV_NOTIFY_WEBHOOK_URL: &str = "NOTIFY_WEBHOOK_URL";
pub const ENV_TAT_SYNC_INTERVAL_SECS: &str = "TAT_SYNC_INTERVAL_SECS";
pub const ENV_TAT_BATCH_SIZE: &str = "TAT_BATCH_SIZE";
pub const ENV_TAT_BATCH_DELAY_MS: &str = "TAT_BATCH_DELAY_MS";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_PLATFORM_FEE_RATE: Decimal = dec!(0.10);
pub const DEFAULT_DUPLICATE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_REVISION_WINDOW_DAYS: u32 = 5;
pub const DEFAULT_PAYOUT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TAT_SYNC_INTERVAL_SECS: u64 = 86400; // 24 hours
pub const DEFAULT_TAT_BATCH_SIZE: usize = 10;
pub const DEFAULT_TAT_BATCH_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    /// Admin routes are rejected when unset
    pub admin_api_key: Option<String>,
    pub platform_fee_rate: Decimal,
    pub duplicate_window: Duration,
    pub revision_window_days: u32,
    pub payout_gateway_url: Option<String>,
    pub payout_gateway_api_key: Option<String>,
    pub payout_timeout: Duration,
    pub notify_webhook_url: Option<String>,
    pub tat_sync_interval: Duration,
    pub tat_batch_size: usize,
    pub tat_batch_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            admin_api_key: None,
            platform_fee_rate: DEFAULT_PLATFORM_FEE_RATE,
            duplicate_window: Duration::from_secs(DEFAULT_DUPLICATE_WINDOW_SECS),
            revision_window_days: DEFAULT_REVISION_WINDOW_DAYS,
            payout_gateway_url: None,
            payout_gateway_api_key: None,
            payout_timeout: Duration::from_secs(DEFAULT_PAYOUT_TIMEOUT_SECS),
            notify_webhook_url: None,
            tat_sync_interval: Duration::from_secs(DEFAULT_TAT_SYNC_INTERVAL_SECS),
            tat_batch_size: DEFAULT_TAT_BATCH_SIZE,
            tat_batch_delay: Duration::from_millis(DEFAULT_TAT_BATCH_DELAY_MS),
        }
    }
}

impl AppConfig {
    /// Build the config from process environment variables
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_url = lookup(ENV_DATABASE_URL)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("{} must be set", ENV_DATABASE_URL))?;

        let platform_fee_rate = match lookup(ENV_PLATFORM_FEE_RATE) {
            Some(raw) => {
                let rate = Decimal::from_str(raw.trim())
                    .map_err(|e| format!("invalid {}: {}", ENV_PLATFORM_FEE_RATE, e))?;
                if rate < Decimal::ZERO || rate >= Decimal::ONE {
                    return Err(format!("{} must be in [0, 1)", ENV_PLATFORM_FEE_RATE));
                }
                rate
            }
            None => defaults.platform_fee_rate,
        };

        Ok(Self {
            database_url,
            bind_addr: lookup(ENV_BIND_ADDR).unwrap_or(defaults.bind_addr),
            admin_api_key: lookup(ENV_ADMIN_API_KEY).filter(|v| !v.is_empty()),
            platform_fee_rate,
            duplicate_window: Duration::from_secs(parse_var(
                &lookup,
                ENV_DUPLICATE_WINDOW_SECS,
                DEFAULT_DUPLICATE_WINDOW_SECS,
            )?),
            revision_window_days: parse_var(&lookup, ENV_REVISION_WINDOW_DAYS, DEFAULT_REVISION_WINDOW_DAYS)?,
            payout_gateway_url: lookup(ENV_PAYOUT_GATEWAY_URL).filter(|v| !v.is_empty()),
            payout_gateway_api_key: lookup(ENV_PAYOUT_GATEWAY_API_KEY).filter(|v| !v.is_empty()),
            payout_timeout: Duration::from_secs(parse_var(
                &lookup,
                ENV_PAYOUT_TIMEOUT_SECS,
                DEFAULT_PAYOUT_TIMEOUT_SECS,
            )?),
            notify_webhook_url: lookup(ENV_NOTIFY_WEBHOOK_URL).filter(|v| !v.is_empty()),
            tat_sync_interval: Duration::from_secs(parse_var(
                &lookup,
                ENV_TAT_SYNC_INTERVAL_SECS,
                DEFAULT_TAT_SYNC_INTERVAL_SECS,
            )?),
            tat_batch_size: parse_var(&lookup, ENV_TAT_BATCH_SIZE, DEFAULT_TAT_BATCH_SIZE)?.max(1),
            tat_batch_delay: Duration::from_millis(parse_var(
                &lookup,
                ENV_TAT_BATCH_DELAY_MS,
                DEFAULT_TAT_BATCH_DELAY_MS,
            )?),
        })
    }
}

/// Parse an optional variable; a set but unparsable or out-of-range value is an error
fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, String>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid {}: {}", key, e)),
        None => Ok(default),
    }
}
