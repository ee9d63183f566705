use crate::application::batch::DEFAULT_GROUP_SYNC_CHUNK_SIZE;
use crate::application::payouts::DEFAULT_CLAIM_TTL;
use crate::error::{PaymentError, Result};
use crate::webhooks::dispatcher::WEBHOOK_QUEUE;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read from `PAYFLOW_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub group_sync_chunk_size: usize,
    pub webhook_queue: String,
    pub webhook_timeout: Duration,
    pub webhook_tries: u32,
    pub webhook_backoff: Duration,
    pub pending_order_ttl: chrono::Duration,
    pub inactive_user_ttl: chrono::Duration,
    pub payout_claim_ttl: chrono::Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            group_sync_chunk_size: DEFAULT_GROUP_SYNC_CHUNK_SIZE,
            webhook_queue: WEBHOOK_QUEUE.to_string(),
            webhook_timeout: Duration::from_secs(3),
            webhook_tries: 3,
            webhook_backoff: Duration::from_millis(1000),
            pending_order_ttl: chrono::Duration::hours(24),
            inactive_user_ttl: chrono::Duration::days(365),
            payout_claim_ttl: DEFAULT_CLAIM_TTL,
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PaymentError::ConfigError(format!("{key} has an invalid value: {raw:?}"))),
    }
}

fn span(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
    build: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration> {
    build(parse(lookup, key, default)?)
        .ok_or_else(|| PaymentError::ConfigError(format!("{key} is out of range")))
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            group_sync_chunk_size: parse(
                &lookup,
                "PAYFLOW_GROUP_SYNC_CHUNK_SIZE",
                defaults.group_sync_chunk_size,
            )?,
            webhook_queue: lookup("PAYFLOW_WEBHOOK_QUEUE").unwrap_or(defaults.webhook_queue),
            webhook_timeout: Duration::from_secs(parse(
                &lookup,
                "PAYFLOW_WEBHOOK_TIMEOUT_SECS",
                defaults.webhook_timeout.as_secs(),
            )?),
            webhook_tries: parse(&lookup, "PAYFLOW_WEBHOOK_TRIES", defaults.webhook_tries)?,
            webhook_backoff: Duration::from_millis(parse(
                &lookup,
                "PAYFLOW_WEBHOOK_BACKOFF_MS",
                1000u64,
            )?),
            pending_order_ttl: span(
                &lookup,
                "PAYFLOW_PENDING_ORDER_TTL_HOURS",
                defaults.pending_order_ttl.num_hours(),
                chrono::Duration::try_hours,
            )?,
            inactive_user_ttl: span(
                &lookup,
                "PAYFLOW_INACTIVE_USER_TTL_DAYS",
                defaults.inactive_user_ttl.num_days(),
                chrono::Duration::try_days,
            )?,
            payout_claim_ttl: span(
                &lookup,
                "PAYFLOW_PAYOUT_CLAIM_TTL_SECS",
                defaults.payout_claim_ttl.num_seconds(),
                chrono::Duration::try_seconds,
            )?,
        };

        if settings.group_sync_chunk_size == 0 {
            return Err(PaymentError::ConfigError(
                "PAYFLOW_GROUP_SYNC_CHUNK_SIZE must be at least 1".to_string(),
            ));
        }
        if settings.webhook_tries == 0 {
            return Err(PaymentError::ConfigError(
                "PAYFLOW_WEBHOOK_TRIES must be at least 1".to_string(),
            ));
        }
        if settings.payout_claim_ttl <= chrono::Duration::zero() {
            return Err(PaymentError::ConfigError(
                "PAYFLOW_PAYOUT_CLAIM_TTL_SECS must be positive".to_string(),
            ));
        }
        Ok(settings)
    }
}
