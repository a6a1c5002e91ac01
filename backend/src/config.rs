use std::{env, fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

use tracing::info;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub busy_timeout: Duration,
    pub txn: TxnPolicy,
    pub event_capacity: usize,
    /// Seconds between notification sweeps; `None` disables the sweeper.
    pub sweep_interval_secs: Option<u64>,
    pub webhook_url: Option<String>,
}

/// How ledger transactions are bounded and retried.
#[derive(Clone, Copy, Debug)]
pub struct TxnPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for TxnPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://registrar.db".to_string());
        let sweep_secs: u64 = try_load("NOTIFY_SWEEP_SECS", "0")?;

        Ok(Self {
            database_url,
            bind_addr: try_load("BIND_ADDR", "127.0.0.1:3000")?,
            max_connections: try_load("DB_MAX_CONNECTIONS", "5")?,
            busy_timeout: Duration::from_millis(try_load("DB_BUSY_TIMEOUT_MS", "5000")?),
            txn: TxnPolicy {
                timeout: Duration::from_millis(try_load("TXN_TIMEOUT_MS", "5000")?),
                max_retries: try_load("TXN_MAX_RETRIES", "3")?,
            },
            event_capacity: try_load("EVENT_CAPACITY", "256")?,
            sweep_interval_secs: (sweep_secs > 0).then_some(sweep_secs),
            webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|url| !url.is_empty()),
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, AppError>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| AppError::Config(format!("invalid {key} value {raw:?}: {e}")))
}
