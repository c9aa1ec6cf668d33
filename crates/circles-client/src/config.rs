use std::path::PathBuf;

use anyhow::{Context, Result, bail};

pub const DEFAULT_IDENTITY_PATH: &str = "circles-identity.json";
pub const DEFAULT_THREAD_TTL_DAYS: i64 = 30;
/// Longest lifetime a thread may be given.
pub const MAX_THREAD_TTL_DAYS: i64 = 36_500;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub identity_path: PathBuf,
    pub thread_ttl_days: i64,
}

impl ClientConfig {
    /// Read from the process environment, loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let identity_path =
            lookup("CIRCLES_IDENTITY_PATH").unwrap_or_else(|| DEFAULT_IDENTITY_PATH.into());
        let thread_ttl_days = match lookup("CIRCLES_THREAD_TTL_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("CIRCLES_THREAD_TTL_DAYS must be a number, got '{}'", raw))?,
            None => DEFAULT_THREAD_TTL_DAYS,
        };
        if thread_ttl_days <= 0 {
            bail!("CIRCLES_THREAD_TTL_DAYS must be positive, got {}", thread_ttl_days);
        }
        if thread_ttl_days > MAX_THREAD_TTL_DAYS {
            bail!(
                "CIRCLES_THREAD_TTL_DAYS must be at most {}, got {}",
                MAX_THREAD_TTL_DAYS,
                thread_ttl_days
            );
        }

        Ok(Self {
            identity_path: PathBuf::from(identity_path),
            thread_ttl_days,
        })
    }
}
