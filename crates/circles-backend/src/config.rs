use std::path::PathBuf;

use anyhow::{Context, Result};

pub const DEFAULT_DB_PATH: &str = "circles.db";
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub feed_capacity: usize,
}

impl BackendConfig {
    /// Read from the process environment, loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = lookup("CIRCLES_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into());
        let jwt_secret = lookup("CIRCLES_JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.into());
        let feed_capacity = match lookup("CIRCLES_FEED_CAPACITY") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("CIRCLES_FEED_CAPACITY must be a number, got '{}'", raw))?,
            None => DEFAULT_FEED_CAPACITY,
        };

        Ok(Self {
            db_path: PathBuf::from(db_path),
            jwt_secret,
            feed_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let config = BackendConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("circles.db"));
        assert_eq!(config.jwt_secret, "dev-secret-change-me");
        assert_eq!(config.feed_capacity, 1024);
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let env: HashMap<&str, &str> = [
            ("CIRCLES_DB_PATH", "/var/lib/circles/data.db"),
            ("CIRCLES_FEED_CAPACITY", "64"),
        ]
        .into();
        let config = BackendConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/circles/data.db"));
        assert_eq!(config.feed_capacity, 64);

        let bad = BackendConfig::from_lookup(|k| {
            (k == "CIRCLES_FEED_CAPACITY").then(|| "lots".to_string())
        });
        assert!(bad.is_err());
    }
}
