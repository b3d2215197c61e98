use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crm_replica_client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crm_replica_core::sync::{SyncConfig, DEFAULT_SYNC_INTERVAL_SECS};
use crm_replica_core::{Error, Result};

const DEFAULT_DB_PATH: &str = "crm_replica.db";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8088";

/// Server settings read from `CRM_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub crm_api_url: String,
    pub crm_access_token: String,
    pub db_path: String,
    pub listen_addr: SocketAddr,
    pub http_timeout: Duration,
    /// `None` disables the periodic scheduler.
    pub sync_interval: Option<Duration>,
    pub sync: SyncConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let crm_access_token = get("CRM_ACCESS_TOKEN")
            .ok_or_else(|| Error::config("CRM_ACCESS_TOKEN is required"))?;
        let crm_api_url = get("CRM_API_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let db_path = get("CRM_REPLICA_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let listen_addr = parse_or(
            "CRM_REPLICA_LISTEN_ADDR",
            get("CRM_REPLICA_LISTEN_ADDR"),
            DEFAULT_LISTEN_ADDR.parse().map_err(|_| {
                Error::config(format!("Invalid default listen address {}", DEFAULT_LISTEN_ADDR))
            })?,
        )?;
        let http_timeout_secs = parse_or(
            "CRM_HTTP_TIMEOUT_SECS",
            get("CRM_HTTP_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?;
        let interval_secs = parse_or(
            "CRM_SYNC_INTERVAL_SECS",
            get("CRM_SYNC_INTERVAL_SECS"),
            DEFAULT_SYNC_INTERVAL_SECS,
        )?;

        let defaults = SyncConfig::default();
        let max_age_hours = parse_or(
            "CRM_SYNC_MAX_AGE_HOURS",
            get("CRM_SYNC_MAX_AGE_HOURS"),
            defaults.max_age_hours,
        )?;
        let sync = SyncConfig {
            page_size: parse_or(
                "CRM_SYNC_PAGE_SIZE",
                get("CRM_SYNC_PAGE_SIZE"),
                defaults.page_size,
            )?,
            batch_size: parse_or(
                "CRM_SYNC_BATCH_SIZE",
                get("CRM_SYNC_BATCH_SIZE"),
                defaults.batch_size,
            )?,
            association_batch_size: parse_or(
                "CRM_SYNC_ASSOCIATION_BATCH_SIZE",
                get("CRM_SYNC_ASSOCIATION_BATCH_SIZE"),
                defaults.association_batch_size,
            )?,
            max_age_hours,
            stale_after_hours: max_age_hours,
        };
        sync.validate()?;

        Ok(Self {
            crm_api_url,
            crm_access_token,
            db_path,
            listen_addr,
            http_timeout: Duration::from_secs(http_timeout_secs),
            sync_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            sync,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("{} has an invalid value '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = config_from(&[("CRM_ACCESS_TOKEN", "pat-123")]).unwrap();

        assert_eq!(config.crm_api_url, DEFAULT_BASE_URL);
        assert_eq!(config.db_path, "crm_replica.db");
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8088");
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.sync_interval, Some(Duration::from_secs(900)));
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = config_from(&[("CRM_ACCESS_TOKEN", "   ")]).unwrap_err();
        assert!(err.to_string().contains("CRM_ACCESS_TOKEN"));
    }

    #[test]
    fn overrides_are_parsed_and_blank_values_fall_back() {
        let config = config_from(&[
            ("CRM_ACCESS_TOKEN", "pat-123"),
            ("CRM_API_URL", "http://localhost:9000/"),
            ("CRM_SYNC_MAX_AGE_HOURS", "6"),
            ("CRM_SYNC_PAGE_SIZE", "50"),
            ("CRM_SYNC_BATCH_SIZE", ""),
            ("CRM_SYNC_INTERVAL_SECS", "0"),
        ])
        .unwrap();

        assert_eq!(config.crm_api_url, "http://localhost:9000");
        assert_eq!(config.sync.max_age_hours, 6);
        assert_eq!(config.sync.stale_after_hours, 6);
        assert_eq!(config.sync.page_size, 50);
        assert_eq!(config.sync.batch_size, 500);
        assert_eq!(config.sync_interval, None);
    }

    #[test]
    fn unparsable_number_is_a_config_error() {
        let err = config_from(&[
            ("CRM_ACCESS_TOKEN", "pat-123"),
            ("CRM_SYNC_PAGE_SIZE", "lots"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("CRM_SYNC_PAGE_SIZE"));
    }

    #[test]
    fn max_age_beyond_the_limit_is_a_config_error() {
        let err = config_from(&[
            ("CRM_ACCESS_TOKEN", "pat-123"),
            ("CRM_SYNC_MAX_AGE_HOURS", "10000000000"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("max age"));
    }
}
