use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use tandem_db::StoreConfig;

/// Placeholder JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub store: StoreConfig,
}

impl ServerConfig {
    /// Read `TANDEM_*` variables from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("TANDEM_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("TANDEM_JWT_SECRET is unset or still a placeholder; it must match the identity provider's signing secret");
        }

        let host = lookup("TANDEM_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("TANDEM_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("TANDEM_PORT is not a valid port")?;
        let db_path: PathBuf = lookup("TANDEM_DB_PATH")
            .unwrap_or_else(|| "tandem.db".into())
            .into();
        let log_path: PathBuf = lookup("TANDEM_LOG_PATH")
            .unwrap_or_else(|| "tandem-log.db".into())
            .into();
        let busy_timeout_ms: u64 = match lookup("TANDEM_STORE_BUSY_TIMEOUT_MS") {
            Some(v) => v
                .parse()
                .context("TANDEM_STORE_BUSY_TIMEOUT_MS is not a number")?,
            None => 5000,
        };

        if db_path == log_path {
            bail!("TANDEM_DB_PATH and TANDEM_LOG_PATH must point at different files");
        }

        Ok(Self {
            host,
            port,
            jwt_secret,
            db_path,
            log_path,
            store: StoreConfig {
                busy_timeout: Duration::from_millis(busy_timeout_ms),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = ServerConfig::from_lookup(lookup(&[("TANDEM_JWT_SECRET", "s3cr3t-for-tests")])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("tandem.db"));
        assert_eq!(config.log_path, PathBuf::from("tandem-log.db"));
        assert_eq!(config.store.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn placeholder_or_missing_secret_is_rejected() {
        assert!(ServerConfig::from_lookup(lookup(&[])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("TANDEM_JWT_SECRET", "dev-secret-change-me")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("TANDEM_JWT_SECRET", "   ")])).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("TANDEM_JWT_SECRET", "s3cr3t-for-tests"),
            ("TANDEM_PORT", "8088"),
            ("TANDEM_STORE_BUSY_TIMEOUT_MS", "250"),
            ("TANDEM_LOG_PATH", "/tmp/log.db"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8088);
        assert_eq!(config.store.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.log_path, PathBuf::from("/tmp/log.db"));

        let bad_port = ServerConfig::from_lookup(lookup(&[
            ("TANDEM_JWT_SECRET", "s3cr3t-for-tests"),
            ("TANDEM_PORT", "not-a-port"),
        ]));
        assert!(bad_port.is_err());
    }
}
