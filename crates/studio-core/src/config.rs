//! Gateway configuration.
//!
//! Values come from built-in defaults, an optional TOML file and finally
//! `STUDIO_*` environment variables, in that order.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Tuning knobs of the session gateway.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Hard cap on live clients; logins beyond it are refused.
    pub max_clients: usize,
    /// Live client count above which a registration triggers a recycle sweep.
    pub recycle_threshold: usize,
    /// Idle time after which a client is recycled.
    pub client_ttl_secs: u64,
    /// Period of the background recycle sweep.
    pub recycle_interval_secs: u64,
    /// Grace period before an idle session is closed.
    pub idle_session_grace_ms: u64,
    /// Pause between session acquisition attempts.
    pub acquire_backoff_ms: u64,
    pub acquire_max_retries: u32,
    /// Timeout of the reachability probe at login.
    pub ping_timeout_ms: u64,
    /// Idle timeout of the engine's physical connections.
    pub pool_idle_timeout_secs: u64,
    pub pool_max_connections: usize,
    /// Statement listing the cluster's hosts.
    pub hosts_statement: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_clients: 200,
            recycle_threshold: 30,
            client_ttl_secs: 60 * 60,
            recycle_interval_secs: 5 * 60,
            idle_session_grace_ms: 3_000,
            acquire_backoff_ms: 500,
            acquire_max_retries: 20,
            ping_timeout_ms: 3_000,
            pool_idle_timeout_secs: 8 * 60 * 60,
            pool_max_connections: 10,
            hosts_statement: "SHOW HOSTS".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from an optional TOML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading gateway configuration");
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STUDIO_*` overrides resolved through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&lookup, "STUDIO_MAX_CLIENTS", &mut self.max_clients)?;
        override_with(&lookup, "STUDIO_RECYCLE_THRESHOLD", &mut self.recycle_threshold)?;
        override_with(&lookup, "STUDIO_CLIENT_TTL_SECS", &mut self.client_ttl_secs)?;
        override_with(
            &lookup,
            "STUDIO_RECYCLE_INTERVAL_SECS",
            &mut self.recycle_interval_secs,
        )?;
        override_with(
            &lookup,
            "STUDIO_IDLE_SESSION_GRACE_MS",
            &mut self.idle_session_grace_ms,
        )?;
        override_with(&lookup, "STUDIO_ACQUIRE_BACKOFF_MS", &mut self.acquire_backoff_ms)?;
        override_with(
            &lookup,
            "STUDIO_ACQUIRE_MAX_RETRIES",
            &mut self.acquire_max_retries,
        )?;
        override_with(&lookup, "STUDIO_PING_TIMEOUT_MS", &mut self.ping_timeout_ms)?;
        override_with(
            &lookup,
            "STUDIO_POOL_IDLE_TIMEOUT_SECS",
            &mut self.pool_idle_timeout_secs,
        )?;
        override_with(
            &lookup,
            "STUDIO_POOL_MAX_CONNECTIONS",
            &mut self.pool_max_connections,
        )?;
        if let Some(statement) = lookup("STUDIO_HOSTS_STATEMENT") {
            self.hosts_statement = statement;
        }
        Ok(())
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_clients == 0 {
            return Err(CoreError::config("max_clients must be at least 1"));
        }
        if self.recycle_threshold > self.max_clients {
            return Err(CoreError::config(format!(
                "recycle_threshold ({}) exceeds max_clients ({})",
                self.recycle_threshold, self.max_clients
            )));
        }
        if self.client_ttl_secs == 0 || self.recycle_interval_secs == 0 {
            return Err(CoreError::config(
                "client_ttl_secs and recycle_interval_secs must be positive",
            ));
        }
        if self.pool_max_connections == 0 {
            return Err(CoreError::config("pool_max_connections must be at least 1"));
        }
        if self.hosts_statement.trim().is_empty() {
            return Err(CoreError::config("hosts_statement must not be empty"));
        }
        Ok(())
    }

    pub fn client_ttl(&self) -> Duration {
        Duration::from_secs(self.client_ttl_secs)
    }

    pub fn recycle_interval(&self) -> Duration {
        Duration::from_secs(self.recycle_interval_secs)
    }

    pub fn idle_session_grace(&self) -> Duration {
        Duration::from_millis(self.idle_session_grace_ms)
    }

    pub fn acquire_backoff(&self) -> Duration {
        Duration::from_millis(self.acquire_backoff_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

fn override_with<F, T>(lookup: &F, key: &str, slot: &mut T) -> CoreResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| CoreError::InvalidSetting {
                key: key.to_string(),
                value: raw.clone(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_clients, 200);
        assert_eq!(config.recycle_threshold, 30);
        assert_eq!(config.client_ttl(), Duration::from_secs(3600));
        assert_eq!(config.idle_session_grace(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config =
            GatewayConfig::from_toml_str("max_clients = 50\nclient_ttl_secs = 60\n").unwrap();
        assert_eq!(config.max_clients, 50);
        assert_eq!(config.client_ttl_secs, 60);
        assert_eq!(config.acquire_backoff_ms, 500);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STUDIO_MAX_CLIENTS", "12"),
            ("STUDIO_RECYCLE_THRESHOLD", "4"),
            ("STUDIO_HOSTS_STATEMENT", "SHOW HOSTS GRAPH"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_clients, 12);
        assert_eq!(config.recycle_threshold, 4);
        assert_eq!(config.hosts_statement, "SHOW HOSTS GRAPH");
    }

    #[test]
    fn test_invalid_override_is_reported() {
        let mut config = GatewayConfig::default();
        let err = config
            .apply_overrides(|key| (key == "STUDIO_MAX_CLIENTS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSetting { .. }));
    }

    #[test]
    fn test_threshold_above_cap_rejected() {
        let err = GatewayConfig::from_toml_str("max_clients = 10\nrecycle_threshold = 11\n");
        assert!(matches!(err, Err(CoreError::Config(_))));
    }
}
