use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::errors::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_timeout_ms: u64,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 9042,
            keyspace: "content".to_string(),
            username: None,
            password: None,
            connection_timeout_ms: 5000,
            pool_size: 4,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// `host:port` contact points. Hosts that already carry a port are kept as is.
    /// Bare IPv6 addresses get bracketed before the default port is appended.
    pub fn contact_points(&self) -> Vec<String> {
        self.hosts
            .iter()
            .map(|host| contact_point(host, self.port))
            .collect()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.hosts.is_empty() {
            return Err(StoreError::ConfigError("at least one host is required".to_string()));
        }
        let valid_keyspace = !self.keyspace.is_empty()
            && self.keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_keyspace {
            return Err(StoreError::ConfigError(format!(
                "invalid keyspace name: '{}'",
                self.keyspace
            )));
        }
        Ok(())
    }
}

fn contact_point(host: &str, port: u16) -> String {
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    let unbracketed = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return SocketAddr::new(ip, port).to_string();
    }
    match host.rsplit_once(':') {
        Some((name, host_port)) if !name.is_empty() && host_port.parse::<u16>().is_ok() => {
            host.to_string()
        }
        _ => format!("{}:{}", host, port),
    }
}

/// Attempt count and fixed delay shared by the retry executor and the
/// statement backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub retry: u8,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retry: 3,
            delay_ms: 500,
        }
    }
}

impl RetrySettings {
    /// The delay is kept at millisecond granularity: sub-millisecond parts are
    /// dropped and delays beyond `u64::MAX` ms saturate.
    pub fn new(retry: u8, delay: Duration) -> Self {
        Self {
            retry,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_points_append_default_port() {
        let config = DatabaseConfig {
            hosts: vec!["node1".to_string(), "node2:19042".to_string()],
            ..Default::default()
        };
        assert_eq!(config.contact_points(), vec!["node1:9042", "node2:19042"]);
    }

    #[test]
    fn test_contact_points_handle_ip_literals() {
        let config = DatabaseConfig {
            hosts: vec![
                "::1".to_string(),
                "[::1]".to_string(),
                "[::1]:19042".to_string(),
                "fe80::2".to_string(),
                "10.0.0.1".to_string(),
                "10.0.0.1:19042".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            config.contact_points(),
            vec![
                "[::1]:9042",
                "[::1]:9042",
                "[::1]:19042",
                "[fe80::2]:9042",
                "10.0.0.1:9042",
                "10.0.0.1:19042",
            ]
        );
    }

    #[test]
    fn test_keyspace_validation() {
        let mut config = DatabaseConfig::default();
        assert!(config.validate().is_ok());

        config.keyspace = "tests; DROP".to_string();
        assert!(matches!(config.validate(), Err(StoreError::ConfigError(_))));

        config.keyspace = "tests".to_string();
        config.hosts.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_settings_delay() {
        let settings = RetrySettings::new(1, Duration::from_millis(150));
        assert_eq!(settings.retry, 1);
        assert_eq!(settings.delay(), Duration::from_millis(150));
    }

    #[test]
    fn test_retry_settings_keep_millisecond_granularity() {
        let settings = RetrySettings::new(0, Duration::from_micros(1_999));
        assert_eq!(settings.delay(), Duration::from_millis(1));

        let settings = RetrySettings::new(0, Duration::MAX);
        assert_eq!(settings.delay_ms, u64::MAX);
    }
}
