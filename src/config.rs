//! Environment-driven configuration.
//!
//! All knobs come from environment variables so the proxy can run unchanged
//! in a container. A missing variable falls back to its default; a present
//! but unparseable one is a startup error.

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log verbosity, handed to the tracing env filter (`LOG_LEVEL`).
    pub log_level: String,
    /// `user:password` credentials for the access gate (`HTTP_USERS`,
    /// comma-separated). Empty disables the gate.
    pub http_users: Vec<String>,
    /// Hard TTL ceiling in seconds (`MAX_CACHE_SECONDS`). 0 means unbounded;
    /// entries are then only subject to revalidation.
    pub max_cache_seconds: u64,
    /// Directory holding the persisted cache file (`CACHE_LOCATION`).
    pub cache_location: PathBuf,
    /// Persisted cache file name (`CACHE_NAME`).
    pub cache_name: String,
    /// Connection string selecting the distributed backend (`REDIS_URL`).
    pub redis_url: Option<String>,
    /// Listen address (`BIND_ADDR`).
    pub bind_addr: SocketAddr,
    /// Origin connect timeout (`CONNECT_TIMEOUT_SECONDS`). Unset leaves the
    /// HTTP client's own defaults in place.
    pub connect_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let http_users = match lookup("HTTP_USERS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_owned)
                .collect(),
            None => Vec::new(),
        };

        let max_cache_seconds = match lookup("MAX_CACHE_SECONDS") {
            Some(raw) => parse("MAX_CACHE_SECONDS", raw)?,
            None => defaults.max_cache_seconds,
        };

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => parse("BIND_ADDR", raw)?,
            None => defaults.bind_addr,
        };

        let connect_timeout = lookup("CONNECT_TIMEOUT_SECONDS")
            .map(|raw| parse::<u64>("CONNECT_TIMEOUT_SECONDS", raw))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            http_users,
            max_cache_seconds,
            cache_location: lookup("CACHE_LOCATION")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_location),
            cache_name: lookup("CACHE_NAME").unwrap_or(defaults.cache_name),
            redis_url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
            bind_addr,
            connect_timeout,
        })
    }

    /// Full path of the persisted cache file.
    pub fn cache_file(&self) -> PathBuf {
        self.cache_location.join(&self.cache_name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            http_users: Vec::new(),
            max_cache_seconds: 0,
            cache_location: PathBuf::from("."),
            cache_name: "proxy.cache".to_owned(),
            redis_url: None,
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            connect_timeout: None,
        }
    }
}

fn parse<T>(name: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err: T::Err| ConfigError::InvalidValue {
        name,
        value: raw,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).expect("valid config");
        assert_eq!(config.log_level, "info");
        assert!(config.http_users.is_empty());
        assert_eq!(config.max_cache_seconds, 0);
        assert_eq!(config.cache_name, "proxy.cache");
        assert!(config.redis_url.is_none());
        assert!(config.connect_timeout.is_none());
    }

    #[test]
    fn parses_users_and_ttl() {
        let config = config_from(&[
            ("HTTP_USERS", "alice:secret, bob:hunter2"),
            ("MAX_CACHE_SECONDS", "3600"),
            ("REDIS_URL", "redis://127.0.0.1:6379/"),
        ])
        .expect("valid config");

        assert_eq!(config.http_users, vec!["alice:secret", "bob:hunter2"]);
        assert_eq!(config.max_cache_seconds, 3600);
        assert_eq!(
            config.redis_url.as_deref(),
            Some("redis://127.0.0.1:6379/")
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = config_from(&[("MAX_CACHE_SECONDS", "forever")]).unwrap_err();
        assert!(err.to_string().contains("MAX_CACHE_SECONDS"));
    }

    #[test]
    fn cache_file_joins_location_and_name() {
        let config = config_from(&[("CACHE_LOCATION", "/var/cache"), ("CACHE_NAME", "web.cache")])
            .expect("valid config");
        assert_eq!(config.cache_file(), PathBuf::from("/var/cache/web.cache"));
    }
}
