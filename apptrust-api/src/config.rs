//! Application configuration loaded from the environment

use apptrust_publisher::UpstreamConfig;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which storage backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Couchbase,
}

/// Couchbase connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct CouchbaseSettings {
    pub connection_string: String,
    pub username: String,
    pub password: String,
    pub bucket: String,
}

impl Default for CouchbaseSettings {
    fn default() -> Self {
        Self {
            connection_string: "couchbase://localhost".to_string(),
            username: "admin".to_string(),
            password: "password123".to_string(),
            bucket: "apptrust".to_string(),
        }
    }
}

/// Immutable settings built once at startup and passed to constructors
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Mount point of the REST routes, `/api` by default; empty mounts at root
    pub api_prefix: String,
    pub storage: StorageKind,
    pub couchbase: CouchbaseSettings,
    pub upstream: UpstreamConfig,
    /// Explicit OPA binary; `None` falls back to a `PATH` lookup
    pub opa_binary: Option<PathBuf>,
    pub default_author: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            api_prefix: "/api".to_string(),
            storage: StorageKind::Memory,
            couchbase: CouchbaseSettings::default(),
            upstream: UpstreamConfig::default(),
            opa_binary: None,
            default_author: "system".to_string(),
        }
    }
}

/// Normalize to `/segment[/segment...]` with no trailing slash
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port.parse().map_err(|e| invalid("PORT", &port, e))?;
        }
        if let Some(prefix) = lookup("API_PREFIX") {
            config.api_prefix = normalize_prefix(&prefix);
        }
        if let Some(storage) = lookup("STORAGE_TYPE") {
            config.storage = match storage.to_ascii_lowercase().as_str() {
                "memory" => StorageKind::Memory,
                "couchbase" => StorageKind::Couchbase,
                _ => return Err(invalid("STORAGE_TYPE", &storage, "expected memory or couchbase")),
            };
        }

        if let Some(value) = lookup("COUCHBASE_CONNECTION_STRING") {
            config.couchbase.connection_string = value;
        }
        if let Some(value) = lookup("COUCHBASE_USERNAME") {
            config.couchbase.username = value;
        }
        if let Some(value) = lookup("COUCHBASE_PASSWORD") {
            config.couchbase.password = value;
        }
        if let Some(value) = lookup("COUCHBASE_BUCKET") {
            config.couchbase.bucket = value;
        }

        if let Some(url) = lookup("UPSTREAM_BASE_URL") {
            config.upstream.base_url = url;
        }
        if let Some(token) = lookup("UPSTREAM_API_TOKEN") {
            config.upstream.api_token = token;
        }
        if let Some(secs) = lookup("UPSTREAM_TIMEOUT_SECS") {
            let parsed: u64 = secs
                .parse()
                .map_err(|e| invalid("UPSTREAM_TIMEOUT_SECS", &secs, e))?;
            if parsed == 0 {
                return Err(invalid("UPSTREAM_TIMEOUT_SECS", &secs, "must be positive"));
            }
            config.upstream.timeout = Duration::from_secs(parsed);
        }

        config.opa_binary = lookup("OPA_BINARY_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        if let Some(author) = lookup("DEFAULT_AUTHOR").filter(|a| !a.trim().is_empty()) {
            config.default_author = author;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
