use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Which `UserStore` implementation the composition root wires in.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Kv,
    #[default]
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// sqlite: connection string (`sqlite://api.db`); kv: database file path.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HashingConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default = "default_hash_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_minutes: u64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default)]
    pub email_required: bool,
    /// HMAC key used to sign and verify tokens.
    ///
    /// Prefer loading this via the `JWT_SECRET` environment variable. This
    /// field is the fallback for deployments that cannot inject env vars.
    ///
    /// **Minimum length:** 32 characters.
    /// Only one secret is active: rotating it invalidates every token that
    /// was signed with the previous one.
    pub jwt_secret: Option<String>,
    #[serde(default)]
    pub hashing: HashingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_max_users_returned")]
    pub max_users_returned: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:5001"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AuthConfig {
    pub fn token_lifetime_secs(&self) -> u64 {
        self.token_lifetime_minutes * 60
    }

    /// Resolve the signing secret with `JWT_SECRET` env-var taking priority
    /// over the config file field.
    ///
    /// Returns `None` when neither source is set (startup treats this as a
    /// hard error).
    pub fn resolved_jwt_secret(&self) -> Option<String> {
        std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.jwt_secret.clone())
            .filter(|s| !s.is_empty())
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Kv => write!(f, "kv"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "kv" => Ok(Self::Kv),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!(
                "unknown storage backend '{}' (expected memory, kv or sqlite)",
                other
            )),
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
            timeout_secs: default_hash_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_users_returned: default_max_users_returned(),
            default_page_size: default_page_size(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_port() -> u16 {
    5001
}

pub fn default_request_timeout() -> u64 {
    30
}

pub fn default_max_body_bytes() -> usize {
    64 * 1024
}

pub fn default_operation_timeout() -> u64 {
    20
}

pub fn default_max_connections() -> u32 {
    4
}

pub fn default_token_lifetime() -> u64 {
    10
}

pub fn default_issuer() -> String {
    "jwt-host".to_string()
}

// argon2id defaults (OWASP minimums)
pub fn default_memory_kib() -> u32 {
    19 * 1024
}

pub fn default_iterations() -> u32 {
    2
}

pub fn default_parallelism() -> u32 {
    1
}

pub fn default_hash_timeout() -> u64 {
    10
}

pub fn default_max_users_returned() -> u64 {
    100
}

pub fn default_page_size() -> u64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("KV".parse::<StorageBackend>().unwrap(), StorageBackend::Kv);
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert!("postgres".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn backend_defaults_to_sqlite() {
        assert_eq!(StorageBackend::default(), StorageBackend::Sqlite);
    }

    #[test]
    fn server_addr_joins_bind_and_port() {
        let s = ServerConfig {
            bind: "127.0.0.1".into(),
            port: 5001,
            request_timeout_secs: 30,
            max_body_bytes: 1024,
        };
        assert_eq!(s.addr(), "127.0.0.1:5001");
    }
}
