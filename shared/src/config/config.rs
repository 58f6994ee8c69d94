use std::fs;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError, StorageBackend};

/// Minimum accepted length of the token signing secret.
pub const MIN_SECRET_LEN: usize = 32;

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    let config = parse_config(&contents)?;

    info!("Configuration loaded successfully");
    Ok(config)
}

/// Parse and validate a TOML document.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(contents)?;

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.bind.is_empty() {
        return Err(ConfigError::InvalidConfig("bind cannot be empty".into()));
    }

    if config.auth.token_lifetime_minutes == 0 {
        return Err(ConfigError::InvalidConfig(
            "token_lifetime_minutes must be greater than 0".into(),
        ));
    }

    if config.api.max_users_returned == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_users_returned must be greater than 0".into(),
        ));
    }

    if config.storage.backend != StorageBackend::Memory
        && config.storage.path.as_deref().unwrap_or("").is_empty()
    {
        return Err(ConfigError::InvalidConfig(format!(
            "storage.path is required for the '{}' backend",
            config.storage.backend
        )));
    }

    if config.storage.max_connections == 0 {
        return Err(ConfigError::InvalidConfig(
            "max_connections must be greater than 0".into(),
        ));
    }

    let hashing = &config.auth.hashing;
    if hashing.iterations == 0 || hashing.parallelism == 0 {
        return Err(ConfigError::InvalidConfig(
            "hashing iterations and parallelism must be greater than 0".into(),
        ));
    }
    if hashing.memory_kib < 8 * hashing.parallelism {
        return Err(ConfigError::InvalidConfig(
            "hashing memory_kib must be at least 8 * parallelism".into(),
        ));
    }

    // Rejected here so a bad secret fails at startup, not at the first sign-in.
    match config.auth.resolved_jwt_secret() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "jwt_secret must be set via the JWT_SECRET env var or auth.jwt_secret config field"
                    .into(),
            ));
        }
        Some(secret) if secret.len() < MIN_SECRET_LEN => {
            return Err(ConfigError::InvalidConfig(format!(
                "jwt_secret must be at least {} characters long",
                MIN_SECRET_LEN
            )));
        }
        _ => {}
    }

    Ok(())
}
