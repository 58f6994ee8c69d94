pub mod auth;
pub mod database;
pub mod error;
pub mod handlers;
pub mod serve;
pub mod tower_middle;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use shared::types::server_config::AppConfig;
use tokio::sync::Mutex;

use crate::auth::{PasswordHasher, SignInManager, SigningKey, TokenIssuer, TokenVerifier};
use crate::database::UserStore;

/// Request-facing limits copied out of the config at startup.
#[derive(Debug, Clone)]
pub struct ApiLimits {
    pub max_users_returned: u64,
    pub default_page_size: u64,
    pub email_required: bool,
    pub max_body_bytes: usize,
}

impl ApiLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_users_returned: config.api.max_users_returned,
            default_page_size: config.api.default_page_size,
            email_required: config.auth.email_required,
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

/// Everything a handler needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub hasher: PasswordHasher,
    pub sign_in: Arc<SignInManager>,
    pub issuer: Arc<TokenIssuer>,
    pub verifier: Arc<TokenVerifier>,
    pub signing_key: SigningKey,
    pub limits: ApiLimits,
    /// Held across the name check and the insert during registration.
    pub registration: Arc<Mutex<()>>,
}

impl AppState {
    /// Wires the auth services around an already opened store.
    pub fn from_config(config: &AppConfig, store: Arc<dyn UserStore>) -> Result<Self> {
        let hasher = PasswordHasher::from_config(&config.auth.hashing)
            .context("Invalid password hashing parameters")?;

        let secret = config
            .auth
            .resolved_jwt_secret()
            .ok_or_else(|| anyhow!("No JWT secret configured (set JWT_SECRET or auth.jwt_secret)"))?;
        let signing_key = SigningKey::new(secret).context("Invalid JWT secret")?;

        let issuer = TokenIssuer::new(
            signing_key.clone(),
            Duration::from_secs(config.auth.token_lifetime_secs()),
            config.auth.issuer.clone(),
        );
        let verifier = TokenVerifier::new(signing_key.clone(), config.auth.issuer.clone());
        let sign_in = SignInManager::new(store.clone(), hasher.clone());

        Ok(Self {
            store,
            hasher,
            sign_in: Arc::new(sign_in),
            issuer: Arc::new(issuer),
            verifier: Arc::new(verifier),
            signing_key,
            limits: ApiLimits::from_config(config),
            registration: Arc::new(Mutex::new(())),
        })
    }
}
