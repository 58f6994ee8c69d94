use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use shared::types::TokenClaims;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::User;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),

    #[error("token rejected: {0}")]
    Invalid(jsonwebtoken::errors::Error),

    #[error("token expired")]
    Expired,

    #[error("token {0} has been revoked")]
    Revoked(String),

    #[error("signing key unavailable")]
    KeyUnavailable,
}

/// The HS256 secret shared by issuer and verifier.
///
/// Only one secret is active. After `rotate`, tokens signed with the old
/// secret fail verification even if they have not expired.
#[derive(Clone)]
pub struct SigningKey {
    secret: Arc<RwLock<Vec<u8>>>,
}

impl SigningKey {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::KeyUnavailable);
        }
        Ok(Self {
            secret: Arc::new(RwLock::new(secret)),
        })
    }

    pub fn rotate(&self, secret: impl Into<Vec<u8>>) -> Result<(), TokenError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(TokenError::KeyUnavailable);
        }
        let mut current = self
            .secret
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = secret;
        info!("Signing key rotated; previously issued tokens are no longer valid");
        Ok(())
    }

    pub(crate) fn encoding(&self) -> EncodingKey {
        let secret = self
            .secret
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        EncodingKey::from_secret(&secret)
    }

    pub(crate) fn decoding(&self) -> DecodingKey {
        let secret = self
            .secret
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        DecodingKey::from_secret(&secret)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

pub fn now_unix() -> i64 {
    i64::try_from(jsonwebtoken::get_current_timestamp()).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub claims: TokenClaims,
}

/// Mints signed bearer tokens for verified users.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: SigningKey,
    lifetime: Duration,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(key: SigningKey, lifetime: Duration, issuer: impl Into<String>) -> Self {
        Self {
            key,
            lifetime,
            issuer: issuer.into(),
        }
    }

    pub fn issue(&self, user: &User) -> Result<IssuedToken, TokenError> {
        self.issue_at(user, now_unix())
    }

    /// Claims are `iat = now`, `exp = now + lifetime`, with a fresh v4 `jti`.
    pub fn issue_at(&self, user: &User, now: i64) -> Result<IssuedToken, TokenError> {
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = TokenClaims {
            sub: user.id.clone(),
            username: user.name.clone(),
            iat: now,
            exp: now.saturating_add(lifetime),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            scope: None,
        };
        let access_token = self.sign(&claims)?;
        debug!("Issued token {} for {}", claims.jti, claims.username);
        Ok(IssuedToken {
            access_token,
            claims,
        })
    }

    /// Signs arbitrary claims with the current key.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.key.encoding())
            .map_err(TokenError::Signing)
    }
}
