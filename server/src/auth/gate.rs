use std::sync::Arc;

use hyper::header::{AUTHORIZATION, HeaderMap};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode};
use shared::types::TokenClaims;
use tracing::{debug, warn};

use super::token::{SigningKey, TokenError};

/// Revocation hook, checked by jti after the signature and expiry pass.
/// No implementation is installed by default.
pub trait TokenDenylist: Send + Sync {
    fn is_revoked(&self, jti: &str) -> bool;
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub username: String,
    pub claims: TokenClaims,
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: SigningKey,
    issuer: String,
    denylist: Option<Arc<dyn TokenDenylist>>,
}

impl TokenVerifier {
    pub fn new(key: SigningKey, issuer: impl Into<String>) -> Self {
        Self {
            key,
            issuer: issuer.into(),
            denylist: None,
        }
    }

    pub fn with_denylist(mut self, denylist: Arc<dyn TokenDenylist>) -> Self {
        self.denylist = Some(denylist);
        self
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation
    }

    /// Signature, algorithm, issuer and expiry; then the denylist if any.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.key.decoding(), &self.validation())
            .map_err(|e| {
                if matches!(e.kind(), ErrorKind::ExpiredSignature) {
                    TokenError::Expired
                } else {
                    TokenError::Invalid(e)
                }
            })?;
        let claims = data.claims;

        if let Some(denylist) = &self.denylist {
            if denylist.is_revoked(&claims.jti) {
                return Err(TokenError::Revoked(claims.jti));
            }
        }
        Ok(claims)
    }

    /// Reads `Authorization: Bearer <token>` and verifies it.
    pub fn authenticate(&self, headers: &HeaderMap) -> Option<AuthContext> {
        let token = bearer_token(headers)?;
        match self.verify(token) {
            Ok(claims) => {
                debug!("Authenticated {} with token {}", claims.username, claims.jti);
                Some(AuthContext {
                    username: claims.username.clone(),
                    claims,
                })
            }
            Err(e) => {
                warn!("Bearer token rejected: {}", e);
                None
            }
        }
    }
}

/// Extract bearer token from Authorization header
/// Format: "Authorization: Bearer <token>"
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Some(token.trim()),
        _ => {
            warn!("Invalid or missing Bearer token");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use hyper::header::HeaderValue;

    use super::*;
    use crate::auth::token::{TokenIssuer, now_unix};
    use crate::database::User;

    fn setup() -> (TokenIssuer, TokenVerifier, SigningKey) {
        let key = SigningKey::new("0123456789abcdef0123456789abcdef").unwrap();
        let issuer = TokenIssuer::new(key.clone(), Duration::from_secs(600), "jwt-host");
        let verifier = TokenVerifier::new(key.clone(), "jwt-host");
        (issuer, verifier, key)
    }

    fn user() -> User {
        User {
            id: "5".into(),
            name: "alice-99".into(),
            password_hash: "h".into(),
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn fresh_token_accepted() {
        let (issuer, verifier, _) = setup();
        let issued = issuer.issue(&user()).unwrap();
        let ctx = verifier
            .authenticate(&headers(&format!("Bearer {}", issued.access_token)))
            .unwrap();
        assert_eq!(ctx.username, "alice-99");
        assert_eq!(ctx.claims.sub, "5");
    }

    #[test]
    fn expired_token_rejected() {
        let (issuer, verifier, _) = setup();
        let now = now_unix();
        let mut claims = issuer.issue(&user()).unwrap().claims;
        claims.iat = now - 601;
        claims.exp = now - 1;
        let token = issuer.sign(&claims).unwrap();
        assert!(matches!(verifier.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn wrong_issuer_rejected() {
        let (issuer, verifier, _) = setup();
        let mut claims = issuer.issue(&user()).unwrap().claims;
        claims.iss = "someone-else".into();
        let token = issuer.sign(&claims).unwrap();
        assert!(matches!(verifier.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn rotation_invalidates_outstanding_tokens() {
        let (issuer, verifier, key) = setup();
        let before = issuer.issue(&user()).unwrap().access_token;
        key.rotate("fedcba9876543210fedcba9876543210").unwrap();
        assert!(verifier.verify(&before).is_err());
        let after = issuer.issue(&user()).unwrap().access_token;
        assert!(verifier.verify(&after).is_ok());
    }

    struct Revoked(HashSet<String>);

    impl TokenDenylist for Revoked {
        fn is_revoked(&self, jti: &str) -> bool {
            self.0.contains(jti)
        }
    }

    #[test]
    fn denylist_consulted_when_installed() {
        let (issuer, verifier, _) = setup();
        let issued = issuer.issue(&user()).unwrap();
        let other = issuer.issue(&user()).unwrap();
        let verifier = verifier.with_denylist(Arc::new(Revoked(HashSet::from([issued
            .claims
            .jti
            .clone()]))));
        assert!(matches!(
            verifier.verify(&issued.access_token),
            Err(TokenError::Revoked(_))
        ));
        assert!(verifier.verify(&other.access_token).is_ok());
    }

    #[test]
    fn header_shapes() {
        assert!(bearer_token(&HeaderMap::new()).is_none());
        assert!(bearer_token(&headers("Basic abc")).is_none());
        assert!(bearer_token(&headers("Bearer ")).is_none());
        assert!(bearer_token(&headers("bearer abc")).is_none());
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
    }

    #[test]
    fn garbage_token_rejected() {
        let (_, verifier, _) = setup();
        assert!(verifier.authenticate(&headers("Bearer not.a.jwt")).is_none());
    }
}
