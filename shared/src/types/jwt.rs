use serde::{Deserialize, Serialize};

/// Claims embedded in every bearer token issued by `/api/token`.
///
/// The struct is flat on purpose: every registered claim the server relies
/// on is a named field, and the only optional field (`scope`) is omitted
/// from the JSON when absent.
///
/// Verification needs nothing but the signing secret: the claims carry the
/// identity (`sub`, `username`) and validity window (`iat`, `exp`) of the
/// token. `jti` is a per-token random id that a revocation list could key on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Standard JWT subject, set to the user id.
    pub sub: String,

    /// Copy of the user name so handlers need no store lookup.
    pub username: String,

    /// Issued-at (Unix timestamp, seconds).
    pub iat: i64,

    /// Expiry (Unix timestamp, seconds).
    pub exp: i64,

    /// Random token id (UUID v4).
    pub jti: String,

    /// Issuer, fixed per deployment.
    pub iss: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}
