use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Grant types
// ---------------------------------------------------------------------------

/// Credential-exchange mode named by the `grant_type` form field.
///
/// Only the resource-owner password grant is supported; anything else is
/// kept verbatim so the rejection can name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantType {
    Password,
    Unsupported(String),
}

impl GrantType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "password" => Self::Password,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password => write!(f, "password"),
            Self::Unsupported(raw) => write!(f, "{}", raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Decoded `application/x-www-form-urlencoded` body of `POST /api/token`.
///
/// Missing fields decode as empty strings, the same way a form lookup of an
/// absent key yields "".
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub grant_type: GrantType,
    pub username: String,
    pub password: String,
}

impl TokenRequest {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let field = |name: &str| params.get(name).cloned().unwrap_or_default();
        Self {
            grant_type: GrantType::parse(&field("grant_type")),
            username: field("username"),
            password: field("password"),
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Body of a successful token grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            token_type: "Bearer".to_string(),
            access_token,
        }
    }
}
