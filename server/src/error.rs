use hyper::StatusCode;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::SignInError;
use crate::handlers::http::routes::HttpResponse;
use crate::handlers::http::utils::deliver_text;

/// Failures as the client sees them. Bodies are short plain text.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Authentication failed")]
    Unauthenticated,

    #[error("Unsupported grant type '{0}'")]
    UnsupportedGrantType(String),

    /// Detail is logged, never sent.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn to_status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            // duplicate usernames are reported as a bad request
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::UnsupportedGrantType(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_response(&self) -> HttpResponse {
        match self {
            Self::Internal(detail) => error!("Request failed: {}", detail),
            other => warn!("Request rejected ({}): {}", other.to_status().as_u16(), other),
        }
        deliver_text(self.to_status(), self.to_message())
    }
}

impl From<SignInError> for ApiError {
    fn from(err: SignInError) -> Self {
        match err {
            SignInError::InvalidCredentials => Self::InvalidCredentials,
            other => Self::Internal(other.to_string()),
        }
    }
}
