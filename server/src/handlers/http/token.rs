use std::collections::HashMap;

use anyhow::Result;
use bytes::Bytes;
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Request, StatusCode};
use shared::types::{GrantType, TokenRequest, TokenResponse};
use tracing::{info, warn};

use crate::AppState;
use crate::auth::IssuedToken;
use crate::error::ApiError;
use crate::handlers::http::routes::HttpResponse;
use crate::handlers::http::utils::{deliver_serialized_json, media_type_is, with_header};

const FORM_MEDIA_TYPE: &str = "application/x-www-form-urlencoded";

/// `POST /api/token`. Only the password grant is supported.
pub async fn handle_token(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    // A body of any other media type is not read, so every field is empty.
    let params = if media_type_is(req.headers(), CONTENT_TYPE.as_str(), FORM_MEDIA_TYPE) {
        match parse_form(req.body()) {
            Some(params) => params,
            None => {
                warn!("Token request body is not a valid form");
                return Ok(ApiError::InvalidArgument("Invalid request".to_string()).to_response());
            }
        }
    } else {
        HashMap::new()
    };

    let request = TokenRequest::from_params(&params);
    let issued = match grant(&request, &state).await {
        Ok(issued) => issued,
        Err(e) => return Ok(e.to_response()),
    };

    info!(
        "Issued token {} to {} (ID: {})",
        issued.claims.jti, issued.claims.username, issued.claims.sub
    );

    let response = deliver_serialized_json(
        &TokenResponse::bearer(issued.access_token),
        StatusCode::OK,
    )?;
    Ok(with_header(response, CACHE_CONTROL, "must-revalidate"))
}

async fn grant(request: &TokenRequest, state: &AppState) -> Result<IssuedToken, ApiError> {
    match &request.grant_type {
        GrantType::Password => {
            let user = state
                .sign_in
                .log_in(&request.username, &request.password)
                .await?;
            state
                .issuer
                .issue(&user)
                .map_err(|e| ApiError::Internal(e.to_string()))
        }
        GrantType::Unsupported(other) => Err(ApiError::UnsupportedGrantType(other.clone())),
    }
}

/// Decodes `application/x-www-form-urlencoded`. `None` when the body is not
/// UTF-8 or holds a broken `%` escape. The first value of a repeated key wins.
pub fn parse_form(body: &[u8]) -> Option<HashMap<String, String>> {
    let text = std::str::from_utf8(body).ok()?;
    if !percent_escapes_valid(text) {
        return None;
    }
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(text.as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    Some(params)
}

fn percent_escapes_valid(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
            if !valid {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}
