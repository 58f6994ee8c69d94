use std::collections::HashMap;

use anyhow::Result;
use bytes::Bytes;
use hyper::{Request, StatusCode};
use shared::types::UserProfile;
use tracing::{debug, error};

use crate::ApiLimits;
use crate::AppState;
use crate::auth::AuthContext;
use crate::database::StoreError;
use crate::error::ApiError;
use crate::handlers::http::routes::{HttpResponse, PathParams};
use crate::handlers::http::utils::deliver_serialized_json;

/// `GET /api/users?offset=&limit=`
pub async fn handle_list_users(
    req: Request<Bytes>,
    state: AppState,
    auth: AuthContext,
) -> Result<HttpResponse> {
    let query = query_params(req.uri().query());
    let (offset, limit) = match page_window(&query, &state.limits) {
        Ok(window) => window,
        Err(e) => return Ok(e.to_response()),
    };

    debug!(
        "{} listing users offset={} limit={}",
        auth.username, offset, limit
    );

    let users = match state.store.get_page(offset, limit).await {
        Ok(users) => users,
        Err(e) => {
            error!("Page lookup failed: {}", e);
            return Ok(
                ApiError::InvalidArgument("Could not retrieve result".to_string()).to_response(),
            );
        }
    };

    if users.is_empty() {
        return Ok(ApiError::NotFound.to_response());
    }

    let profiles: Vec<UserProfile> = users.iter().map(|u| u.profile()).collect();
    deliver_serialized_json(&profiles, StatusCode::OK)
}

/// `GET /api/users/{id}`; the router only lets digit ids through.
pub async fn handle_get_user(
    req: Request<Bytes>,
    state: AppState,
    auth: AuthContext,
) -> Result<HttpResponse> {
    let id = req
        .extensions()
        .get::<PathParams>()
        .and_then(|p| p.get("id"))
        .unwrap_or_default()
        .to_string();

    debug!("{} looking up user {}", auth.username, id);

    match state.store.get(&id).await {
        Ok(user) => deliver_serialized_json(&user.profile(), StatusCode::OK),
        Err(StoreError::NotFound) => Ok(ApiError::NotFound.to_response()),
        Err(e) => Ok(ApiError::Internal(format!("user lookup failed: {}", e)).to_response()),
    }
}

fn query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    params
}

/// Unparseable values fall back to the defaults; negative ones are
/// rejected; the limit is capped at `max_users_returned`.
fn page_window(
    query: &HashMap<String, String>,
    limits: &ApiLimits,
) -> Result<(u64, u64), ApiError> {
    let parse = |name: &str| query.get(name).and_then(|v| v.parse::<i64>().ok());

    let offset = parse("offset").unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::InvalidArgument(
            "offset must be greater than or equal to '0'".to_string(),
        ));
    }

    let default_limit = i64::try_from(limits.default_page_size).unwrap_or(i64::MAX);
    let limit = parse("limit").unwrap_or(default_limit);
    if limit < 0 {
        return Err(ApiError::InvalidArgument(
            "limit must be greater than or equal to '0'".to_string(),
        ));
    }

    let offset = offset.unsigned_abs();
    let limit = limit.unsigned_abs().min(limits.max_users_returned);
    Ok((offset, limit))
}
