use anyhow::Result;
use bytes::Bytes;
use hyper::{Request, StatusCode};
use shared::types::RegistrationData;
use tracing::{info, warn};

use crate::AppState;
use crate::auth::validation::{is_valid_email, is_valid_username};
use crate::database::{NewUser, StoreError, User};
use crate::error::ApiError;
use crate::handlers::http::routes::HttpResponse;
use crate::handlers::http::utils::deliver_empty;

/// `POST /account/register` with a JSON body. 200 with no body on success.
pub async fn handle_register(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    info!("Processing registration request");

    let data: RegistrationData = match serde_json::from_slice(req.body()) {
        Ok(data) => data,
        Err(e) => {
            warn!("Registration body rejected: {}", e);
            return Ok(ApiError::InvalidArgument("Invalid request".to_string()).to_response());
        }
    };

    match register(&data, &state).await {
        Ok(user) => {
            info!("User registered successfully: {} (ID: {})", user.name, user.id);
            Ok(deliver_empty(StatusCode::OK))
        }
        Err(e) => Ok(e.to_response()),
    }
}

fn validate(data: &RegistrationData, email_required: bool) -> Result<(), ApiError> {
    if !is_valid_username(&data.username) {
        return Err(ApiError::InvalidArgument("Invalid username".to_string()));
    }
    let email_ok = match data.email.as_deref() {
        Some(email) => is_valid_email(email),
        None => !email_required,
    };
    if !email_ok {
        return Err(ApiError::InvalidArgument("Invalid email".to_string()));
    }
    Ok(())
}

async fn register(data: &RegistrationData, state: &AppState) -> Result<User, ApiError> {
    validate(data, state.limits.email_required)?;

    // No other registration may pass the name check until this insert lands.
    let _guard = state.registration.lock().await;

    match state.store.get_by_name(&data.username).await {
        Ok(_) => {
            return Err(ApiError::Conflict("Username already exists".to_string()));
        }
        Err(StoreError::NotFound) => {}
        Err(e) => return Err(ApiError::Internal(format!("name check failed: {}", e))),
    }

    let digest = state
        .hasher
        .hash(&data.password)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    state
        .store
        .insert(NewUser::new(data.username.clone(), digest))
        .await
        .map_err(|e| ApiError::Internal(format!("insert failed: {}", e)))
}
