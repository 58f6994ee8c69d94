use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use std::convert::Infallible;
use tracing::{debug, error};

use crate::handlers::http::utils::deliver::full;

/// Serialize any `Serialize` type and deliver it as a JSON response with an
/// explicit `Content-Length`. This is the helper all handlers use instead of
/// building one-off JSON responses.
pub fn deliver_serialized_json<T: Serialize>(
    data: &T,
    status: StatusCode,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let json = serde_json::to_vec(data).context("Failed to serialize response")?;
    deliver_json(json, status)
}

/// Delivers a JSON response from raw pre-serialized bytes.
/// Prefer `deliver_serialized_json` when you have a typed value.
pub fn deliver_json<T: Into<Bytes>>(
    json: T,
    status: StatusCode,
) -> Result<Response<BoxBody<Bytes, Infallible>>> {
    let bytes: Bytes = json.into();

    debug!("Delivering JSON response, size: {} bytes", bytes.len());

    let response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(full(bytes))
        .map_err(|e: http::Error| {
            error!("Failed to build JSON response: {}", e);
            anyhow!("Failed to build JSON response: {}", e)
        })?;

    Ok(response)
}
