//! HTTP request handlers for the REST API.

pub mod execution;
pub mod trigger;
pub mod version;
pub mod webhook;

use axum::body::Bytes;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::http::error::AppError;

/// Parse a UUID path segment.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    raw.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("invalid {what} id: '{raw}'")))
}

/// Parse a JSON body that may be omitted entirely.
pub(crate) fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("invalid JSON body: {e}")))
}
