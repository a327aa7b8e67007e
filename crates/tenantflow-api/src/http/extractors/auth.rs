//! API key authentication extractor.
//!
//! Extracts and verifies API keys from:
//! - `Authorization: Bearer <key>` header
//! - `X-API-Key: <key>` header
//!
//! The key's owner email is recorded as the acting user in audit entries.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::http::error::AppError;
use crate::state::AppState;

/// An authenticated caller. Extracting this validates the API key.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub owner_email: String,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = extract_api_key(parts)?;

        match state.api_keys.authenticate(&api_key).await? {
            Some(owner_email) => Ok(Authenticated { owner_email }),
            None => Err(AppError::Unauthorized(
                "Invalid API key. Provide a valid key via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
            )),
        }
    }
}

/// Extract the API key from request headers.
fn extract_api_key(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(key) = auth_str.strip_prefix("Bearer ") {
            return Ok(key.trim().to_string());
        }
    }

    if let Some(key) = parts.headers.get("x-api-key") {
        let key_str = key.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid X-API-Key header encoding".to_string())
        })?;
        return Ok(key_str.trim().to_string());
    }

    Err(AppError::Unauthorized(
        "Missing API key. Provide via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: &str, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_extract_bearer_key() {
        let parts = parts_with("authorization", "Bearer tflow_abc ");
        assert_eq!(extract_api_key(&parts).unwrap(), "tflow_abc");
    }

    #[test]
    fn test_extract_x_api_key() {
        let parts = parts_with("x-api-key", "tflow_xyz");
        assert_eq!(extract_api_key(&parts).unwrap(), "tflow_xyz");
    }

    #[test]
    fn test_missing_key_is_unauthorized() {
        let (parts, _) = Request::builder().body(()).unwrap().into_parts();
        assert!(matches!(
            extract_api_key(&parts),
            Err(AppError::Unauthorized(_))
        ));
    }
}
