use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use valet_auth::Claims;

use crate::app::AppState;
use crate::error::ApiError;

/// Extractor enforcing the bearer gate on protected handlers.
pub struct AuthClaims(pub Claims);

impl FromRequestParts<Arc<AppState>> for AuthClaims {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ApiError::new("invalid_credentials", "missing Authorization header")
            })?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::new("invalid_credentials", "expected a bearer token"))?;

        let claims = state.auth.verify(token)?;
        Ok(AuthClaims(claims))
    }
}
