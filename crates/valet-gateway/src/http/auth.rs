use axum::http::HeaderMap;
use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;
use crate::auth::AuthClaims;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub api_key: String,
}

/// POST /auth/token — exchange an API key for a bearer token. The
/// optional X-Client header is a lifetime policy hint, not identity.
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TokenRequest>,
) -> Result<Json<Value>, ApiError> {
    let client_hint = headers.get("x-client").and_then(|v| v.to_str().ok());
    let issued = state.auth.issue(&body.api_key, client_hint)?;
    info!("access token issued");
    Ok(Json(json!({
        "access_token": issued.access_token,
        "token_type": issued.token_type,
        "expires_in": issued.expires_in,
    })))
}

/// GET /auth/verify — echo the verified claims plus expiry headroom.
pub async fn verify_token(
    State(_state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
) -> Json<Value> {
    Json(json!({
        "sub": claims.sub,
        "iat": claims.iat,
        "exp": claims.exp,
        "type": claims.token_type,
        "time_remaining_seconds": claims.time_remaining_secs(),
        "is_expiring_soon": claims.is_expiring_soon(),
    }))
}

/// POST /auth/refresh — reissue under the same subject.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    AuthClaims(claims): AuthClaims,
) -> Json<Value> {
    let issued = state.auth.refresh(&claims);
    Json(json!({
        "access_token": issued.access_token,
        "token_type": issued.token_type,
        "expires_in": issued.expires_in,
    }))
}
