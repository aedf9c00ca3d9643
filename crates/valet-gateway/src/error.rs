use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Boundary error: a stable kind tag plus a human-readable message.
/// Domain errors are translated here and nowhere else.
#[derive(Debug)]
pub struct ApiError {
    pub kind: String,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Stable kind → HTTP status mapping.
    pub fn status(&self) -> StatusCode {
        match self.kind.as_str() {
            "invalid_input" | "validation_failed" | "unsupported_command" => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            "invalid_credentials" | "expired_credentials" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "rate_limited" | "workflow_busy" => StatusCode::TOO_MANY_REQUESTS,
            "tool_unknown" | "tool_stopped" | "tool_unavailable" | "classifier_unavailable" => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            "tool_timeout" | "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": { "kind": self.kind, "message": self.message }
        }));
        (self.status(), body).into_response()
    }
}

impl From<valet_auth::AuthError> for ApiError {
    fn from(e: valet_auth::AuthError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<valet_broker::BrokerError> for ApiError {
    fn from(e: valet_broker::BrokerError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<valet_workflow::WorkflowError> for ApiError {
    fn from(e: valet_workflow::WorkflowError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<valet_core::error::ValetError> for ApiError {
    fn from(e: valet_core::error::ValetError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_the_documented_statuses() {
        let cases = [
            ("invalid_input", StatusCode::UNPROCESSABLE_ENTITY),
            ("invalid_credentials", StatusCode::UNAUTHORIZED),
            ("expired_credentials", StatusCode::UNAUTHORIZED),
            ("forbidden", StatusCode::FORBIDDEN),
            ("not_found", StatusCode::NOT_FOUND),
            ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
            ("tool_stopped", StatusCode::SERVICE_UNAVAILABLE),
            ("tool_unknown", StatusCode::SERVICE_UNAVAILABLE),
            ("tool_timeout", StatusCode::GATEWAY_TIMEOUT),
            ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, status) in cases {
            assert_eq!(ApiError::new(kind, "x").status(), status, "{kind}");
        }
    }
}
