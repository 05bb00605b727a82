//! # Error Handling
//!
//! Unified error handling for the dialer HTTP API, implementing a consistent
//! problem+json response format with trace ID propagation.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::telemetry;
use crate::token_issuer::TokenError;
use crate::twilio::ProviderError;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Trace ID of the current request (falls back to a generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Upstream provider error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpstreamError {
    /// Provider identifier
    pub provider: String,
    /// HTTP status code from upstream
    pub status: u16,
    /// Response body snippet from upstream (truncated)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::MissingPhoneNumber => validation_error(
                "Phone number is required",
                json!({ "phoneNumber": "required" }),
            ),
            TokenError::Signing(err) => {
                tracing::error!(error = %err, "Error generating token");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Failed to generate access token",
                )
            }
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Api { status, body } => provider_error("twilio", status, Some(body)),
            other => {
                tracing::error!(error = %other, "Provider request failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    &other.to_string(),
                )
            }
        }
    }
}

/// Create a provider upstream error. All upstream HTTP errors map to 502 `PROVIDER_ERROR`.
pub fn provider_error(provider: &str, status: u16, body: Option<String>) -> ApiError {
    let upstream = UpstreamError {
        provider: provider.to_string(),
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > 200 {
                let truncated: String = b.chars().take(200).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    ApiError::new(
        StatusCode::BAD_GATEWAY,
        "PROVIDER_ERROR",
        &format!("Provider {} returned error status {}", provider, status),
    )
    .with_details(json!(upstream))
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
    }

    #[test]
    fn test_missing_phone_number_is_validation_error() {
        let error: ApiError = TokenError::MissingPhoneNumber.into();

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Phone number is required"));
        assert_eq!(
            error.details,
            Some(Box::new(json!({ "phoneNumber": "required" })))
        );
    }

    #[test]
    fn test_provider_api_error_maps_to_bad_gateway() {
        let error: ApiError = ProviderError::Api {
            status: 404,
            body: "x".repeat(300),
        }
        .into();

        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(error.code, Box::from("PROVIDER_ERROR"));

        let details = error.details.unwrap();
        assert_eq!(details["provider"], "twilio");
        assert_eq!(details["status"], 404);
        assert_eq!(details["body_snippet"].as_str().unwrap().len(), 203);
    }

    #[test]
    fn test_malformed_provider_response_is_internal_error() {
        let error: ApiError = ProviderError::Malformed("bad json".to_string()).into();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.message.contains("bad json"));
    }

    #[test]
    fn test_content_type_header() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Test error");

        let response = error.into_response();

        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        assert!(error.trace_id.is_some());
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }
}
