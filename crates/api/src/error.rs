//! API error envelope
//!
//! Every endpoint answers with the same envelope: `{"success": true, "data":
//! ...}` on success, `{"success": false, "code": ..., "error": ..., "details":
//! ...}` on failure. Internal causes (provider exceptions, database errors,
//! missing configuration) are logged server-side and never surfaced to the
//! client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use paygate_payments::PaymentError;

/// Error codes exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    Forbidden,
    PaymentNotFound,
    InternalError,
    ExternalServiceError,
    MissingSignature,
    InvalidSignature,
}

impl ErrorCode {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::MissingSignature
            | ErrorCode::InvalidSignature => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::PaymentNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ExternalServiceError => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Typed API error, rendered as the uniform error envelope
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn payment_not_found() -> Self {
        Self::new(ErrorCode::PaymentNotFound, "payment not found")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> serde_json::Value {
        let mut body = json!({
            "success": false,
            "code": self.code,
            "error": self.message,
        });
        if let Some(details) = &self.details {
            body["details"] = details.clone();
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status_code(), Json(self.envelope())).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Validation(message) => Self::validation(message),
            PaymentError::PaymentNotFound => Self::payment_not_found(),
            PaymentError::ConfigMissing(variable) => {
                tracing::error!(variable = variable, "Missing required configuration");
                Self::internal("server configuration error")
            }
            PaymentError::Provider(cause) => {
                // Cause stays in server logs; clients only learn that the
                // provider call failed.
                tracing::error!(error = %cause, "Payment provider request failed");
                Self::new(
                    ErrorCode::ExternalServiceError,
                    "payment provider request failed",
                )
            }
            PaymentError::WebhookSignatureMissing => Self::new(
                ErrorCode::MissingSignature,
                "missing webhook signature header",
            ),
            PaymentError::WebhookSignatureInvalid => Self::new(
                ErrorCode::InvalidSignature,
                "webhook signature verification failed",
            ),
            PaymentError::WebhookEventNotSupported(message) => Self::validation(message),
            PaymentError::MissingReconcileKey => {
                Self::internal("reconciliation requires an identifier")
            }
            PaymentError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                Self::internal("internal server error")
            }
            PaymentError::Internal(message) => {
                tracing::error!(error = %message, "Internal error");
                Self::internal("internal server error")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        Self::internal("internal server error")
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Uniform success envelope
#[derive(Debug, Serialize)]
pub struct SuccessEnvelope<T: Serialize> {
    pub success: bool,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<SuccessEnvelope<T>> {
    Json(SuccessEnvelope {
        success: true,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let err = ApiError::validation("amount must be a fixed two-decimal string");
        let body = err.envelope();

        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"], "amount must be a fixed two-decimal string");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_error_envelope_with_details() {
        let err = ApiError::validation("bad field").with_details(serde_json::json!({
            "field": "amount",
        }));
        let body = err.envelope();
        assert_eq!(body["details"]["field"], "amount");
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            ErrorCode::ValidationError.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCode::PaymentNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::ExternalServiceError.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ErrorCode::MissingSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::InvalidSignature.status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_payment_error_mapping() {
        let err: ApiError = PaymentError::PaymentNotFound.into();
        assert_eq!(err.code, ErrorCode::PaymentNotFound);

        let err: ApiError = PaymentError::WebhookSignatureMissing.into();
        assert_eq!(err.code, ErrorCode::MissingSignature);

        let err: ApiError = PaymentError::WebhookSignatureInvalid.into();
        assert_eq!(err.code, ErrorCode::InvalidSignature);

        // Provider causes never leak to the client
        let err: ApiError = PaymentError::Provider("secret internal detail".to_string()).into();
        assert_eq!(err.code, ErrorCode::ExternalServiceError);
        assert!(!err.message.contains("secret internal detail"));

        let err: ApiError = PaymentError::ConfigMissing("STRIPE_SECRET_KEY").into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("STRIPE_SECRET_KEY"));
    }

    #[test]
    fn test_success_envelope_shape() {
        let body = serde_json::to_value(SuccessEnvelope {
            success: true,
            data: serde_json::json!({"payment": {"id": "x"}}),
        })
        .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["payment"]["id"], "x");
    }
}
