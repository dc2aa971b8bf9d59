//! Error types for the payments crate

use thiserror::Error;

/// Errors produced by payment operations
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Malformed input, caught before any provider call
    #[error("validation error: {0}")]
    Validation(String),

    /// Lookup or update matched no payment record
    #[error("payment not found")]
    PaymentNotFound,

    /// A required environment value is absent; the operation fails closed
    #[error("missing configuration: {0}")]
    ConfigMissing(&'static str),

    /// The payment provider call failed or returned an unexpected shape.
    /// The underlying cause is logged server-side and never shown to clients.
    #[error("payment provider error: {0}")]
    Provider(String),

    /// Webhook request arrived without a signature header
    #[error("webhook signature missing")]
    WebhookSignatureMissing,

    /// Webhook signature did not verify against the raw request body
    #[error("webhook signature invalid")]
    WebhookSignatureInvalid,

    /// Webhook event carried an object that does not match its event type
    #[error("unexpected webhook payload: {0}")]
    WebhookEventNotSupported(String),

    /// Reconciliation was invoked without any identifier
    #[error("no identifier supplied for reconciliation")]
    MissingReconcileKey,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<stripe::StripeError> for PaymentError {
    fn from(err: stripe::StripeError) -> Self {
        PaymentError::Provider(err.to_string())
    }
}

impl From<stripe::ParseIdError> for PaymentError {
    fn from(err: stripe::ParseIdError) -> Self {
        PaymentError::Provider(format!("invalid provider identifier: {err}"))
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;
