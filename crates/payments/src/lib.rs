// Payments crate clippy configuration
// These are intentional patterns in this crate:
#![allow(clippy::field_reassign_with_default)] // Used for conditional Stripe param setting
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Paygate Payments Module
//!
//! Handles Stripe integration for one-off payments: hosted checkout,
//! status reconciliation, and webhook processing.
//!
//! ## Features
//!
//! - **Payment Creation**: Hosted checkout sessions with validated amounts
//! - **Status Reconciliation**: Re-fetch-and-overwrite sync against
//!   authoritative provider state, idempotent under at-least-once delivery
//! - **Webhooks**: Signature-verified event dispatch with an append-only
//!   audit log
//! - **Invariants**: Runnable consistency checks over the payment store

pub mod amount;
pub mod checkout;
pub mod client;
pub mod error;
pub mod invariants;
pub mod reconcile;
pub mod records;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Amount
pub use amount::{is_fixed_two_decimal, normalize_amount, Currency};

// Checkout
pub use checkout::{CheckoutService, CreatePaymentInput};

// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{PaymentError, PaymentResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Reconcile
pub use reconcile::{ReconcileKey, ReconcileService};

// Records
pub use records::{ListFilter, PaymentRecord, PaymentStore};

// Webhooks
pub use webhooks::{WebhookEventRecord, WebhookHandler, WebhookOutcome};

use sqlx::PgPool;

/// Main payments service that combines all payment functionality
pub struct PaymentsService {
    pub checkout: CheckoutService,
    pub reconcile: ReconcileService,
    pub store: PaymentStore,
    pub webhooks: WebhookHandler,
    pub invariants: InvariantChecker,
}

impl PaymentsService {
    /// Create a new payments service from environment variables
    pub fn from_env(pool: PgPool) -> PaymentResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::with_client(stripe, pool))
    }

    /// Create a new payments service with explicit config.
    ///
    /// This is the construction path tests use to inject a known
    /// configuration instead of reading the process environment.
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::with_client(StripeClient::new(config), pool)
    }

    fn with_client(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            checkout: CheckoutService::new(stripe.clone(), pool.clone()),
            reconcile: ReconcileService::new(stripe.clone(), pool.clone()),
            store: PaymentStore::new(pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool.clone()),
            invariants: InvariantChecker::new(pool),
        }
    }
}
