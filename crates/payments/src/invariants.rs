//! Payment Invariants Module
//!
//! Provides runnable consistency checks for the payment system. These can be
//! run after any reconciliation or webhook replay to ensure the store is in
//! a valid state.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real SQL query that can be run
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::PaymentResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Payment(s) affected
    pub payment_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - stored money state is wrong
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

/// Row type for succeeded-without-paid-at violations
#[derive(Debug, sqlx::FromRow)]
struct MissingTimestampRow {
    payment_id: Uuid,
    status: String,
    updated_at: OffsetDateTime,
}

/// Row type for malformed amount violations
#[derive(Debug, sqlx::FromRow)]
struct MalformedAmountRow {
    payment_id: Uuid,
    amount: String,
}

/// Row type for audit drift violations
#[derive(Debug, sqlx::FromRow)]
struct AuditDriftRow {
    payment_id: Uuid,
    payment_status: String,
    event_status: String,
    event_type: String,
}

/// Service for running payment invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> PaymentResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_succeeded_has_paid_at().await?);
        violations.extend(self.check_canceled_has_failed_at().await?);
        violations.extend(self.check_amount_format().await?);
        violations.extend(self.check_audit_status_agrees().await?);

        let checks_run = 4;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: Succeeded payments carry a paid_at timestamp
    ///
    /// Reconciliation stamps paid_at whenever it observes a succeeded
    /// intent, so a succeeded row without one means a write was lost.
    async fn check_succeeded_has_paid_at(&self) -> PaymentResult<Vec<InvariantViolation>> {
        let rows: Vec<MissingTimestampRow> = sqlx::query_as(
            r#"
            SELECT id as payment_id, status, updated_at
            FROM payments
            WHERE status = 'succeeded'
              AND paid_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "succeeded_has_paid_at".to_string(),
                payment_ids: vec![row.payment_id],
                description: "Succeeded payment has no paid_at timestamp".to_string(),
                context: serde_json::json!({
                    "status": row.status,
                    "updated_at": row.updated_at.to_string(),
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Canceled payments carry a failed_at timestamp
    async fn check_canceled_has_failed_at(&self) -> PaymentResult<Vec<InvariantViolation>> {
        let rows: Vec<MissingTimestampRow> = sqlx::query_as(
            r#"
            SELECT id as payment_id, status, updated_at
            FROM payments
            WHERE status = 'canceled'
              AND failed_at IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "canceled_has_failed_at".to_string(),
                payment_ids: vec![row.payment_id],
                description: "Canceled payment has no failed_at timestamp".to_string(),
                context: serde_json::json!({
                    "status": row.status,
                    "updated_at": row.updated_at.to_string(),
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: Stored amounts keep the fixed two-decimal format
    ///
    /// Amounts are validated at the API boundary and never rewritten, so a
    /// malformed value means something bypassed validation.
    async fn check_amount_format(&self) -> PaymentResult<Vec<InvariantViolation>> {
        let rows: Vec<MalformedAmountRow> = sqlx::query_as(
            r#"
            SELECT id as payment_id, amount
            FROM payments
            WHERE amount !~ '^\d+\.\d{2}$'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "amount_format_valid".to_string(),
                payment_ids: vec![row.payment_id],
                description: format!("Payment amount {:?} is not a fixed two-decimal string", row.amount),
                context: serde_json::json!({
                    "amount": row.amount,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: The latest audit record agrees with the payment status
    ///
    /// A later sweep reconciliation can legitimately move the payment past
    /// its last webhook, so disagreement is informational, not an error.
    async fn check_audit_status_agrees(&self) -> PaymentResult<Vec<InvariantViolation>> {
        let rows: Vec<AuditDriftRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (e.payment_id)
                e.payment_id,
                p.status as payment_status,
                e.status as event_status,
                e.event_type
            FROM payment_webhook_events e
            JOIN payments p ON p.id = e.payment_id
            ORDER BY e.payment_id, e.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.payment_status != row.event_status)
            .map(|row| InvariantViolation {
                invariant: "audit_status_agrees".to_string(),
                payment_ids: vec![row.payment_id],
                description: format!(
                    "Payment status '{}' differs from its latest audit record '{}'",
                    row.payment_status, row.event_status
                ),
                context: serde_json::json!({
                    "payment_status": row.payment_status,
                    "event_status": row.event_status,
                    "event_type": row.event_type,
                }),
                severity: ViolationSeverity::Low,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> PaymentResult<Vec<InvariantViolation>> {
        match name {
            "succeeded_has_paid_at" => self.check_succeeded_has_paid_at().await,
            "canceled_has_failed_at" => self.check_canceled_has_failed_at().await,
            "amount_format_valid" => self.check_amount_format().await,
            "audit_status_agrees" => self.check_audit_status_agrees().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "succeeded_has_paid_at",
            "canceled_has_failed_at",
            "amount_format_valid",
            "audit_status_agrees",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 4);
        assert!(checks.contains(&"succeeded_has_paid_at"));
        assert!(checks.contains(&"amount_format_valid"));
    }
}
