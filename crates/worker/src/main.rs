//! Paygate Background Worker
//!
//! Handles scheduled jobs including:
//! - Stale payment reconciliation sweep (every 15 minutes)
//! - Payment store invariant checks (daily at 4:00 AM UTC)
//! - Health check heartbeat (every 5 minutes)
//!
//! The sweep re-reconciles payments stuck in a non-terminal status, which
//! recovers missed webhook deliveries and sessions created at the provider
//! whose completion was never observed locally.

use std::sync::Arc;
use std::time::Duration;

use paygate_payments::{PaymentsService, ReconcileKey};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{error, info, warn};

/// Payments untouched for this long are considered stale
const SWEEP_STALE_MINUTES: i32 = 60;
/// Upper bound of payments reconciled per sweep run
const SWEEP_BATCH_SIZE: i64 = 100;

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = paygate_shared::create_pool(&database_url).await?;
    info!("Database pool created");
    Ok(pool)
}

/// Re-reconcile stale non-terminal payments against provider state
async fn run_reconciliation_sweep(payments: &PaymentsService) {
    let stale = match payments
        .store
        .list_stale(SWEEP_STALE_MINUTES, SWEEP_BATCH_SIZE)
        .await
    {
        Ok(stale) => stale,
        Err(e) => {
            error!(error = %e, "Failed to list stale payments");
            return;
        }
    };

    if stale.is_empty() {
        info!("Reconciliation sweep found no stale payments");
        return;
    }

    let total = stale.len();
    let mut advanced = 0;
    let mut unchanged = 0;
    let mut errors = 0;

    for record in stale {
        // Keyed by session ID: every record has one, and the session fetch
        // adopts the payment intent when the provider has created it.
        let strategy = ExponentialBackoff::from_millis(500).map(jitter).take(3);
        let result = Retry::spawn(strategy, || {
            let key = ReconcileKey::by_session_id(&record.stripe_session_id);
            async move { payments.reconcile.reconcile_status(&key).await }
        })
        .await;

        match result {
            Ok(updated) => {
                if updated.status != record.status {
                    info!(
                        payment_id = %updated.id,
                        old_status = %record.status,
                        new_status = %updated.status,
                        "Sweep advanced payment status"
                    );
                    advanced += 1;
                } else {
                    unchanged += 1;
                }
            }
            Err(e) => {
                error!(
                    payment_id = %record.id,
                    session_id = %record.stripe_session_id,
                    error = %e,
                    "Sweep failed to reconcile payment"
                );
                errors += 1;
            }
        }
    }

    info!(
        total = total,
        advanced = advanced,
        unchanged = unchanged,
        errors = errors,
        "Reconciliation sweep complete"
    );
}

/// Run all payment invariant checks and log any violations
async fn run_invariant_checks(payments: &PaymentsService) {
    match payments.invariants.run_all_checks().await {
        Ok(summary) => {
            if summary.healthy {
                info!(
                    checks_run = summary.checks_run,
                    "Payment invariant checks passed"
                );
            } else {
                for violation in &summary.violations {
                    warn!(
                        invariant = %violation.invariant,
                        severity = %violation.severity,
                        payment_ids = ?violation.payment_ids,
                        context = %violation.context,
                        "{}",
                        violation.description
                    );
                }
                warn!(
                    checks_failed = summary.checks_failed,
                    violations = summary.violations.len(),
                    "Payment invariant checks found violations"
                );
            }
        }
        Err(e) => error!(error = %e, "Failed to run payment invariant checks"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Paygate Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    // Create payments service
    let payments = match PaymentsService::from_env(pool.clone()) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            // If Stripe isn't configured, run in minimal mode
            warn!(error = %e, "Failed to create payments service - running in minimal mode");
            info!("Worker running without Stripe integration");

            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                info!("Worker heartbeat (minimal mode)");
            }
        }
    };

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Reconciliation sweep (every 15 minutes)
    let sweep_payments = payments.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let payments = sweep_payments.clone();
            Box::pin(async move {
                info!("Running stale payment reconciliation sweep");
                run_reconciliation_sweep(&payments).await;
            })
        })?)
        .await?;
    info!("Scheduled: Reconciliation sweep (every 15 minutes)");

    // Job 2: Invariant checks (daily at 4:00 AM UTC)
    let invariant_payments = payments.clone();
    scheduler
        .add(Job::new_async("0 0 4 * * *", move |_uuid, _l| {
            let payments = invariant_payments.clone();
            Box::pin(async move {
                info!("Running payment invariant checks");
                run_invariant_checks(&payments).await;
            })
        })?)
        .await?;
    info!("Scheduled: Payment invariant checks (daily at 4:00 AM UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Paygate Worker started successfully with {} scheduled jobs", 3);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
