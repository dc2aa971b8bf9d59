//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use paygate_payments::PaymentsService;

use crate::auth::JwtManager;
use crate::config::Config;
use crate::error::ApiError;

/// Shared application state.
///
/// Services are constructed once at process start with their dependencies
/// injected and handed to the router explicitly; request handlers never
/// reach into process-global service registries.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt_manager: JwtManager,
    /// Payments service; `None` when Stripe is not configured, in which
    /// case payment routes answer with a configuration error.
    pub payments: Option<Arc<PaymentsService>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let payments = match PaymentsService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe payments service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe payments not configured: {}", e);
                None
            }
        };

        Self::with_payments(pool, config, payments)
    }

    /// Construction path with an explicit payments service. Tests use this
    /// to inject a service built from a known configuration instead of the
    /// process environment.
    pub fn with_payments(
        pool: PgPool,
        config: Config,
        payments: Option<Arc<PaymentsService>>,
    ) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        Self {
            pool,
            config,
            jwt_manager,
            payments,
        }
    }

    /// The payments service, or a configuration error when Stripe is not set
    /// up. Checked before any provider call is attempted.
    pub fn payments_service(&self) -> Result<&Arc<PaymentsService>, ApiError> {
        self.payments
            .as_ref()
            .ok_or_else(|| ApiError::internal("payment provider not configured"))
    }
}
