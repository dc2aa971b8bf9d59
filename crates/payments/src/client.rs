//! Stripe client wrapper and configuration

use std::sync::Arc;

use crate::error::{PaymentError, PaymentResult};

/// Stripe configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: String,
    /// Webhook signing secret (`whsec_...`). May be empty; webhook
    /// verification fails closed when it is.
    pub webhook_secret: String,
    /// Public base URL of the application, used to build the checkout
    /// success/cancel redirect URLs.
    pub app_base_url: String,
}

impl StripeConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::ConfigMissing("STRIPE_SECRET_KEY"))?;
        let app_base_url = std::env::var("APP_BASE_URL")
            .map_err(|_| PaymentError::ConfigMissing("APP_BASE_URL"))?;
        // Tolerated at startup; checked again before any webhook is accepted
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();

        if webhook_secret.is_empty() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set - webhook deliveries will be rejected");
        }

        Ok(Self {
            secret_key,
            webhook_secret,
            app_base_url,
        })
    }
}

/// Shared Stripe API client
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn from_env() -> PaymentResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    /// The underlying SDK client, for issuing API calls
    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
