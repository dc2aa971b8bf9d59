//! HTTP routes

pub mod payments;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::auth::require_auth;
use crate::state::AppState;

/// Build the application router.
///
/// The webhook endpoint is deliberately outside the auth layer: its trust is
/// established by signature verification over the raw body.
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/payments/{id}", get(payments::get_payment))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/payments/webhook", post(payments::stripe_webhook))
        .merge(authenticated)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
