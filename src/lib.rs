//! ResellBay - Peer-to-peer Marketplace Backend
//!
//! REST API for a resale marketplace: sellers list products, buyers fill
//! carts and check out into orders. The checkout pipeline is transactional
//! (order creation, stock decrement and cart clearing commit atomically) and
//! retry-safe via client-supplied idempotency keys.
//!
//! ## Features
//! - Cart reconciliation against live product state
//! - Atomic checkout with conditional stock decrements
//! - Platform fee calculation
//! - Idempotent response replay with HMAC signatures
//! - Seller-driven order status lifecycle

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod fees;
pub mod idempotency;
pub mod models;
pub mod notify;
pub mod orders;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub nats: Option<async_nats::Client>,
    pub idempotency: Arc<dyn idempotency::IdempotencyStore>,
    pub config: Arc<config::Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "resellbay"})) }),
        )
        .route(
            "/api/v1/cart",
            get(cart::get_cart)
                .post(cart::add_to_cart)
                .delete(cart::clear_cart),
        )
        .route(
            "/api/v1/cart/items/:product_id",
            put(cart::update_cart_item).delete(cart::remove_cart_item),
        )
        .route("/api/v1/checkout", post(checkout::process_checkout))
        .route(
            "/api/v1/checkout/history",
            get(checkout::get_transaction_history),
        )
        .route("/api/v1/orders", get(orders::get_order_history))
        .route("/api/v1/orders/:id", get(orders::get_order_by_id))
        .route("/api/v1/orders/:id/status", post(orders::update_order_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
