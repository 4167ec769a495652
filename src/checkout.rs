//! Checkout transaction orchestration.
//!
//! Converts a validated cart into an order with all-or-nothing semantics:
//! order creation, immutable item snapshots, conditional stock decrements and
//! cart clearing commit together or not at all. Product rows are locked for
//! the duration of the transaction, and the decrement re-checks stock at
//! write time so two racing checkouts can never oversell.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Verified,
    config::Config,
    error::AppError,
    fees,
    idempotency::{self, CachedResponse, IDEMPOTENCY_KEY_HEADER, SIGNATURE_HEADER},
    models::{OrderStatus, PaymentMethod, ProductStatus},
    notify,
    orders::{self, Pagination},
    AppState,
};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "zipCode is required"))]
    pub zip_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate]
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: Uuid,
    pub total: Decimal,
    pub item_count: usize,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CheckoutLine {
    product_id: Uuid,
    quantity: i32,
    title: String,
    price: Decimal,
    stock: i32,
    status: String,
    seller_id: Uuid,
}

pub async fn process_checkout(
    State(state): State<AppState>,
    Verified(user): Verified,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    req.validate()?;

    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    if let Some(ref key) = key {
        if let Some(hit) = state.idempotency.get(key) {
            tracing::info!(buyer = %user.id, "replaying cached checkout response");
            return Ok((
                StatusCode::OK,
                [(SIGNATURE_HEADER, hit.signature)],
                Json(hit.body),
            )
                .into_response());
        }
    }

    let summary = execute_checkout(&state.db, &state.config, user.id, &req).await?;
    tracing::info!(buyer = %user.id, order = %summary.id, total = %summary.total, "order placed");

    notify::order_confirmed(state.nats.clone(), &user.email, &summary);

    let body = json!({
        "success": true,
        "message": "Order placed successfully",
        "order": summary,
    });

    // Only a committed success populates the idempotency store; any failure
    // above left the key unset so the client may retry it.
    if let Some(key) = key {
        let signature = idempotency::sign(state.config.signing_secret(), body.to_string().as_bytes());
        state.idempotency.put(
            &key,
            CachedResponse {
                body: body.clone(),
                signature: signature.clone(),
            },
        );
        return Ok((
            StatusCode::CREATED,
            [(SIGNATURE_HEADER, signature)],
            Json(body),
        )
            .into_response());
    }

    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Runs the whole checkout inside one transaction. Early return on any error
/// drops the transaction, which rolls every write back.
async fn execute_checkout(
    db: &PgPool,
    config: &Config,
    buyer_id: Uuid,
    req: &CheckoutRequest,
) -> Result<OrderSummary, AppError> {
    let mut tx = db.begin().await?;

    // Lock the product rows for the duration of the transaction so the
    // validation snapshot below cannot be invalidated by a racing checkout.
    // Ordering by product id gives every checkout the same lock acquisition
    // order, so two carts sharing products cannot deadlock.
    let lines = sqlx::query_as::<_, CheckoutLine>(
        "SELECT ci.product_id, ci.quantity, p.title, p.price, p.stock, p.status, p.seller_id \
         FROM cart_items ci \
         JOIN carts c ON c.id = ci.cart_id \
         JOIN products p ON p.id = ci.product_id \
         WHERE c.owner_id = $1 \
         ORDER BY ci.product_id \
         FOR UPDATE OF p",
    )
    .bind(buyer_id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
        return Err(AppError::EmptyCart);
    }

    let mut subtotal = Decimal::ZERO;
    for line in &lines {
        if line.status != ProductStatus::Active.as_str() {
            return Err(AppError::ProductUnavailable {
                title: line.title.clone(),
            });
        }
        if line.stock < line.quantity {
            return Err(AppError::InsufficientStock {
                title: line.title.clone(),
                available: line.stock,
            });
        }
        subtotal += line.price * Decimal::from(line.quantity);
    }

    let surcharge = fees::surcharge_from_seed(&config.platform_seed);
    let platform_fee = fees::platform_fee(subtotal, surcharge);
    let total = subtotal + platform_fee;

    let order_id = Uuid::now_v7();
    let order_number = format!("ORD-{:08}", rand::random::<u32>());
    let addr = &req.shipping_address;

    let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
        "INSERT INTO orders (id, order_number, buyer_id, subtotal, platform_fee, total, \
                             street, city, state, zip_code, country, payment_method, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending') \
         RETURNING created_at",
    )
    .bind(order_id)
    .bind(&order_number)
    .bind(buyer_id)
    .bind(subtotal)
    .bind(platform_fee)
    .bind(total)
    .bind(&addr.street)
    .bind(&addr.city)
    .bind(&addr.state)
    .bind(&addr.zip_code)
    .bind(&addr.country)
    .bind(req.payment_method.as_str())
    .fetch_one(&mut *tx)
    .await?;

    // Price, title and seller are copied here; the order record must not
    // change even if the product later changes or disappears.
    for line in &lines {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, seller_id, title, unit_price, quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::now_v7())
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.seller_id)
        .bind(&line.title)
        .bind(line.price)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "INSERT INTO order_status_history (order_id, status, updated_by) VALUES ($1, 'pending', $2)",
    )
    .bind(order_id)
    .bind(buyer_id)
    .execute(&mut *tx)
    .await?;

    // Conditional decrement: zero rows affected means the stock guard failed
    // at write time, which aborts the whole checkout.
    for line in &lines {
        let updated = sqlx::query(
            "UPDATE products SET stock = stock - $2, sold = sold + $2, updated_at = NOW() \
             WHERE id = $1 AND stock >= $2",
        )
        .bind(line.product_id)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::TransactionFailed);
        }
    }

    sqlx::query(
        "DELETE FROM cart_items ci USING carts c WHERE ci.cart_id = c.id AND c.owner_id = $1",
    )
    .bind(buyer_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(OrderSummary {
        id: order_id,
        total,
        item_count: lines.len(),
        status: OrderStatus::Pending,
        created_at,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub async fn get_transaction_history(
    State(state): State<AppState>,
    Verified(user): Verified,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (page, limit) = orders::page_bounds(params.page, params.limit);
    // Unknown status values are ignored rather than rejected.
    let status = params
        .status
        .as_deref()
        .and_then(|s| s.parse::<OrderStatus>().ok());

    let rows = sqlx::query_as::<_, crate::models::Order>(
        "SELECT * FROM orders \
         WHERE buyer_id = $1 \
           AND ($2::text IS NULL OR status = $2) \
           AND ($3::timestamptz IS NULL OR created_at >= $3) \
           AND ($4::timestamptz IS NULL OR created_at <= $4) \
         ORDER BY created_at DESC LIMIT $5 OFFSET $6",
    )
    .bind(user.id)
    .bind(status.map(OrderStatus::as_str))
    .bind(params.start_date)
    .bind(params.end_date)
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&state.db)
    .await?;

    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM orders \
         WHERE buyer_id = $1 \
           AND ($2::text IS NULL OR status = $2) \
           AND ($3::timestamptz IS NULL OR created_at >= $3) \
           AND ($4::timestamptz IS NULL OR created_at <= $4)",
    )
    .bind(user.id)
    .bind(status.map(OrderStatus::as_str))
    .bind(params.start_date)
    .bind(params.end_date)
    .fetch_one(&state.db)
    .await?;

    let orders = orders::attach_items(&state.db, rows).await?;
    Ok(Json(json!({
        "success": true,
        "orders": orders,
        "pagination": Pagination::new(page, limit, total),
    })))
}
