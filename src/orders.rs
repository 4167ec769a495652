//! Order reads and the status lifecycle.
//!
//! Orders are immutable once created except for their status, which only a
//! seller present on the order may change. Each change appends one entry to
//! the append-only status history; the target status is validated for enum
//! membership only, not for transition ordering.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    auth::Verified,
    error::AppError,
    models::{Order, OrderItem, OrderStatus, StatusHistoryEntry},
    AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next_page: page * limit < total,
            has_prev_page: page > 1,
        }
    }
}

pub fn page_bounds(page: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Loads the item snapshots for a page of orders in one query.
pub async fn attach_items(
    db: &PgPool,
    rows: Vec<Order>,
) -> Result<Vec<OrderWithItems>, AppError> {
    let ids: Vec<Uuid> = rows.iter().map(|o| o.id).collect();
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY id",
    )
    .bind(&ids)
    .fetch_all(db)
    .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    Ok(rows
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            OrderWithItems { order, items }
        })
        .collect())
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn get_order_history(
    State(state): State<AppState>,
    Verified(user): Verified,
    Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (page, limit) = page_bounds(params.page, params.limit);

    let rows = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user.id)
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&state.db)
    .await?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE buyer_id = $1")
        .bind(user.id)
        .fetch_one(&state.db)
        .await?;

    let orders = attach_items(&state.db, rows).await?;
    Ok(Json(json!({
        "success": true,
        "orders": orders,
        "pagination": Pagination::new(page, limit, total),
    })))
}

pub async fn get_order_by_id(
    State(state): State<AppState>,
    Verified(user): Verified,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let is_buyer = order.buyer_id == user.id;
    let is_seller = items.iter().any(|i| i.seller_id == user.id);
    if !is_buyer && !is_seller {
        return Err(AppError::Forbidden(
            "You are not authorized to view this order".into(),
        ));
    }

    let history = sqlx::query_as::<_, StatusHistoryEntry>(
        "SELECT status, updated_by, created_at FROM order_status_history \
         WHERE order_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "order": {
            "id": order.id,
            "orderNumber": order.order_number,
            "buyerId": order.buyer_id,
            "subtotal": order.subtotal,
            "platformFee": order.platform_fee,
            "total": order.total,
            "shippingAddress": {
                "street": order.street,
                "city": order.city,
                "state": order.state,
                "zipCode": order.zip_code,
                "country": order.country,
            },
            "paymentMethod": order.payment_method,
            "status": order.status,
            "statusHistory": history,
            "items": items,
            "createdAt": order.created_at,
            "updatedAt": order.updated_at,
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn update_order_status(
    State(state): State<AppState>,
    Verified(user): Verified,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid order status".into()))?;

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("Order"))?;

    let is_seller = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM order_items WHERE order_id = $1 AND seller_id = $2)",
    )
    .bind(order.id)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;
    if !is_seller {
        return Err(AppError::Forbidden(
            "You are not authorized to update this order".into(),
        ));
    }

    // The status write and its history entry land together.
    let mut tx = state.db.begin().await?;
    let updated_at = sqlx::query_scalar::<_, chrono::DateTime<chrono::Utc>>(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING updated_at",
    )
    .bind(order.id)
    .bind(status.as_str())
    .fetch_one(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO order_status_history (order_id, status, updated_by) VALUES ($1, $2, $3)",
    )
    .bind(order.id)
    .bind(status.as_str())
    .bind(user.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(order = %order.id, seller = %user.id, status = %status, "order status updated");

    Ok(Json(json!({
        "success": true,
        "message": "Order status updated successfully",
        "order": {
            "id": order.id,
            "status": status,
            "updatedAt": updated_at,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_envelope_math() {
        let p = Pagination::new(1, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next_page);
        assert!(!p.has_prev_page);

        let p = Pagination::new(3, 10, 25);
        assert!(!p.has_next_page);
        assert!(p.has_prev_page);

        let p = Pagination::new(1, 10, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next_page);
    }

    #[test]
    fn page_bounds_clamp_inputs() {
        assert_eq!(page_bounds(None, None), (1, 10));
        assert_eq!(page_bounds(Some(0), Some(0)), (1, 1));
        assert_eq!(page_bounds(Some(-3), Some(1000)), (1, 100));
        assert_eq!(page_bounds(Some(4), Some(20)), (4, 20));
    }
}
