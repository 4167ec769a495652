//! Cart CRUD and reconciliation.
//!
//! A stored cart is never trusted as-is: every read runs it through
//! [`reconcile`], which drops lines whose product is gone from sale and
//! clamps quantities against live stock, persisting any correction before
//! the cart is returned. Checkout re-validates stock on top of this.

use axum::{extract::Path, extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{auth::AuthUser, error::AppError, models::ProductStatus, AppState};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub title: String,
    pub price: Decimal,
    pub stock: i32,
    pub status: String,
    pub seller_id: Uuid,
    pub seller_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub total_items: i64,
    pub total_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct SellerView {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: Uuid,
    pub title: String,
    pub price: Decimal,
    pub stock: i32,
    pub seller: SellerView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub product: ProductView,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartItemView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub cart: Option<CartView>,
    pub summary: CartSummary,
}

/// Quantity correction applied during reconciliation: never above live
/// stock, never below 1. A zero-stock product therefore still shows with
/// quantity 1; checkout's own stock check rejects it.
pub fn clamped_quantity(quantity: i32, stock: i32) -> i32 {
    quantity.min(stock).max(1)
}

/// Derived totals over reconciled lines, price rounded to 2 decimal places.
pub fn summarize(lines: &[CartLine]) -> CartSummary {
    let total_items = lines.iter().map(|l| i64::from(l.quantity)).sum();
    let total_price: Decimal = lines
        .iter()
        .map(|l| l.price * Decimal::from(l.quantity))
        .sum();
    CartSummary {
        total_items,
        total_price: total_price.round_dp(2),
    }
}

async fn find_or_create_cart(db: &PgPool, owner_id: Uuid) -> Result<Uuid, AppError> {
    if let Some(id) =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM carts WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(db)
            .await?
    {
        return Ok(id);
    }
    // Lazily created on first access; the unique owner constraint resolves
    // a concurrent double-create in favour of the existing row.
    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO carts (id, owner_id) VALUES ($1, $2) \
         ON CONFLICT (owner_id) DO UPDATE SET updated_at = NOW() RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(owner_id)
    .fetch_one(db)
    .await?;
    Ok(id)
}

/// Corrects the stored cart against live product truth and persists the
/// corrections, returning the lines that survived plus their summary.
pub async fn reconcile(
    db: &PgPool,
    owner_id: Uuid,
) -> Result<(Uuid, Vec<CartLine>, CartSummary), AppError> {
    let cart_id = find_or_create_cart(db, owner_id).await?;

    let mut lines = sqlx::query_as::<_, CartLine>(
        "SELECT ci.product_id, ci.quantity, p.title, p.price, p.stock, p.status, \
                p.seller_id, u.name AS seller_name \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         JOIN users u ON u.id = p.seller_id \
         WHERE ci.cart_id = $1",
    )
    .bind(cart_id)
    .fetch_all(db)
    .await?;

    let mut dropped = Vec::new();
    let mut clamped = Vec::new();
    for line in &lines {
        if line.status != ProductStatus::Active.as_str() {
            dropped.push(line.product_id);
        } else if line.quantity > line.stock {
            clamped.push((line.product_id, clamped_quantity(line.quantity, line.stock)));
        }
    }

    for product_id in &dropped {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .execute(db)
            .await?;
    }
    for (product_id, quantity) in &clamped {
        sqlx::query("UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .bind(quantity)
            .execute(db)
            .await?;
    }

    lines.retain(|l| !dropped.contains(&l.product_id));
    for line in &mut lines {
        if let Some((_, quantity)) = clamped.iter().find(|(id, _)| *id == line.product_id) {
            line.quantity = *quantity;
        }
    }

    let summary = summarize(&lines);
    Ok((cart_id, lines, summary))
}

fn cart_view(cart_id: Uuid, lines: Vec<CartLine>) -> Option<CartView> {
    if lines.is_empty() {
        return None;
    }
    Some(CartView {
        id: cart_id,
        items: lines
            .into_iter()
            .map(|l| CartItemView {
                quantity: l.quantity,
                product: ProductView {
                    id: l.product_id,
                    title: l.title,
                    price: l.price,
                    stock: l.stock,
                    seller: SellerView {
                        id: l.seller_id,
                        name: l.seller_name,
                    },
                },
            })
            .collect(),
    })
}

pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CartResponse>, AppError> {
    let (cart_id, lines, summary) = reconcile(&state.db, user.id).await?;
    Ok(Json(CartResponse {
        success: true,
        message: None,
        cart: cart_view(cart_id, lines),
        summary,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<CartResponse>, AppError> {
    if req.quantity < 1 {
        return Err(AppError::BadRequest(
            "Valid product ID and quantity are required.".into(),
        ));
    }

    let product = sqlx::query_as::<_, crate::models::Product>(
        "SELECT * FROM products WHERE id = $1",
    )
    .bind(req.product_id)
    .fetch_optional(&state.db)
    .await?
    .filter(|p| p.is_active())
    .ok_or(AppError::NotFound("Product"))?;

    if product.stock < req.quantity {
        return Err(AppError::InsufficientStock {
            title: product.title.clone(),
            available: product.stock,
        });
    }

    let cart_id = find_or_create_cart(&state.db, user.id).await?;
    sqlx::query(
        "INSERT INTO cart_items (cart_id, product_id, quantity) VALUES ($1, $2, $3) \
         ON CONFLICT (cart_id, product_id) \
         DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity",
    )
    .bind(cart_id)
    .bind(req.product_id)
    .bind(req.quantity)
    .execute(&state.db)
    .await?;

    let (cart_id, lines, summary) = reconcile(&state.db, user.id).await?;
    Ok(Json(CartResponse {
        success: true,
        message: Some(format!("\"{}\" added to cart.", product.title)),
        cart: cart_view(cart_id, lines),
        summary,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateCartItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    if req.quantity < 1 {
        return remove_cart_item(State(state), user, Path(product_id)).await;
    }

    let cart_id = find_or_create_cart(&state.db, user.id).await?;
    let updated =
        sqlx::query("UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .bind(req.quantity)
            .execute(&state.db)
            .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("Cart item"));
    }

    let (cart_id, lines, summary) = reconcile(&state.db, user.id).await?;
    Ok(Json(CartResponse {
        success: true,
        message: Some("Cart updated.".into()),
        cart: cart_view(cart_id, lines),
        summary,
    }))
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartResponse>, AppError> {
    let cart_id = find_or_create_cart(&state.db, user.id).await?;
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
        .bind(cart_id)
        .bind(product_id)
        .execute(&state.db)
        .await?;

    let (cart_id, lines, summary) = reconcile(&state.db, user.id).await?;
    Ok(Json(CartResponse {
        success: true,
        message: Some("Item removed from cart.".into()),
        cart: cart_view(cart_id, lines),
        summary,
    }))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<(StatusCode, Json<CartResponse>), AppError> {
    sqlx::query(
        "DELETE FROM cart_items ci USING carts c \
         WHERE ci.cart_id = c.id AND c.owner_id = $1",
    )
    .bind(user.id)
    .execute(&state.db)
    .await?;

    Ok((
        StatusCode::OK,
        Json(CartResponse {
            success: true,
            message: Some("Cart cleared successfully".into()),
            cart: None,
            summary: CartSummary {
                total_items: 0,
                total_price: Decimal::ZERO,
            },
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i32, price: Decimal, stock: i32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            quantity,
            title: "Listing".into(),
            price,
            stock,
            status: "active".into(),
            seller_id: Uuid::new_v4(),
            seller_name: "Seller".into(),
        }
    }

    #[test]
    fn clamp_caps_at_stock_with_floor_of_one() {
        assert_eq!(clamped_quantity(5, 3), 3);
        assert_eq!(clamped_quantity(2, 10), 2);
        // Zero stock still floors at 1; checkout rejects it later.
        assert_eq!(clamped_quantity(4, 0), 1);
    }

    #[test]
    fn summary_sums_quantities_and_prices() {
        let lines = vec![
            line(2, Decimal::new(1000, 2), 5), // 2 x 10.00
            line(1, Decimal::new(500, 2), 5),  // 1 x 5.00
        ];
        let summary = summarize(&lines);
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.total_price, Decimal::new(2500, 2));
    }

    #[test]
    fn summary_rounds_to_two_decimal_places() {
        let lines = vec![line(3, Decimal::new(3333, 3), 5)]; // 3 x 3.333
        assert_eq!(summarize(&lines).total_price, Decimal::new(1000, 2));
    }

    #[test]
    fn empty_cart_summary_is_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_items, 0);
        assert_eq!(summary.total_price, Decimal::ZERO);
    }

    #[test]
    fn empty_cart_serializes_as_null() {
        assert!(cart_view(Uuid::new_v4(), vec![]).is_none());
        let view = cart_view(Uuid::new_v4(), vec![line(1, Decimal::ONE, 1)]).unwrap();
        assert_eq!(view.items.len(), 1);
    }
}
