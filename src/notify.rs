//! Best-effort order-confirmation events.
//!
//! Published after the checkout transaction has committed; a publish failure
//! is logged and never surfaced to the buyer.

use crate::checkout::OrderSummary;

const ORDER_CONFIRMED_SUBJECT: &str = "resellbay.orders.confirmed";

pub fn order_confirmed(
    nats: Option<async_nats::Client>,
    buyer_email: &str,
    summary: &OrderSummary,
) {
    let Some(client) = nats else {
        tracing::debug!(order = %summary.id, "no message broker configured, skipping confirmation");
        return;
    };

    let payload = serde_json::json!({
        "event": "order.confirmed",
        "orderId": summary.id,
        "buyerEmail": buyer_email,
        "total": summary.total,
        "itemCount": summary.item_count,
        "createdAt": summary.created_at,
    });

    let order_id = summary.id;
    tokio::spawn(async move {
        if let Err(e) = client
            .publish(ORDER_CONFIRMED_SUBJECT, payload.to_string().into())
            .await
        {
            tracing::warn!(order = %order_id, error = %e, "order confirmation publish failed");
        }
    });
}
