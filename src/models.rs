//! Database row types and status enums.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub sold: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Only `active` products are purchasable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Sold,
    Inactive,
    Pending,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Sold => "sold",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
        }
    }
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active.as_str()
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub payment_method: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub is_reviewed: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: String,
    pub updated_by: Option<Uuid>,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Order lifecycle states. Transitions are validated for membership only;
/// callers choose the target state freely (no legal-ordering check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    Card,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CashOnDelivery => "cash_on_delivery",
            Self::Card => "card",
            Self::Paypal => "paypal",
        }
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self::CashOnDelivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_round_trips() {
        for s in ["pending", "processing", "shipped", "delivered", "cancelled"] {
            let parsed: OrderStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("refunded".parse::<OrderStatus>().is_err());
        assert!("".parse::<OrderStatus>().is_err());
        assert!("Pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn payment_method_defaults_to_cash_on_delivery() {
        assert_eq!(PaymentMethod::default().as_str(), "cash_on_delivery");
    }

    #[test]
    fn status_history_serializes_timestamp_field() {
        let entry = StatusHistoryEntry {
            status: "pending".into(),
            updated_by: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert!(value.get("timestamp").is_some());
        assert!(value.get("createdAt").is_none());
        assert!(value.get("updatedBy").is_some());
    }

    #[test]
    fn status_enums_deserialize_from_lowercase() {
        let s: OrderStatus = serde_json::from_str("\"shipped\"").unwrap();
        assert_eq!(s, OrderStatus::Shipped);
        let p: PaymentMethod = serde_json::from_str("\"paypal\"").unwrap();
        assert_eq!(p, PaymentMethod::Paypal);
    }
}
