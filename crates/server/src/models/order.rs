//! Order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use greens_core::{
    CurrencyCode, EscrowStatus, OrderId, OrderItemId, OrderStatus, PaymentStatus, ProductId,
    UserId,
};

/// An order with its item snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub escrow_status: EscrowStatus,
    pub total_amount: Decimal,
    pub currency: CurrencyCode,
    pub shipping_address: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Distinct sellers with items in this order.
    #[must_use]
    pub fn seller_ids(&self) -> Vec<UserId> {
        let mut sellers: Vec<UserId> = self.items.iter().map(|i| i.seller_id).collect();
        sellers.sort_unstable();
        sellers.dedup();
        sellers
    }

    #[must_use]
    pub fn has_seller(&self, user: UserId) -> bool {
        self.items.iter().any(|i| i.seller_id == user)
    }
}

/// Immutable line snapshot taken at order time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub items: Vec<OrderLineRequest>,
    pub shipping_address: Option<serde_json::Value>,
    pub notes: Option<String>,
}

/// Whose orders to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderRole {
    #[default]
    Buyer,
    Seller,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub method: String,
    pub amount: Decimal,
}
