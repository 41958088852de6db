//! Order repository. Multi-row writes take a `&mut PgConnection` so the
//! service can run them inside one transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use greens_core::{
    CurrencyCode, EscrowStatus, OrderId, OrderStatus, Pagination, PaymentStatus, ProductId, UserId,
};

use super::RepositoryError;
use crate::models::order::{Order, OrderItem, OrderRole};

const ORDER_COLUMNS: &str = "o.id, o.buyer_id, o.status, o.payment_status, o.escrow_status, \
     o.total_amount, o.currency, o.shipping_address, o.notes, o.payment_method, o.paid_at, \
     o.shipped_at, o.delivered_at, o.cancelled_at, o.escrow_released_at, o.created_at, \
     o.updated_at";

const ITEM_COLUMNS: &str =
    "id, order_id, product_id, seller_id, title, unit_price, quantity, subtotal";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    buyer_id: UserId,
    status: OrderStatus,
    payment_status: PaymentStatus,
    escrow_status: EscrowStatus,
    total_amount: Decimal,
    currency: String,
    shipping_address: Option<serde_json::Value>,
    notes: Option<String>,
    payment_method: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    escrow_released_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let currency = self.currency.parse::<CurrencyCode>().map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: {e}", self.id))
        })?;

        Ok(Order {
            id: self.id,
            buyer_id: self.buyer_id,
            status: self.status,
            payment_status: self.payment_status,
            escrow_status: self.escrow_status,
            total_amount: self.total_amount,
            currency,
            shipping_address: self.shipping_address,
            notes: self.notes,
            payment_method: self.payment_method,
            paid_at: self.paid_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
            escrow_released_at: self.escrow_released_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        })
    }
}

/// Header values for a new order.
#[derive(Debug, Clone)]
pub struct OrderHeader<'h> {
    pub buyer: UserId,
    pub total_amount: Decimal,
    pub currency: CurrencyCode,
    pub shipping_address: Option<&'h serde_json::Value>,
    pub notes: Option<&'h str>,
}

/// Snapshot of one ordered line.
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pub product_id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert the order header and its item snapshots.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any insert fails.
    pub async fn insert(
        conn: &mut PgConnection,
        header: &OrderHeader<'_>,
        items: &[ItemSnapshot],
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO marketplace.order AS o \
                 (buyer_id, total_amount, currency, shipping_address, notes) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(header.buyer)
        .bind(header.total_amount)
        .bind(header.currency.code())
        .bind(header.shipping_address)
        .bind(header.notes)
        .fetch_one(&mut *conn)
        .await?;

        let mut stored = Vec::with_capacity(items.len());
        for item in items {
            let stored_item = sqlx::query_as::<_, OrderItem>(&format!(
                "INSERT INTO marketplace.order_item \
                     (order_id, product_id, seller_id, title, unit_price, quantity, subtotal) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {ITEM_COLUMNS}"
            ))
            .bind(row.id)
            .bind(item.product_id)
            .bind(item.seller_id)
            .bind(&item.title)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.subtotal)
            .fetch_one(&mut *conn)
            .await?;
            stored.push(stored_item);
        }

        row.into_order(stored)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id, false).await
    }

    /// Fetch and row-lock an order inside a transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_for_update(
        conn: &mut PgConnection,
        id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        Self::fetch(conn, id, true).await
    }

    async fn fetch(
        conn: &mut PgConnection,
        id: OrderId,
        lock: bool,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM marketplace.order o WHERE o.id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM marketplace.order_item WHERE order_id = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        row.into_order(items).map(Some)
    }

    /// Orders where `user` is the buyer or has sold an item, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        user: UserId,
        role: OrderRole,
        pagination: Pagination,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let filter = match role {
            OrderRole::Buyer => "o.buyer_id = $1",
            OrderRole::Seller => {
                "EXISTS (SELECT 1 FROM marketplace.order_item i \
                 WHERE i.order_id = o.id AND i.seller_id = $1)"
            }
        };

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM marketplace.order o \
             WHERE {filter} \
             ORDER BY o.created_at DESC, o.id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(user)
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM marketplace.order o WHERE {filter}"
        ))
        .bind(user)
        .fetch_one(self.pool)
        .await?;

        let ids: Vec<i32> = rows.iter().map(|r| r.id.as_i32()).collect();
        let mut items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM marketplace.order_item \
             WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let (mine, rest): (Vec<_>, Vec<_>) =
                items.into_iter().partition(|i| i.order_id == row.id);
            items = rest;
            orders.push(row.into_order(mine)?);
        }

        Ok((orders, total))
    }

    /// Move the order to `status`, stamping the matching timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_status(
        conn: &mut PgConnection,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE marketplace.order SET \
                 status = $2, \
                 shipped_at = CASE WHEN $2 = 'shipped'::marketplace.order_status \
                     THEN NOW() ELSE shipped_at END, \
                 delivered_at = CASE WHEN $2 = 'delivered'::marketplace.order_status \
                     THEN NOW() ELSE delivered_at END, \
                 cancelled_at = CASE WHEN $2 = 'cancelled'::marketplace.order_status \
                     THEN NOW() ELSE cancelled_at END, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Record a payment outcome. `paid_at` is stamped when the payment succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn set_payment(
        conn: &mut PgConnection,
        id: OrderId,
        payment: PaymentStatus,
        escrow: EscrowStatus,
        method: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE marketplace.order SET \
                 payment_status = $2, \
                 escrow_status = $3, \
                 payment_method = COALESCE($4, payment_method), \
                 paid_at = CASE WHEN $2 = 'paid'::marketplace.payment_status \
                     THEN NOW() ELSE paid_at END, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(payment)
        .bind(escrow)
        .bind(method)
        .execute(conn)
        .await?;

        Ok(())
    }
}
