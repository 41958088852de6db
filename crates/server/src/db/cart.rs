//! Cart and wishlist repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use greens_core::{CurrencyCode, ProductId, UserId};

use super::RepositoryError;
use crate::models::cart::{CartLine, WishlistEntry};

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    product_id: ProductId,
    title: String,
    unit_price: Decimal,
    currency: String,
    quantity: i32,
    in_stock: bool,
    added_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct WishlistRow {
    product_id: ProductId,
    title: String,
    price: Decimal,
    currency: String,
    is_available: bool,
    added_at: DateTime<Utc>,
}

fn parse_currency(product: ProductId, raw: &str) -> Result<CurrencyCode, RepositoryError> {
    raw.parse()
        .map_err(|e| RepositoryError::DataCorruption(format!("product {product}: {e}")))
}

pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Add `quantity` to the line, creating it if needed. Returns the new line quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the upsert fails.
    pub async fn add(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i32,
    ) -> Result<i32, RepositoryError> {
        let (quantity,): (i32,) = sqlx::query_as(
            "INSERT INTO marketplace.cart_item (user_id, product_id, quantity) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, product_id) DO UPDATE SET \
                 quantity = cart_item.quantity + EXCLUDED.quantity, \
                 updated_at = NOW() \
             RETURNING quantity",
        )
        .bind(user)
        .bind(product)
        .bind(quantity)
        .fetch_one(self.pool)
        .await?;

        Ok(quantity)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in the cart.
    pub async fn set_quantity(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE marketplace.cart_item SET quantity = $3, updated_at = NOW() \
             WHERE user_id = $1 AND product_id = $2",
        )
        .bind(user)
        .bind(product)
        .bind(quantity)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in the cart.
    pub async fn remove(&self, user: UserId, product: ProductId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM marketplace.cart_item WHERE user_id = $1 AND product_id = $2")
                .bind(user)
                .bind(product)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Cart lines at current product prices, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, user: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            "SELECT c.product_id, p.title, p.price AS unit_price, p.currency, c.quantity, \
                    (p.is_active AND p.deleted_at IS NULL AND p.stock_quantity >= c.quantity) \
                        AS in_stock, \
                    c.added_at \
             FROM marketplace.cart_item c \
             JOIN marketplace.product p ON p.id = c.product_id \
             WHERE c.user_id = $1 \
             ORDER BY c.added_at, c.product_id",
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(CartLine {
                    currency: parse_currency(r.product_id, &r.currency)?,
                    subtotal: r.unit_price * Decimal::from(r.quantity),
                    product_id: r.product_id,
                    title: r.title,
                    unit_price: r.unit_price,
                    quantity: r.quantity,
                    in_stock: r.in_stock,
                    added_at: r.added_at,
                })
            })
            .collect()
    }

    /// Drop ordered products from the buyer's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn remove_products(
        conn: &mut PgConnection,
        user: UserId,
        products: &[ProductId],
    ) -> Result<(), RepositoryError> {
        let raw: Vec<i32> = products.iter().map(ProductId::as_i32).collect();
        sqlx::query("DELETE FROM marketplace.cart_item WHERE user_id = $1 AND product_id = ANY($2)")
            .bind(user)
            .bind(&raw)
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Idempotent: an existing entry is left as is.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn wishlist_add(&self, user: UserId, product: ProductId) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO marketplace.wishlist_item (user_id, product_id) VALUES ($1, $2) \
             ON CONFLICT (user_id, product_id) DO NOTHING",
        )
        .bind(user)
        .bind(product)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not wishlisted.
    pub async fn wishlist_remove(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM marketplace.wishlist_item WHERE user_id = $1 AND product_id = $2",
        )
        .bind(user)
        .bind(product)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn wishlist(&self, user: UserId) -> Result<Vec<WishlistEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, WishlistRow>(
            "SELECT w.product_id, p.title, p.price, p.currency, \
                    (p.is_active AND p.deleted_at IS NULL) AS is_available, w.added_at \
             FROM marketplace.wishlist_item w \
             JOIN marketplace.product p ON p.id = w.product_id \
             WHERE w.user_id = $1 \
             ORDER BY w.added_at DESC",
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(WishlistEntry {
                    currency: parse_currency(r.product_id, &r.currency)?,
                    product_id: r.product_id,
                    title: r.title,
                    price: r.price,
                    is_available: r.is_available,
                    added_at: r.added_at,
                })
            })
            .collect()
    }
}
