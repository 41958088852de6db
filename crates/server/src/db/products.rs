//! Product repository: listings, keyword search, stock movements.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::instrument;

use greens_core::{CategoryId, CurrencyCode, Pagination, ProductCondition, ProductId, UserId};

use super::RepositoryError;
use crate::models::product::{Product, ProductFilters, RankedProduct};

pub(crate) const PRODUCT_COLUMNS: &str = "p.id, p.seller_id, p.category_id, p.title, \
     p.description, p.price, p.currency, p.condition, p.stock_quantity, p.specifications, \
     p.images, p.is_active, p.view_count, p.created_at, p.updated_at";

/// Visible in listings and search.
const LISTED: &str = "p.is_active AND p.deleted_at IS NULL";

/// Raw product row; `currency` is stored as text and parsed on read.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: ProductId,
    seller_id: UserId,
    category_id: Option<CategoryId>,
    title: String,
    description: String,
    price: Decimal,
    currency: String,
    condition: ProductCondition,
    stock_quantity: i32,
    specifications: serde_json::Value,
    images: Json<Vec<String>>,
    is_active: bool,
    view_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let currency = row.currency.parse::<CurrencyCode>().map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.id))
        })?;

        Ok(Self {
            id: row.id,
            seller_id: row.seller_id,
            category_id: row.category_id,
            title: row.title,
            description: row.description,
            price: row.price,
            currency,
            condition: row.condition,
            stock_quantity: row.stock_quantity,
            specifications: row.specifications,
            images: row.images.0,
            is_active: row.is_active,
            view_count: row.view_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RankedRow {
    #[sqlx(flatten)]
    product: ProductRow,
    rank: f32,
}

/// Fully resolved column values for an insert or update.
#[derive(Debug, Clone)]
pub struct ProductWrite {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub condition: ProductCondition,
    pub stock_quantity: i32,
    pub category_id: Option<CategoryId>,
    pub specifications: serde_json::Value,
    pub images: Vec<String>,
    pub is_active: bool,
}

pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    #[instrument(skip(self, write), fields(seller = %seller))]
    pub async fn create(
        &self,
        seller: UserId,
        write: &ProductWrite,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO marketplace.product AS p \
                 (seller_id, title, description, price, currency, condition, stock_quantity, \
                  category_id, specifications, images, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(seller)
        .bind(&write.title)
        .bind(&write.description)
        .bind(write.price)
        .bind(write.currency.code())
        .bind(write.condition)
        .bind(write.stock_quantity)
        .bind(write.category_id)
        .bind(&write.specifications)
        .bind(Json(&write.images))
        .bind(write.is_active)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// A product that has not been soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM marketplace.product p \
             WHERE p.id = $1 AND p.deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Like [`get`](Self::get) but also counts the view.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn get_and_count_view(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE marketplace.product AS p SET view_count = p.view_count + 1 \
             WHERE p.id = $1 AND p.deleted_at IS NULL \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is gone.
    #[instrument(skip(self, write))]
    pub async fn update(
        &self,
        id: ProductId,
        write: &ProductWrite,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE marketplace.product AS p SET \
                 title = $2, description = $3, price = $4, currency = $5, condition = $6, \
                 stock_quantity = $7, category_id = $8, specifications = $9, images = $10, \
                 is_active = $11, updated_at = NOW() \
             WHERE p.id = $1 AND p.deleted_at IS NULL \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(&write.title)
        .bind(&write.description)
        .bind(write.price)
        .bind(write.currency.code())
        .bind(write.condition)
        .bind(write.stock_quantity)
        .bind(write.category_id)
        .bind(&write.specifications)
        .bind(Json(&write.images))
        .bind(write.is_active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// Soft delete: mark deleted, drop its embedding, pull it from carts and wishlists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is already gone.
    #[instrument(skip(self))]
    pub async fn soft_delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE marketplace.product \
             SET deleted_at = NOW(), is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query("DELETE FROM marketplace.product_embedding WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM marketplace.cart_item WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM marketplace.wishlist_item WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Filtered, sorted page of listed products plus the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filters: &ProductFilters,
        pagination: Pagination,
    ) -> Result<(Vec<Product>, i64), RepositoryError> {
        let where_clause = format!("{LISTED} AND {}", filter_clause(1));

        let rows = bind_filters(
            sqlx::query_as::<_, ProductRow>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM marketplace.product p \
                 WHERE {where_clause} \
                 ORDER BY {} LIMIT $6 OFFSET $7",
                filters.sort.order_by()
            )),
            filters,
        )
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        let (total,) = bind_filters(
            sqlx::query_as::<_, (i64,)>(&format!(
                "SELECT COUNT(*) FROM marketplace.product p WHERE {where_clause}"
            )),
            filters,
        )
        .fetch_one(self.pool)
        .await?;

        let products = rows
            .into_iter()
            .map(Product::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((products, total))
    }

    /// Full-text match on title and description, or a title substring match,
    /// with the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, filters))]
    pub async fn keyword_search(
        &self,
        query: &str,
        filters: &ProductFilters,
        pagination: Pagination,
    ) -> Result<(Vec<RankedProduct>, i64), RepositoryError> {
        let hits = self
            .keyword_window(query, filters, pagination.sql_limit(), pagination.sql_offset())
            .await?;

        let (total,) = bind_filters(
            sqlx::query_as::<_, (i64,)>(&format!(
                "SELECT COUNT(*) FROM marketplace.product p WHERE {}",
                keyword_where()
            )),
            filters,
        )
        .bind(query)
        .bind(escape_like(query))
        .fetch_one(self.pool)
        .await?;

        Ok((hits, total))
    }

    /// Keyword matches by rank, skipping `offset` rows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    #[instrument(skip(self, filters))]
    pub async fn keyword_window(
        &self,
        query: &str,
        filters: &ProductFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<RankedProduct>, RepositoryError> {
        let rows = bind_filters(
            sqlx::query_as::<_, RankedRow>(&format!(
                "SELECT {PRODUCT_COLUMNS}, \
                     ts_rank(to_tsvector('english', p.title || ' ' || p.description), \
                             plainto_tsquery('english', $6)) AS rank \
                 FROM marketplace.product p \
                 WHERE {} \
                 ORDER BY rank DESC, p.created_at DESC \
                 LIMIT $8 OFFSET $9",
                keyword_where()
            )),
            filters,
        )
        .bind(query)
        .bind(escape_like(query))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(RankedProduct {
                    product: r.product.try_into()?,
                    rank: r.rank,
                })
            })
            .collect()
    }

    /// Lock the given products `FOR UPDATE` in ascending id order.
    ///
    /// Deleted products are omitted; callers compare against the requested ids.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_for_update(
        conn: &mut PgConnection,
        ids: &[ProductId],
    ) -> Result<Vec<Product>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM marketplace.product p \
             WHERE p.id = ANY($1) AND p.deleted_at IS NULL \
             ORDER BY p.id \
             FOR UPDATE"
        ))
        .bind(&raw)
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Add `delta` (may be negative) to a product's stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails, including
    /// the stock `CHECK` when it would go negative.
    pub async fn adjust_stock(
        conn: &mut PgConnection,
        id: ProductId,
        delta: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE marketplace.product \
             SET stock_quantity = stock_quantity + $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(delta)
        .execute(conn)
        .await?;

        Ok(())
    }
}

/// Listed products matching `$6` (full text) or `$7` (title substring).
fn keyword_where() -> String {
    format!(
        "{LISTED} AND {} AND ( \
             to_tsvector('english', p.title || ' ' || p.description) \
                 @@ plainto_tsquery('english', $6) \
             OR p.title ILIKE '%' || $7 || '%' \
         )",
        filter_clause(1)
    )
}

/// Optional filters as nullable parameters `$first..$first+4`.
fn filter_clause(first: usize) -> String {
    let (c, s, lo, hi, cond) = (first, first + 1, first + 2, first + 3, first + 4);
    format!(
        "(${c}::INTEGER IS NULL OR p.category_id = ${c}) \
         AND (${s}::INTEGER IS NULL OR p.seller_id = ${s}) \
         AND (${lo}::NUMERIC IS NULL OR p.price >= ${lo}) \
         AND (${hi}::NUMERIC IS NULL OR p.price <= ${hi}) \
         AND (${cond}::marketplace.product_condition IS NULL OR p.condition = ${cond})"
    )
}

fn bind_filters<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    filters: &ProductFilters,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    query
        .bind(filters.category_id)
        .bind(filters.seller_id)
        .bind(filters.min_price)
        .bind(filters.max_price)
        .bind(filters.condition)
}

/// Escape `ILIKE` metacharacters so user input matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("basil"), "basil");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_filter_clause_numbers_params_from_start() {
        let clause = filter_clause(3);
        assert!(clause.starts_with("($3::INTEGER IS NULL"));
        assert!(clause.contains("p.condition = $7"));
        assert!(!clause.contains("$8"));
    }
}
