//! Product listings, categories, and embedding refresh.

use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use greens_core::{CurrencyCode, Pagination, Price, ProductId, UserId};

use crate::cache::CacheStore;
use crate::db::embeddings::{self, ProductVectors};
use crate::db::products::ProductWrite;
use crate::db::{CategoryRepository, PreferencesRepository, ProductRepository, RepositoryError};
use crate::embeddings::{EmbeddingClient, EmbeddingError};
use crate::error::{DomainError, ErrorKind};
use crate::models::Page;
use crate::models::category::Category;
use crate::models::product::{NewProduct, Product, ProductFilters, ProductPatch};

pub const MAX_TITLE_LENGTH: usize = 200;
const MAX_DESCRIPTION_LENGTH: usize = 10_000;
const MAX_IMAGES: usize = 20;
const CATEGORY_CACHE_KEY: &str = "cache:categories";
const CATEGORY_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("{0}")]
    Validation(String),

    #[error("product not found")]
    NotFound,

    #[error("only the seller can modify this product")]
    Forbidden,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DomainError for ProductError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound => ErrorKind::NotFound,
            Self::Forbidden => ErrorKind::Forbidden,
            Self::Repository(e) => e.kind(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "PRODUCT_NOT_FOUND",
            Self::Forbidden => "NOT_PRODUCT_OWNER",
            other => other.kind().code(),
        }
    }
}

/// Product service.
pub struct ProductService<'a> {
    pool: &'a PgPool,
    products: ProductRepository<'a>,
    categories: CategoryRepository<'a>,
    preferences: PreferencesRepository<'a>,
    cache: &'a CacheStore,
    embedder: Option<&'a EmbeddingClient>,
}

impl<'a> ProductService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        cache: &'a CacheStore,
        embedder: Option<&'a EmbeddingClient>,
    ) -> Self {
        Self {
            pool,
            products: ProductRepository::new(pool),
            categories: CategoryRepository::new(pool),
            preferences: PreferencesRepository::new(pool),
            cache,
            embedder,
        }
    }

    /// List a new product for `seller`.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Validation` for bad input or an unknown category.
    #[instrument(skip(self, input), fields(seller = %seller))]
    pub async fn create(&self, seller: UserId, input: NewProduct) -> Result<Product, ProductError> {
        let write = ProductWrite {
            title: input.title.trim().to_string(),
            description: input.description,
            price: input.price,
            currency: parse_currency(input.currency.as_deref())?,
            condition: input.condition.unwrap_or_default(),
            stock_quantity: input.stock_quantity,
            category_id: input.category_id,
            specifications: input
                .specifications
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            images: input.images.unwrap_or_default(),
            is_active: true,
        };
        self.validate(&write).await?;

        let product = self.products.create(seller, &write).await?;
        info!(product_id = %product.id, "Product created");

        self.refresh_embedding(&product);
        Ok(product)
    }

    /// Fetch a product and count the view. Authenticated viewers also get it
    /// recorded in their browsing history.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound` for unknown or deleted products.
    pub async fn get(&self, id: ProductId, viewer: Option<UserId>) -> Result<Product, ProductError> {
        let product = self
            .products
            .get_and_count_view(id)
            .await?
            .ok_or(ProductError::NotFound)?;

        if let Some(viewer) = viewer
            && let Err(e) = self.preferences.record_view(viewer, id).await
        {
            warn!(error = %e, user_id = %viewer, "Failed to record browsing history");
        }

        Ok(product)
    }

    /// Apply a partial update. Only the seller may edit.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound`, `Forbidden`, or `Validation`.
    #[instrument(skip(self, patch), fields(caller = %caller, product_id = %id))]
    pub async fn update(
        &self,
        caller: UserId,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, ProductError> {
        let current = self.owned(caller, id).await?;
        let text_changed = patch.touches_text(&current);

        let currency = match patch.currency.as_deref() {
            Some(code) => parse_currency(Some(code))?,
            None => current.currency,
        };
        let write = ProductWrite {
            title: patch
                .title
                .map_or(current.title, |t| t.trim().to_string()),
            description: patch.description.unwrap_or(current.description),
            price: patch.price.unwrap_or(current.price),
            currency,
            condition: patch.condition.unwrap_or(current.condition),
            stock_quantity: patch.stock_quantity.unwrap_or(current.stock_quantity),
            category_id: patch.category_id.or(current.category_id),
            specifications: patch.specifications.unwrap_or(current.specifications),
            images: patch.images.unwrap_or(current.images),
            is_active: patch.is_active.unwrap_or(current.is_active),
        };
        self.validate(&write).await?;

        let product = self.products.update(id, &write).await.map_err(not_found)?;
        if text_changed {
            self.refresh_embedding(&product);
        }
        Ok(product)
    }

    /// Soft-delete a product. Only the seller may delete.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound` or `Forbidden`.
    #[instrument(skip(self), fields(caller = %caller, product_id = %id))]
    pub async fn delete(&self, caller: UserId, id: ProductId) -> Result<(), ProductError> {
        self.owned(caller, id).await?;
        self.products.soft_delete(id).await.map_err(not_found)?;
        info!("Product deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ProductError::Validation` if `min_price > max_price`.
    pub async fn list(
        &self,
        filters: &ProductFilters,
        pagination: Pagination,
    ) -> Result<Page<Product>, ProductError> {
        validate_filters(filters)?;
        let (items, total) = self.products.list(filters, pagination).await?;
        Ok(Page::new(items, pagination, total))
    }

    /// Active categories, served from the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if the database read fails.
    pub async fn categories(&self) -> Result<Vec<Category>, ProductError> {
        let key = self.cache.key(CATEGORY_CACHE_KEY);
        match self.cache.get_json::<Vec<Category>>(&key).await {
            Ok(Some(categories)) => return Ok(categories),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Category cache read failed"),
        }

        let categories = self.categories.list_active().await?;
        if let Err(e) = self
            .cache
            .set_json(&key, &categories, CATEGORY_CACHE_TTL)
            .await
        {
            warn!(error = %e, "Category cache write failed");
        }
        Ok(categories)
    }

    async fn owned(&self, caller: UserId, id: ProductId) -> Result<Product, ProductError> {
        let product = self.products.get(id).await?.ok_or(ProductError::NotFound)?;
        if product.seller_id != caller {
            return Err(ProductError::Forbidden);
        }
        Ok(product)
    }

    async fn validate(&self, write: &ProductWrite) -> Result<(), ProductError> {
        validate_write(write)?;
        if let Some(category) = write.category_id
            && !self.categories.exists(category).await?
        {
            return Err(ProductError::Validation(format!(
                "category {category} does not exist"
            )));
        }
        Ok(())
    }

    /// Spawn a background embedding refresh. No-op without a provider.
    fn refresh_embedding(&self, product: &Product) {
        let Some(client) = self.embedder else {
            debug!("No embedding provider configured; skipping refresh");
            return;
        };

        let pool = self.pool.clone();
        let client = client.clone();
        let (id, title, description) = (
            product.id,
            product.title.clone(),
            product.description.clone(),
        );

        tokio::spawn(async move {
            if let Err(e) = embed_product(&pool, &client, id, &title, &description).await {
                warn!(error = %e, product_id = %id, "Embedding refresh failed");
            }
        });
    }
}

/// Failure while computing or storing a product's embeddings.
#[derive(Debug, Error)]
pub enum EmbedProductError {
    #[error(transparent)]
    Provider(#[from] EmbeddingError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Embed title, description and their combination in one provider call and
/// store the result. A blank description is embedded as the title.
///
/// # Errors
///
/// Returns `EmbedProductError` if the provider call or the upsert fails.
#[instrument(skip(pool, client, title, description))]
pub async fn embed_product(
    pool: &PgPool,
    client: &EmbeddingClient,
    id: ProductId,
    title: &str,
    description: &str,
) -> Result<(), EmbedProductError> {
    let inputs = embedding_inputs(title, description);
    let mut vectors = client
        .embed_batch(&inputs.each_ref().map(String::as_str))
        .await?
        .into_iter();

    let (Some(title), Some(description), Some(combined)) =
        (vectors.next(), vectors.next(), vectors.next())
    else {
        return Err(EmbeddingError::InvalidResponse("expected three embeddings".into()).into());
    };

    embeddings::upsert(
        pool,
        id,
        client.model(),
        &ProductVectors {
            title,
            description,
            combined,
        },
    )
    .await?;
    Ok(())
}

/// Title, description and combined texts; providers reject empty inputs.
fn embedding_inputs(title: &str, description: &str) -> [String; 3] {
    let description = description.trim();
    if description.is_empty() {
        return [title.to_string(), title.to_string(), title.to_string()];
    }
    [
        title.to_string(),
        description.to_string(),
        format!("{title}\n\n{description}"),
    ]
}

fn not_found(e: RepositoryError) -> ProductError {
    match e {
        RepositoryError::NotFound => ProductError::NotFound,
        other => ProductError::Repository(other),
    }
}

fn parse_currency(code: Option<&str>) -> Result<CurrencyCode, ProductError> {
    code.map_or(Ok(CurrencyCode::default()), |c| {
        c.trim()
            .to_ascii_uppercase()
            .parse::<CurrencyCode>()
            .map_err(|e| ProductError::Validation(e.to_string()))
    })
}

fn validate_write(write: &ProductWrite) -> Result<(), ProductError> {
    let title_len = write.title.chars().count();
    if title_len == 0 || title_len > MAX_TITLE_LENGTH {
        return Err(ProductError::Validation(format!(
            "title must be 1 to {MAX_TITLE_LENGTH} characters"
        )));
    }
    if write.description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(ProductError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Price::new(write.price, write.currency)
        .map_err(|e| ProductError::Validation(e.to_string()))?;
    if write.stock_quantity < 0 {
        return Err(ProductError::Validation(
            "stock_quantity cannot be negative".to_string(),
        ));
    }
    if !write.specifications.is_object() {
        return Err(ProductError::Validation(
            "specifications must be a JSON object".to_string(),
        ));
    }
    if write.images.len() > MAX_IMAGES || write.images.iter().any(|i| i.trim().is_empty()) {
        return Err(ProductError::Validation(format!(
            "images must be at most {MAX_IMAGES} non-empty URLs"
        )));
    }
    Ok(())
}

/// Price bounds must be non-negative and ordered.
pub fn validate_filters(filters: &ProductFilters) -> Result<(), ProductError> {
    let negative = |p: Option<Decimal>| p.is_some_and(|p| p.is_sign_negative() && !p.is_zero());
    if negative(filters.min_price) || negative(filters.max_price) {
        return Err(ProductError::Validation(
            "price filters cannot be negative".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (filters.min_price, filters.max_price)
        && min > max
    {
        return Err(ProductError::Validation(
            "min_price cannot exceed max_price".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn write(title: &str, price: &str) -> ProductWrite {
        ProductWrite {
            title: title.to_string(),
            description: String::new(),
            price: Decimal::from_str(price).unwrap_or_default(),
            currency: CurrencyCode::USD,
            condition: greens_core::ProductCondition::New,
            stock_quantity: 0,
            category_id: None,
            specifications: serde_json::json!({}),
            images: Vec::new(),
            is_active: true,
        }
    }

    #[test]
    fn test_embedding_inputs_never_empty() {
        let blank = embedding_inputs("Purple basil", "   ");
        assert!(blank.iter().all(|text| text == "Purple basil"));

        let full = embedding_inputs("Purple basil", "Grown under glass");
        assert_eq!(full[1], "Grown under glass");
        assert_eq!(full[2], "Purple basil\n\nGrown under glass");
    }

    #[test]
    fn test_title_bounds() {
        assert!(validate_write(&write("Basil seedlings", "4.50")).is_ok());
        assert!(validate_write(&write("", "4.50")).is_err());
        assert!(validate_write(&write(&"t".repeat(MAX_TITLE_LENGTH), "1")).is_ok());
        assert!(validate_write(&write(&"t".repeat(MAX_TITLE_LENGTH + 1), "1")).is_err());
    }

    #[test]
    fn test_price_rules() {
        assert!(validate_write(&write("Free kale", "0")).is_ok());
        assert!(validate_write(&write("Kale", "-1")).is_err());
        assert!(validate_write(&write("Kale", "1.999")).is_err());
        assert!(matches!(
            validate_write(&write("Golden kale", "1000000000000")),
            Err(ProductError::Validation(_))
        ));
    }

    #[test]
    fn test_negative_stock_rejected() {
        let w = ProductWrite {
            stock_quantity: -1,
            ..write("Kale", "2")
        };
        assert!(matches!(validate_write(&w), Err(ProductError::Validation(_))));
    }

    #[test]
    fn test_specifications_must_be_object() {
        let w = ProductWrite {
            specifications: serde_json::json!(["not", "an", "object"]),
            ..write("Kale", "2")
        };
        assert!(validate_write(&w).is_err());
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!(parse_currency(None).ok(), Some(CurrencyCode::USD));
        assert_eq!(parse_currency(Some("eur")).ok(), Some(CurrencyCode::EUR));
        assert!(parse_currency(Some("DOGE")).is_err());
    }

    #[test]
    fn test_filter_bounds() {
        let ok = ProductFilters {
            min_price: Some(Decimal::ONE),
            max_price: Some(Decimal::TEN),
            ..Default::default()
        };
        assert!(validate_filters(&ok).is_ok());

        let inverted = ProductFilters {
            min_price: Some(Decimal::TEN),
            max_price: Some(Decimal::ONE),
            ..Default::default()
        };
        assert!(validate_filters(&inverted).is_err());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ProductError::NotFound.code(), "PRODUCT_NOT_FOUND");
        assert_eq!(ProductError::Forbidden.kind(), ErrorKind::Forbidden);
        assert_eq!(
            ProductError::Validation("x".into()).code(),
            "VALIDATION"
        );
    }
}
