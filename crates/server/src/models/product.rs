//! Product listing types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use greens_core::{CategoryId, CurrencyCode, ProductCondition, ProductId, UserId};

/// A product listing.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub category_id: Option<CategoryId>,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub condition: ProductCondition,
    pub stock_quantity: i32,
    pub specifications: serde_json::Value,
    pub images: Vec<String>,
    pub is_active: bool,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /products`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub currency: Option<String>,
    pub condition: Option<ProductCondition>,
    #[serde(default)]
    pub stock_quantity: i32,
    pub category_id: Option<CategoryId>,
    pub specifications: Option<serde_json::Value>,
    pub images: Option<Vec<String>>,
}

/// Body of `PUT /products/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub condition: Option<ProductCondition>,
    pub stock_quantity: Option<i32>,
    pub category_id: Option<CategoryId>,
    pub specifications: Option<serde_json::Value>,
    pub images: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl ProductPatch {
    /// Whether applying this patch changes the embedded text.
    #[must_use]
    pub fn touches_text(&self, current: &Product) -> bool {
        self.title.as_ref().is_some_and(|t| *t != current.title)
            || self
                .description
                .as_ref()
                .is_some_and(|d| *d != current.description)
    }
}

/// Listing order for `GET /products`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Popular,
}

impl ProductSort {
    /// `ORDER BY` clause body. Only ever one of these fixed strings.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.id DESC",
            Self::PriceAsc => "p.price ASC, p.id ASC",
            Self::PriceDesc => "p.price DESC, p.id DESC",
            Self::Popular => "p.view_count DESC, p.id DESC",
        }
    }
}

/// Filters shared by listing and both search modes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilters {
    pub category_id: Option<CategoryId>,
    pub seller_id: Option<UserId>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub condition: Option<ProductCondition>,
    #[serde(default)]
    pub sort: ProductSort,
}

/// A keyword search hit with its text rank.
#[derive(Debug, Clone, Serialize)]
pub struct RankedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub rank: f32,
}

/// A vector search hit; `similarity = 1 - cosine distance`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredProduct {
    #[serde(flatten)]
    pub product: Product,
    pub similarity: f64,
}

/// Body of `POST /search/semantic`.
#[derive(Debug, Clone, Deserialize)]
pub struct SemanticQuery {
    pub query: String,
    pub category_id: Option<CategoryId>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// How a semantic search request was actually answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    KeywordFallback,
}

/// One semantic search hit. Fallback hits carry `rank` instead of `similarity`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<f32>,
}

impl From<ScoredProduct> for SearchHit {
    fn from(hit: ScoredProduct) -> Self {
        Self {
            product: hit.product,
            similarity: Some(hit.similarity),
            rank: None,
        }
    }
}

impl From<RankedProduct> for SearchHit {
    fn from(hit: RankedProduct) -> Self {
        Self {
            product: hit.product,
            similarity: None,
            rank: Some(hit.rank),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticResults {
    pub mode: SearchMode,
    pub items: Vec<SearchHit>,
    pub limit: u32,
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(title: &str, description: &str) -> Product {
        Product {
            id: ProductId::new(1),
            seller_id: UserId::new(1),
            category_id: None,
            title: title.to_string(),
            description: description.to_string(),
            price: Decimal::ONE,
            currency: CurrencyCode::USD,
            condition: ProductCondition::New,
            stock_quantity: 1,
            specifications: serde_json::json!({}),
            images: Vec::new(),
            is_active: true,
            view_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_touches_text_only_on_real_change() {
        let current = product("Basil", "Fresh basil");

        let same_title = ProductPatch {
            title: Some("Basil".to_string()),
            ..ProductPatch::default()
        };
        assert!(!same_title.touches_text(&current));

        let price_only = ProductPatch {
            price: Some(Decimal::TEN),
            ..ProductPatch::default()
        };
        assert!(!price_only.touches_text(&current));

        let new_description = ProductPatch {
            description: Some("Dried basil".to_string()),
            ..ProductPatch::default()
        };
        assert!(new_description.touches_text(&current));
    }

    #[test]
    fn test_sort_parses_snake_case() {
        let sort: ProductSort = serde_json::from_str("\"price_desc\"").unwrap_or_default();
        assert_eq!(sort, ProductSort::PriceDesc);
    }
}
