use serde::{Deserialize, Serialize};

use greens_core::CategoryId;

/// A catalog category. Serialized into the Redis category cache as well.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<CategoryId>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i32,
}
