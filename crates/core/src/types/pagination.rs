//! Page/limit pagination shared by list endpoints.

use serde::{Deserialize, Serialize};

/// Page-based pagination, clamped to sane bounds.
///
/// Query strings carry `page` (1-based) and `limit`; both are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "Pagination::default_page")]
    pub page: u32,
    #[serde(default = "Pagination::default_limit")]
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    const fn default_page() -> u32 {
        1
    }

    const fn default_limit() -> u32 {
        Self::DEFAULT_LIMIT
    }

    /// Build a pagination, clamping `page` to at least 1 and `limit` to `1..=100`.
    #[must_use]
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Return a clamped copy (deserialized values are not trusted).
    #[must_use]
    pub fn normalized(self) -> Self {
        Self::new(self.page, self.limit)
    }

    /// SQL `LIMIT` value.
    #[must_use]
    pub fn sql_limit(self) -> i64 {
        i64::from(self.normalized().limit)
    }

    /// SQL `OFFSET` value.
    #[must_use]
    pub fn sql_offset(self) -> i64 {
        let p = self.normalized();
        i64::from(p.page - 1) * i64::from(p.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Pagination::default();
        assert_eq!(p.sql_limit(), 20);
        assert_eq!(p.sql_offset(), 0);
    }

    #[test]
    fn test_offset_for_later_pages() {
        let p = Pagination::new(3, 25);
        assert_eq!(p.sql_offset(), 50);
    }

    #[test]
    fn test_clamping() {
        let p = Pagination { page: 0, limit: 500 };
        assert_eq!(p.normalized(), Pagination::new(1, 100));
        assert_eq!(Pagination::new(2, 0).limit, 1);
    }

    #[test]
    fn test_deserialize_missing_fields() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p, Pagination::default());
    }
}
