//! Offset pagination for list endpoints.

use serde::Deserialize;
use utoipa::IntoParams;

/// Default number of items to return per page.
pub const DEFAULT_LIMIT: i64 = 100;

/// Maximum number of items that can be requested per page.
pub const MAX_LIMIT: i64 = 1000;

/// `skip` and `limit` query parameters. The limit is clamped between 1 and [`MAX_LIMIT`].
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct Pagination {
    /// Number of items to skip (default: 0)
    #[param(default = 0, minimum = 0)]
    pub skip: Option<i64>,

    /// Maximum number of items to return (default: 100, max: 1000)
    #[param(default = 100, minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
}

impl Pagination {
    #[inline]
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0).max(0)
    }

    #[inline]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}
