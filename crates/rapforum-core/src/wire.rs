//! Wire types shared with the forum backend.
//!
//! Every response body is an [`ApiResponse`] envelope; `code == 200` is the
//! only success value.

use serde::{Deserialize, Serialize};

/// Application code meaning success.
pub const CODE_OK: i64 = 200;
/// Application code meaning the session is no longer valid.
pub const CODE_UNAUTHORIZED: i64 = 401;

/// Response envelope returned by every backend endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T = serde_json::Value> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK,
            message: "ok".to_string(),
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_OK
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == CODE_UNAUTHORIZED
    }
}

/// Pagination query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl PageParams {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size,
        }
    }

    /// Parameters for the following page.
    pub fn next(self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData<T> {
    pub list: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> PageData<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}
