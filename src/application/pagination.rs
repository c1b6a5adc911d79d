//! Shared offset pagination helpers.
//!
//! Page tokens are opaque to clients but are plain decimal offsets on the
//! wire. A page is fetched with one extra row to learn whether another page
//! follows.

use longbox_api_types::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("page_size must be between 1 and {max}, got {got}")]
    InvalidPageSize { got: u32, max: u32 },
    #[error("invalid page_token `{0}`")]
    InvalidPageToken(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(offset: u64, limit: u32) -> Self {
        Self { offset, limit }
    }

    /// Validate raw query parameters.
    pub fn parse(page_size: Option<u32>, page_token: Option<&str>) -> Result<Self, PaginationError> {
        let limit = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(PaginationError::InvalidPageSize {
                got: limit,
                max: MAX_PAGE_SIZE,
            });
        }

        let offset = match page_token.map(str::trim) {
            None | Some("") => 0,
            Some(token) => token
                .parse::<u64>()
                .map_err(|_| PaginationError::InvalidPageToken(token.to_string()))?,
        };

        Ok(Self { offset, limit })
    }

    /// Rows to request from storage: one past the page to detect a next page.
    pub fn fetch_limit(&self) -> i64 {
        i64::from(self.limit) + 1
    }

    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }
}

/// Offset page result.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_offset: Option<u64>,
}

impl<T> Page<T> {
    /// Build a page from a window fetched with [`PageRequest::fetch_limit`].
    pub fn from_window(mut rows: Vec<T>, request: PageRequest) -> Self {
        let limit = request.limit as usize;
        let next_offset = if rows.len() > limit {
            rows.truncate(limit);
            Some(request.offset + u64::from(request.limit))
        } else {
            None
        };
        Self {
            items: rows,
            next_offset,
        }
    }

    pub fn next_page_token(&self) -> Option<String> {
        self.next_offset.map(|offset| offset.to_string())
    }
}
