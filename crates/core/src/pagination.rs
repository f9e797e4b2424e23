//! Pagination envelope for list endpoints
//!
//! Every list endpoint accepts `?page=` (>= 1, default 1) and `?limit=`
//! (1..=100, default 10) and responds with `{data, pagination}` where the
//! pagination block carries page counters and hypermedia links.

use serde::{Deserialize, Serialize};

use crate::error::NewsflowError;

/// Default number of items per page
pub const DEFAULT_LIMIT: usize = 10;

/// Maximum number of items per page
pub const MAX_LIMIT: usize = 100;

/// Validated page/limit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageParams {
    /// Parse optional raw query values, rejecting out-of-range input
    ///
    /// # Errors
    /// Returns `BadInput` when `page < 1` or `limit` is outside 1..=100.
    pub fn parse(page: Option<usize>, limit: Option<usize>) -> Result<Self, NewsflowError> {
        let page = page.unwrap_or(1);
        if page < 1 {
            return Err(NewsflowError::BadInput("page must be >= 1".to_string()));
        }

        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if limit < 1 || limit > MAX_LIMIT {
            return Err(NewsflowError::BadInput(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }

        Ok(Self { page, limit })
    }

    /// Zero-based offset of the first item on this page
    pub fn offset(&self) -> usize {
        (self.page - 1) * self.limit
    }
}

/// Hypermedia links for page navigation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationLinks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

/// Pagination metadata block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub limit: usize,
    pub has_next: bool,
    pub has_prev: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_page: Option<usize>,
    pub links: PaginationLinks,
}

/// Paginated response wrapper for list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PaginationInfo,
}

impl<T> Paginated<T> {
    /// Assemble a page response from the current window and total count
    ///
    /// # Arguments
    /// * `data` - Items in the current page (already sliced)
    /// * `total_count` - Total matching items before pagination
    /// * `params` - Validated page parameters
    /// * `base_url` - Path used to build hypermedia links
    pub fn new(data: Vec<T>, total_count: usize, params: PageParams, base_url: &str) -> Self {
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + params.limit - 1) / params.limit
        };
        let has_next = params.page < total_pages;
        let has_prev = params.page > 1 && total_count > 0;

        let link = |page: usize| format!("{}?page={}&limit={}", base_url, page, params.limit);

        let links = PaginationLinks {
            first: (total_count > 0).then(|| link(1)),
            last: (total_count > 0).then(|| link(total_pages)),
            next: has_next.then(|| link(params.page + 1)),
            prev: has_prev.then(|| link(params.page - 1)),
        };

        Self {
            data,
            pagination: PaginationInfo {
                current_page: params.page,
                total_pages,
                total_count,
                limit: params.limit,
                has_next,
                has_prev,
                next_page: has_next.then(|| params.page + 1),
                prev_page: has_prev.then(|| params.page - 1),
                links,
            },
        }
    }

    /// Slice a full result set down to the requested window, then wrap it
    pub fn from_full(all: Vec<T>, params: PageParams, base_url: &str) -> Self {
        let total = all.len();
        let start = params.offset().min(total);
        let end = (start + params.limit).min(total);
        let window = all.into_iter().skip(start).take(end - start).collect();
        Self::new(window, total, params, base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let params = PageParams::parse(None, None).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, DEFAULT_LIMIT);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(PageParams::parse(Some(0), None).is_err());
        assert!(PageParams::parse(None, Some(0)).is_err());
        assert!(PageParams::parse(None, Some(MAX_LIMIT + 1)).is_err());
        assert!(PageParams::parse(Some(3), Some(MAX_LIMIT)).is_ok());
    }

    #[test]
    fn test_offset_computation() {
        let params = PageParams { page: 3, limit: 25 };
        assert_eq!(params.offset(), 50);
    }

    #[test]
    fn test_envelope_counters() {
        let params = PageParams { page: 2, limit: 10 };
        let page = Paginated::new(vec![1, 2, 3], 23, params, "/api/news");

        assert_eq!(page.pagination.current_page, 2);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.total_count, 23);
        assert!(page.pagination.has_next);
        assert!(page.pagination.has_prev);
        assert_eq!(page.pagination.next_page, Some(3));
        assert_eq!(page.pagination.prev_page, Some(1));
        assert_eq!(
            page.pagination.links.next.as_deref(),
            Some("/api/news?page=3&limit=10")
        );
        assert_eq!(
            page.pagination.links.last.as_deref(),
            Some("/api/news?page=3&limit=10")
        );
    }

    #[test]
    fn test_envelope_empty_result() {
        let params = PageParams::default();
        let page: Paginated<i32> = Paginated::new(vec![], 0, params, "/api/news");

        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next);
        assert!(!page.pagination.has_prev);
        assert!(page.pagination.links.first.is_none());
        assert!(page.pagination.next_page.is_none());
    }

    #[test]
    fn test_from_full_slices_window() {
        let params = PageParams { page: 2, limit: 3 };
        let page = Paginated::from_full((1..=8).collect(), params, "/items");

        assert_eq!(page.data, vec![4, 5, 6]);
        assert_eq!(page.pagination.total_count, 8);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.data.len() <= params.limit);
    }

    #[test]
    fn test_from_full_past_end() {
        let params = PageParams { page: 5, limit: 10 };
        let page = Paginated::from_full(vec![1, 2, 3], params, "/items");
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total_count, 3);
    }

    #[test]
    fn test_envelope_serialization_is_camel_case() {
        let page = Paginated::new(vec![1], 1, PageParams::default(), "/items");
        let json = serde_json::to_value(&page).unwrap();
        let pagination = json.get("pagination").unwrap();
        assert!(pagination.get("currentPage").is_some());
        assert!(pagination.get("totalPages").is_some());
        assert!(pagination.get("hasNext").is_some());
    }
}
