//! API route handlers

pub mod admin;
pub mod metadata;
pub mod news;
pub mod user;

use serde::Deserialize;

use newsflow_core::{PageParams, Paginated};

use crate::error::ApiError;

/// Common pagination query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    /// Validate into [`PageParams`], surfacing 400 on out-of-range input
    pub fn validate(self) -> Result<PageParams, ApiError> {
        PageParams::parse(self.page, self.limit).map_err(ApiError)
    }
}

/// Serialize a paginated envelope and graft extra top-level fields onto it
pub fn envelope_with_extras<T: serde::Serialize>(
    page: Paginated<T>,
    extras: &[(&str, serde_json::Value)],
) -> serde_json::Value {
    let mut body = serde_json::to_value(page).unwrap_or_default();
    if let Some(object) = body.as_object_mut() {
        for (key, value) in extras {
            object.insert((*key).to_string(), value.clone());
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_defaults() {
        let params = PageQuery::default().validate().unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, 10);
    }

    #[test]
    fn test_page_query_rejects_out_of_range() {
        let query = PageQuery {
            page: Some(0),
            limit: None,
        };
        assert!(query.validate().is_err());

        let query = PageQuery {
            page: Some(1),
            limit: Some(500),
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_envelope_with_extras() {
        let page = Paginated::new(vec![1, 2], 2, PageParams::default(), "/x");
        let body = envelope_with_extras(page, &[("cached", serde_json::json!(true))]);
        assert_eq!(body["cached"], true);
        assert!(body["pagination"]["totalCount"].is_number());
    }
}
