//! HTTP error translation
//!
//! Maps the platform error taxonomy onto status codes: missing records are
//! 404, invalid input is 400, transport failures are 500. Degraded results
//! (similarity fallback, general-feed fallback) never reach this path; they
//! are served as 200 with a tagged method.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use newsflow_core::NewsflowError;

/// Wrapper turning [`NewsflowError`] into an HTTP response
#[derive(Debug)]
pub struct ApiError(pub NewsflowError);

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<NewsflowError> for ApiError {
    fn from(err: NewsflowError) -> Self {
        Self(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            NewsflowError::NotFound(_) => StatusCode::NOT_FOUND,
            NewsflowError::BadInput(_) => StatusCode::BAD_REQUEST,
            NewsflowError::IndexUnavailable(_)
            | NewsflowError::StoreUnavailable(_)
            | NewsflowError::Embedding(_)
            | NewsflowError::FatalCache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.0.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError(NewsflowError::NotFound("article".into()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let bad_input = ApiError(NewsflowError::BadInput("page".into()));
        assert_eq!(bad_input.status_code(), StatusCode::BAD_REQUEST);

        let unavailable = ApiError(NewsflowError::IndexUnavailable("down".into()));
        assert_eq!(unavailable.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let fatal = ApiError(NewsflowError::FatalCache("broken".into()));
        assert_eq!(fatal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
