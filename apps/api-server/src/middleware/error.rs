//! Error handling - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use moodwell_core::CacheError;
use moodwell_shared::ErrorResponse;
use thiserror::Error;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::NotFound(detail) => ErrorResponse::not_found(detail),
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::Unauthorized => ErrorResponse::unauthorized(),
            AppError::ServiceUnavailable(detail) => ErrorResponse::service_unavailable(detail),
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::InvalidPattern(e) => AppError::BadRequest(format!("Invalid pattern: {}", e)),
            CacheError::Store(e) => {
                tracing::error!("Cache store error: {}", e);
                AppError::ServiceUnavailable("Cache store unavailable".to_string())
            }
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use moodwell_core::ports::StoreError;

    #[test]
    fn test_cache_errors_map_to_statuses() {
        let err: AppError = CacheError::Store(StoreError::Connection("refused".into())).into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let regex_err = regex::Regex::new("(").unwrap_err();
        let err: AppError = CacheError::InvalidPattern(regex_err).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_body_is_problem_json() {
        let res = AppError::Unauthorized.error_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_variant_statuses() {
        let cases = [
            (AppError::NotFound("x".into()), 404),
            (AppError::BadRequest("x".into()), 400),
            (AppError::Unauthorized, 401),
            (AppError::ServiceUnavailable("x".into()), 503),
        ];
        for (err, status) in cases {
            assert_eq!(err.error_response().status().as_u16(), status);
        }
    }
}
