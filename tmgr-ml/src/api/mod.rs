//! HTTP API for tmgr-ml

pub mod feedback;
pub mod health;
pub mod runs;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tmgr_common::Error;

/// Maps the common error taxonomy onto HTTP responses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            // The trainer is an upstream dependency of this service
            Error::ExecutionFailure(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_for(err: Error) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn error_variants_map_to_status_codes() {
        assert_eq!(
            status_for(Error::NotFound("run 9".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(Error::InvalidInput("bad rate".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(Error::ExecutionFailure("trainer died".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(Error::ParseFailure("bad payload".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(Error::Internal("broken".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
