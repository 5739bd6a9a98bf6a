//! Error responses

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use clipscope_core::{Error, ErrorKind};
use tracing::{error, warn};

/// Handler error rendered as `{"error": message}`
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Load | ErrorKind::Prediction | ErrorKind::Config | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.0.kind().as_str();

        metrics::counter!("clipscope_errors_total", "kind" => kind).increment(1);
        if status.is_server_error() {
            error!("Request failed ({}): {}", kind, self.0);
        } else {
            warn!("Request rejected ({}): {}", kind, self.0);
        }

        (
            status,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(Error::validation("x")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError(Error::not_found("x")).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError(Error::load("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError(Error::prediction("x")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
