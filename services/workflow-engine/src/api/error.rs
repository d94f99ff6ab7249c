use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use redress_utils::{ErrorResponse, RedressError};

/// `RedressError` rendered as a JSON `ErrorResponse` with the matching status.
#[derive(Debug)]
pub struct ApiError(pub RedressError);

impl From<RedressError> for ApiError {
    fn from(error: RedressError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = self.0.error_code(), error = %self.0, "Request failed");
        } else {
            tracing::debug!(code = self.0.error_code(), error = %self.0, "Request rejected");
        }
        (status, Json(ErrorResponse::from(self.0))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
