//! Shared helpers for translating service-layer results into HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use services::error::EngineError;

use crate::response::{ApiResponse, Empty};

/// Builds a standard error response with the given status and message.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<Empty>::error(message))).into_response()
}

/// Maps an [`EngineError`] onto the HTTP status space. Database failures are
/// logged and reported as opaque 500s; everything else is a client error.
pub fn map_engine_error(err: EngineError) -> Response {
    match err {
        EngineError::NotFound(what) => {
            error_response(StatusCode::NOT_FOUND, format!("{what} not found"))
        }
        EngineError::InvalidArgument(message) => error_response(StatusCode::BAD_REQUEST, message),
        EngineError::InvalidToken => error_response(
            StatusCode::BAD_REQUEST,
            "Invalid or expired check-in token",
        ),
        EngineError::Db(err) => {
            tracing::error!(error = %err, "database error while handling request");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
