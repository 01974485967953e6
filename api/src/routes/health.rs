use axum::{Json, Router, response::IntoResponse, routing::get};
use util::state::AppState;

use crate::response::ApiResponse;

/// Builds the `/health` route group: a single unauthenticated `GET /health`
/// for uptime probes and load balancers.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

/// GET /health
///
/// Returns a simple success response to indicate the API is running.
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::success("OK", "Health check passed"))
}

#[cfg(test)]
mod tests {
    use super::health_check;
    use axum::body::to_bytes;
    use axum::response::IntoResponse;
    use serde_json::Value;

    #[tokio::test]
    async fn health_check_reports_success() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), 200);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "OK");
    }
}
