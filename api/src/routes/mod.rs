//! HTTP route entry point for `/api/...`.
//!
//! Route groups:
//! - `/health` → Health check endpoint (public)
//! - `/attendance` → Claim marking (authenticated) and checkpoint
//!   verification (admin-only)
//! - `/events` → QR token management (faculty/admin) and check-in
//!   (authenticated)

use axum::Router;
use util::state::AppState;

pub mod attendance;
pub mod common;
pub mod events;
pub mod health;

/// Builds the complete application router. Access control is applied per
/// route group inside each module.
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .nest("/health", health::health_routes())
        .nest("/attendance", attendance::attendance_routes())
        .nest("/events", events::event_routes())
        .with_state(app_state)
}
