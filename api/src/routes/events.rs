//! Event check-in endpoints: QR token issuance/deactivation for organizers
//! and token redemption (or manual, attributed check-in) for attendees.

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::{DateTime, Utc};
use db::models::event;
use sea_orm::EntityTrait;
use serde::Deserialize;
use services::error::EngineError;
use services::event_checkin::{self, RedeemOutcome, RedeemRequest};
use util::config::AppConfig;
use util::state::AppState;

use crate::auth::claims::{AuthUser, Role};
use crate::auth::guards::{allow_authenticated, allow_faculty_or_admin};
use crate::response::{ApiResponse, Empty};
use crate::routes::common::{error_response, map_engine_error};

/// Builds the `/events` route group. Token management is restricted to
/// faculty and admins; check-in is open to any authenticated caller.
pub fn event_routes() -> Router<AppState> {
    let manage = Router::new()
        .route(
            "/{event_id}/qr",
            post(issue_qr_token).delete(deactivate_qr_token),
        )
        .route_layer(from_fn(allow_faculty_or_admin));

    let check_in = Router::new()
        .route("/{event_id}/check-in", post(event_check_in))
        .route_layer(from_fn(allow_authenticated));

    manage.merge(check_in)
}

async fn load_event(
    state: &AppState,
    event_id: i64,
) -> Result<event::Model, EngineError> {
    event::Entity::find_by_id(event_id)
        .one(state.db())
        .await?
        .ok_or(EngineError::NotFound("event"))
}

#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    /// Defaults to the event's end; always capped by it.
    pub expires_at: Option<DateTime<Utc>>,
}

/// POST /events/{event_id}/qr
///
/// Issues a fresh signed token and records its window on the event, which
/// strands every previously issued token.
async fn issue_qr_token(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(body): Json<IssueTokenRequest>,
) -> Response {
    let event = match load_event(&state, event_id).await {
        Ok(event) => event,
        Err(err) => return map_engine_error(err),
    };

    let secret = AppConfig::global().qr_token_secret.clone();
    match event_checkin::issue(state.db(), &secret, &event, body.expires_at, Utc::now()).await {
        Ok(issued) => {
            tracing::info!(event_id, expires_at = %issued.expires_at, "issued check-in token");
            Json(ApiResponse::success(issued, "Check-in token issued")).into_response()
        }
        Err(err) => map_engine_error(err),
    }
}

/// DELETE /events/{event_id}/qr
///
/// Disables the current token window without issuing a new one.
async fn deactivate_qr_token(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Response {
    let event = match load_event(&state, event_id).await {
        Ok(event) => event,
        Err(err) => return map_engine_error(err),
    };

    match event.deactivate_qr(state.db()).await {
        Ok(_) => Json(ApiResponse::success(Empty, "Check-in token deactivated")).into_response(),
        Err(err) => map_engine_error(err.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventCheckInRequest {
    /// Required for self check-in; ignored for manual check-ins.
    pub token: Option<String>,
    /// Present when faculty checks someone else in.
    pub subject_id: Option<i64>,
    /// Caller's department per the identity provider, for eligibility.
    pub department_id: Option<i64>,
    pub notes: Option<String>,
}

/// POST /events/{event_id}/check-in
///
/// Self check-in redeems a token against the event's recorded window; a
/// faculty caller naming another subject performs a manual, attributed
/// check-in instead. At most one attendance per `(event, subject)` ever
/// exists; a repeat is answered as already recorded, not as an error.
async fn event_check_in(
    State(state): State<AppState>,
    Extension(AuthUser(claims)): Extension<AuthUser>,
    Path(event_id): Path<i64>,
    Json(body): Json<EventCheckInRequest>,
) -> Response {
    let (subject_id, agent) = match claims.role {
        Role::Student => {
            if body.subject_id.is_some_and(|id| id != claims.sub) {
                return error_response(
                    StatusCode::FORBIDDEN,
                    "Students can only check themselves in",
                );
            }
            (claims.sub, None)
        }
        Role::Faculty | Role::Admin => match body.subject_id {
            Some(target) if target != claims.sub => (target, Some(claims.sub)),
            _ => (claims.sub, None),
        },
    };

    let request = RedeemRequest {
        event_id,
        subject_id,
        department_id: body.department_id,
        token: body.token.as_deref(),
        agent,
        notes: body.notes.as_deref(),
    };

    let secret = AppConfig::global().qr_token_secret.clone();
    match event_checkin::redeem(state.db(), &secret, &request, Utc::now()).await {
        Ok(RedeemOutcome::Attended(row)) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(row, "Checked in")),
        )
            .into_response(),
        Ok(RedeemOutcome::AlreadyAttended) => {
            Json(ApiResponse::success(Empty, "Attendance already recorded")).into_response()
        }
        Err(err) => map_engine_error(err),
    }
}
