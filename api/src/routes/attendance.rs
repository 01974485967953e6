//! Attendance endpoints.
//!
//! `POST /attendance/mark` feeds a claim through the decision engine;
//! the verify/reject pair under `/attendance/{id}/{checkpoint}/...` is the
//! admin verification surface for individual check-in/check-out sub-records.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, header},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{post, put},
};
use chrono::Utc;
use db::models::attendance_record::{self, Channel, Checkpoint};
use sea_orm::EntityTrait;
use serde::Deserialize;
use services::attendance::{self, AttendanceClaim, Decision, DecisionPolicy};
use services::network::{self, NetworkPolicy, RequestMeta};
use services::schedule::SubjectRole;
use services::verification;
use util::state::AppState;

use crate::auth::claims::{AuthUser, Role};
use crate::auth::guards::{allow_admin, allow_authenticated};
use crate::response::ApiResponse;
use crate::routes::common::{error_response, map_engine_error};

/// Builds the `/attendance` route group. Marking requires any authenticated
/// caller; checkpoint verification is admin-only.
pub fn attendance_routes() -> Router<AppState> {
    let mark = Router::new()
        .route("/mark", post(mark_attendance))
        .route("/{record_id}/check-out", post(mark_check_out))
        .route_layer(from_fn(allow_authenticated));

    let admin = Router::new()
        .route("/{record_id}/{checkpoint}/verify", put(verify_checkpoint))
        .route("/{record_id}/{checkpoint}/reject", put(reject_checkpoint))
        .route_layer(from_fn(allow_admin));

    mark.merge(admin)
}

#[derive(Debug, Deserialize)]
pub struct MarkAttendanceRequest {
    /// `face_recognition` or `proxy`.
    pub channel: String,
    /// Required for the proxy channel: the student being marked.
    pub subject_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
}

/// POST /attendance/mark
///
/// Runs the full decision ladder: network trust, duplicate guard, schedule
/// match, geofence, lateness. Accepted claims answer `201` with one record
/// per matched schedule; rejections carry the engine's reason.
async fn mark_attendance(
    State(state): State<AppState>,
    Extension(AuthUser(claims)): Extension<AuthUser>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<MarkAttendanceRequest>,
) -> Response {
    let channel: Channel = match body.channel.parse() {
        Ok(channel) => channel,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Unknown attendance channel '{}'", body.channel),
            );
        }
    };

    let (subject_id, role, marked_by) = match channel {
        Channel::Proxy => {
            if claims.role == Role::Student {
                return error_response(
                    StatusCode::FORBIDDEN,
                    "Students cannot mark attendance on behalf of others",
                );
            }
            let Some(target) = body.subject_id else {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "Proxy marking requires a subject id",
                );
            };
            (target, SubjectRole::Student, Some(claims.sub))
        }
        Channel::FaceRecognition => {
            let role = match claims.role {
                Role::Faculty => SubjectRole::Faculty,
                _ => SubjectRole::Student,
            };
            (claims.sub, role, None)
        }
    };

    let location = match (body.latitude, body.longitude) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    };

    let meta = request_meta(addr, &headers, location.map(|(_, lon)| lon));
    let trust = network::assess(&NetworkPolicy::from_config(), &meta);
    tracing::debug!(
        subject_id,
        on_allowed_network = trust.on_allowed_network,
        proxy_suspected = trust.proxy_suspected,
        fingerprint = ?trust.fingerprint,
        "assessed attendance claim origin"
    );

    let claim = AttendanceClaim {
        subject_id,
        role,
        channel,
        taken_at: Utc::now(),
        location,
        confidence: body.confidence,
        marked_by,
        notes: body.notes,
    };

    let outcome = match attendance::decide(
        state.db(),
        state.notifier(),
        &DecisionPolicy::from_config(),
        &claim,
        &trust,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => return map_engine_error(err),
    };

    let status = StatusCode::from_u16(outcome.decision.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match outcome.decision {
        Decision::Accepted { records } => (
            status,
            Json(ApiResponse::success(records, "Attendance recorded")),
        )
            .into_response(),
        Decision::NetworkUntrusted { factors } if !factors.is_empty() => error_response(
            status,
            format!("Request origin is not trusted: {}", factors.join("; ")),
        ),
        other => error_response(status, other.reason()),
    }
}

/// POST /attendance/{record_id}/check-out
///
/// Records a check-out time on an existing record, putting that sub-record
/// into Pending for later admin verification. Students may only check out
/// their own records; a second check-out is an invalid transition.
async fn mark_check_out(
    State(state): State<AppState>,
    Extension(AuthUser(claims)): Extension<AuthUser>,
    Path(record_id): Path<i64>,
) -> Response {
    let record = match attendance_record::Entity::find_by_id(record_id)
        .one(state.db())
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "attendance record not found"),
        Err(err) => return map_engine_error(err.into()),
    };
    if claims.role == Role::Student && record.subject_id != claims.sub {
        return error_response(
            StatusCode::FORBIDDEN,
            "Students can only check out their own attendance",
        );
    }

    match verification::mark_checkpoint(state.db(), record_id, Checkpoint::CheckOut, Utc::now())
        .await
    {
        Ok(record) => {
            Json(ApiResponse::success(record, "check_out recorded")).into_response()
        }
        Err(err) => map_engine_error(err),
    }
}

/// PUT /attendance/{record_id}/{checkpoint}/verify
///
/// Admin confirmation of a pending check-in or check-out. Verifying an
/// already verified sub-record is a no-op.
async fn verify_checkpoint(
    State(state): State<AppState>,
    Extension(AuthUser(claims)): Extension<AuthUser>,
    Path((record_id, checkpoint)): Path<(i64, String)>,
) -> Response {
    let Ok(checkpoint) = checkpoint.parse::<Checkpoint>() else {
        return error_response(StatusCode::BAD_REQUEST, "Unknown checkpoint");
    };

    match verification::verify_checkpoint(state.db(), record_id, checkpoint, claims.sub, Utc::now())
        .await
    {
        Ok(record) => {
            Json(ApiResponse::success(record, format!("{checkpoint} verified"))).into_response()
        }
        Err(err) => map_engine_error(err),
    }
}

/// PUT /attendance/{record_id}/{checkpoint}/reject
///
/// Clears the sub-record; rejecting a check-in also clears the check-out.
async fn reject_checkpoint(
    State(state): State<AppState>,
    Path((record_id, checkpoint)): Path<(i64, String)>,
) -> Response {
    let Ok(checkpoint) = checkpoint.parse::<Checkpoint>() else {
        return error_response(StatusCode::BAD_REQUEST, "Unknown checkpoint");
    };

    match verification::reject_checkpoint(state.db(), record_id, checkpoint, Utc::now()).await {
        Ok(record) => {
            Json(ApiResponse::success(record, format!("{checkpoint} rejected"))).into_response()
        }
        Err(err) => map_engine_error(err),
    }
}

/// Collapses the raw request into the metadata the network assessor inspects.
/// Axum header names are already lowercase.
fn request_meta(addr: SocketAddr, headers: &HeaderMap, longitude: Option<f64>) -> RequestMeta {
    let mut header_map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            header_map.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let header_str =
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

    RequestMeta {
        ip: Some(addr.ip()),
        remote_port: Some(addr.port()),
        headers: header_map,
        hostname: header_str("x-client-hostname"),
        declared_utc_offset: headers
            .get("x-client-utc-offset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()),
        longitude,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}
