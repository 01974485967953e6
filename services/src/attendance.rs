//! The attendance decision engine.
//!
//! Takes one unvalidated claim plus a network trust assessment and produces a
//! single decision: accepted (with one persisted record per active schedule)
//! or one of three rejections. Every suspicious step leaves an advisory
//! [`IntegrityFlag`] behind; flags are broadcast fire-and-forget and also
//! handed back to the caller.

use chrono::{DateTime, Duration, Utc};
use db::models::attendance_record::{self, Channel, Status};
use sea_orm::DatabaseConnection;
use util::config::AppConfig;
use util::notify::Notifier;

use crate::error::EngineError;
use crate::flags::{self, FlagKind, IntegrityFlag};
use crate::geo;
use crate::network::TrustAssessment;
use crate::schedule::{self, SubjectRole};

/// Deployment-tunable thresholds. Always injected; the engine never reads
/// configuration mid-decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    pub duplicate_window_minutes: i64,
    pub geofence_radius_meters: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            duplicate_window_minutes: 5,
            geofence_radius_meters: 100.0,
        }
    }
}

impl DecisionPolicy {
    pub fn from_config() -> Self {
        let cfg = AppConfig::global();
        Self {
            duplicate_window_minutes: cfg.duplicate_window_minutes as i64,
            geofence_radius_meters: cfg.geofence_radius_meters,
        }
    }
}

/// An unvalidated attendance submission. `taken_at` is supplied by the
/// caller, which keeps the clock injectable.
#[derive(Debug, Clone)]
pub struct AttendanceClaim {
    pub subject_id: i64,
    pub role: SubjectRole,
    pub channel: Channel,
    pub taken_at: DateTime<Utc>,
    pub location: Option<(f64, f64)>,
    /// Required for the face-recognition channel.
    pub confidence: Option<f64>,
    /// Required for the proxy channel: the faculty member marking on the
    /// subject's behalf.
    pub marked_by: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug)]
pub enum Decision {
    Accepted {
        records: Vec<attendance_record::Model>,
    },
    NetworkUntrusted {
        factors: Vec<String>,
    },
    Duplicate,
    NoActiveSchedule,
}

impl Decision {
    /// Status codes kept compatible with the original service.
    pub fn http_status(&self) -> u16 {
        match self {
            Decision::Accepted { .. } => 201,
            Decision::NetworkUntrusted { .. } => 403,
            Decision::Duplicate => 400,
            Decision::NoActiveSchedule => 400,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Decision::Accepted { .. } => "Attendance recorded",
            Decision::NetworkUntrusted { .. } => "Request origin is not trusted",
            Decision::Duplicate => "Attendance already submitted recently",
            Decision::NoActiveSchedule => "No active schedule at this time",
        }
    }
}

/// A decision plus the flags it raised (already broadcast by the time the
/// caller sees them).
#[derive(Debug)]
pub struct Outcome {
    pub decision: Decision,
    pub flags: Vec<IntegrityFlag>,
}

/// True when the subject already has a record inside the trailing duplicate
/// window. A store query rather than a cache so it holds across instances;
/// the narrow check-then-insert race is a documented limitation.
pub async fn recent_submission_exists(
    db: &DatabaseConnection,
    subject_id: i64,
    now: DateTime<Utc>,
    window_minutes: i64,
) -> Result<bool, EngineError> {
    let since = now - Duration::minutes(window_minutes);
    Ok(attendance_record::Model::exists_since(db, subject_id, since).await?)
}

/// Runs the full decision ladder. Steps short-circuit in order: network
/// membership, proxy suspicion, duplicate guard, schedule match. Geofence
/// distance never rejects; it only flags.
pub async fn decide(
    db: &DatabaseConnection,
    notifier: &Notifier,
    policy: &DecisionPolicy,
    claim: &AttendanceClaim,
    trust: &TrustAssessment,
) -> Result<Outcome, EngineError> {
    validate_channel(claim)?;

    let now = claim.taken_at;
    let mut raised: Vec<IntegrityFlag> = Vec::new();

    // 1. Allow-list membership is the one hard network signal.
    if !trust.on_allowed_network {
        tracing::info!(
            subject_id = claim.subject_id,
            ip = ?trust.ip,
            "attendance claim from outside the allowed network"
        );
        return finish(notifier, Decision::NetworkUntrusted { factors: vec![] }, raised).await;
    }

    // 2. Proxy heuristics share the rejection code but keep their factors
    //    and leave an audit flag.
    if trust.proxy_suspected {
        raised.push(IntegrityFlag::new(
            FlagKind::ProxyAttempt,
            claim.subject_id,
            None,
            format!("proxy indicators: {}", trust.factors.join("; ")),
            now,
        ));
        let factors = trust.factors.clone();
        return finish(notifier, Decision::NetworkUntrusted { factors }, raised).await;
    }

    // 3. Duplicate guard.
    if recent_submission_exists(db, claim.subject_id, now, policy.duplicate_window_minutes).await? {
        raised.push(IntegrityFlag::new(
            FlagKind::RapidAttempt,
            claim.subject_id,
            None,
            format!(
                "repeat submission within {} minutes",
                policy.duplicate_window_minutes
            ),
            now,
        ));
        return finish(notifier, Decision::Duplicate, raised).await;
    }

    // 4. Schedule match. No active schedule is itself treated as a fraud signal.
    let active = schedule::active_schedules_for(db, claim.subject_id, claim.role, now).await?;
    if active.is_empty() {
        raised.push(IntegrityFlag::new(
            FlagKind::ProxyAttempt,
            claim.subject_id,
            None,
            "attendance claim with no active schedule",
            now,
        ));
        return finish(notifier, Decision::NoActiveSchedule, raised).await;
    }

    // 5. Geofence: advisory only. Indoor GPS drift makes this signal too
    //    noisy to auto-block on.
    if let Some((lat, lon)) = claim.location.filter(|&(lat, lon)| !geo::is_unknown(lat, lon)) {
        for sched in &active {
            if let Some((slat, slon)) = sched.location() {
                let dist = geo::distance_meters(lat, lon, slat, slon);
                if dist > policy.geofence_radius_meters {
                    raised.push(IntegrityFlag::new(
                        FlagKind::LocationMismatch,
                        claim.subject_id,
                        Some(sched.id),
                        format!(
                            "claimed location {:.0} m from '{}' (limit {:.0} m)",
                            dist, sched.name, policy.geofence_radius_meters
                        ),
                        now,
                    ));
                }
            }
        }
    }

    // 6. Classify and persist one record per active schedule.
    let mut records = Vec::with_capacity(active.len());
    for sched in &active {
        let status = if sched.is_late(now) {
            raised.push(IntegrityFlag::new(
                FlagKind::LateAttendance,
                claim.subject_id,
                Some(sched.id),
                format!("late arrival for '{}'", sched.name),
                now,
            ));
            Status::Late
        } else {
            Status::Present
        };

        let record = attendance_record::Model::create(
            db,
            claim.subject_id,
            claim.channel,
            status,
            Some(sched.id),
            claim.confidence,
            claim.marked_by,
            claim.location,
            now,
            claim.notes.as_deref(),
        )
        .await?;
        records.push(record);
    }

    finish(notifier, Decision::Accepted { records }, raised).await
}

fn validate_channel(claim: &AttendanceClaim) -> Result<(), EngineError> {
    match claim.channel {
        Channel::FaceRecognition if claim.confidence.is_none() => Err(EngineError::InvalidArgument(
            "face-recognition claims require a confidence score".into(),
        )),
        Channel::Proxy if claim.marked_by.is_none() => Err(EngineError::InvalidArgument(
            "proxy claims require a marking agent".into(),
        )),
        _ => Ok(()),
    }
}

async fn finish(
    notifier: &Notifier,
    decision: Decision,
    flags: Vec<IntegrityFlag>,
) -> Result<Outcome, EngineError> {
    // best-effort delivery; never blocks or fails the decision
    flags::emit_all(notifier, &flags).await;
    Ok(Outcome { decision, flags })
}
