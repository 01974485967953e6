//! Signed, time-boxed QR tokens for unattended event check-ins.
//!
//! A token is a self-contained HMAC-SHA256 credential: `hex(payload).hex(mac)`
//! where the payload carries the event id, issuance time, expiry and a random
//! nonce. Validation is stateless; what prevents a shared QR image from
//! granting extra attendances is the composite-key uniqueness on
//! `event_attendances`, plus the event's recorded token window (reissuing or
//! deactivating the window strands every previously issued token).

use chrono::{DateTime, Utc};
use db::models::{event, event_attendance, event_department, event_participant};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::EngineError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TokenPayload {
    event_id: i64,
    issued_at: i64,
    expires_at: i64,
    nonce: String,
}

/// A freshly issued token plus the expiry recorded on the event.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// What a redemption attempt produced. `AlreadyAttended` is an expected
/// outcome, not an error: the constraint fired, the subject is covered.
#[derive(Debug)]
pub enum RedeemOutcome {
    Attended(event_attendance::Model),
    AlreadyAttended,
}

/// Inputs for [`redeem`]. `agent` present means a manual, attributed
/// check-in; absent means self check-in, which requires `token`.
#[derive(Debug, Clone)]
pub struct RedeemRequest<'a> {
    pub event_id: i64,
    pub subject_id: i64,
    /// Department of the subject per the identity provider, for eligibility.
    pub department_id: Option<i64>,
    pub token: Option<&'a str>,
    pub agent: Option<i64>,
    pub notes: Option<&'a str>,
}

fn sign(secret: &str, payload_hex: &str) -> Result<String, EngineError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| EngineError::InvalidArgument("empty token signing key".into()))?;
    mac.update(payload_hex.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Issues a new token for the event and records its window, invalidating all
/// previously issued tokens. `expires_at` defaults to the event's end and is
/// always capped by it.
pub async fn issue(
    db: &DatabaseConnection,
    secret: &str,
    event: &event::Model,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<IssuedToken, EngineError> {
    if !event.active {
        return Err(EngineError::InvalidArgument(
            "cannot issue a token for an inactive event".into(),
        ));
    }

    let expires_at = expires_at.unwrap_or(event.end_date).min(event.end_date);

    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let payload = TokenPayload {
        event_id: event.id,
        issued_at: now.timestamp(),
        expires_at: expires_at.timestamp(),
        nonce: hex::encode(nonce),
    };
    let payload_hex = hex::encode(
        serde_json::to_vec(&payload)
            .map_err(|e| EngineError::InvalidArgument(format!("token payload: {e}")))?,
    );
    let signature = sign(secret, &payload_hex)?;

    event.record_qr_window(db, expires_at, now).await?;

    Ok(IssuedToken {
        token: format!("{payload_hex}.{signature}"),
        expires_at,
    })
}

/// Stateless validation: signature then expiry. Malformed input, a bad
/// signature and an expired token all collapse into the same
/// [`EngineError::InvalidToken`] so callers learn nothing about which check
/// failed. Returns the event id on success.
pub fn validate(secret: &str, token: &str, now: DateTime<Utc>) -> Result<i64, EngineError> {
    decode(secret, token, now).map(|p| p.event_id)
}

fn decode(secret: &str, token: &str, now: DateTime<Utc>) -> Result<TokenPayload, EngineError> {
    let (payload_hex, signature) = token.split_once('.').ok_or(EngineError::InvalidToken)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| EngineError::InvalidToken)?;
    mac.update(payload_hex.as_bytes());
    let expected = hex::decode(signature).map_err(|_| EngineError::InvalidToken)?;
    mac.verify_slice(&expected)
        .map_err(|_| EngineError::InvalidToken)?;

    let raw = hex::decode(payload_hex).map_err(|_| EngineError::InvalidToken)?;
    let payload: TokenPayload =
        serde_json::from_slice(&raw).map_err(|_| EngineError::InvalidToken)?;

    if now.timestamp() > payload.expires_at {
        return Err(EngineError::InvalidToken);
    }
    Ok(payload)
}

/// Redeems a check-in for `(event, subject)`. At most one redemption per pair
/// ever succeeds; the composite primary key is what enforces it, and a
/// constraint violation surfaces as `AlreadyAttended`.
pub async fn redeem(
    db: &DatabaseConnection,
    secret: &str,
    req: &RedeemRequest<'_>,
    now: DateTime<Utc>,
) -> Result<RedeemOutcome, EngineError> {
    let event = event::Entity::find_by_id(req.event_id)
        .one(db)
        .await?
        .ok_or(EngineError::NotFound("event"))?;

    // Self check-in must present a token bound to this event, and the
    // event's recorded window must still accept it.
    if req.agent.is_none() {
        let token = req.token.ok_or(EngineError::InvalidToken)?;
        let payload = decode(secret, token, now)?;
        if payload.event_id != event.id {
            return Err(EngineError::InvalidToken);
        }
        if !event.qr_window_open(now) {
            return Err(EngineError::InvalidToken);
        }
        // a reissued window strands tokens minted for the old one
        if event.qr_expires_at.map(|e| e.timestamp()) != Some(payload.expires_at) {
            return Err(EngineError::InvalidToken);
        }
    }

    if !event.is_running(now) {
        return Err(EngineError::InvalidArgument(
            "event is not accepting check-ins".into(),
        ));
    }

    if !is_eligible(db, &event, req.subject_id, req.department_id).await? {
        return Err(EngineError::InvalidArgument(
            "subject is not eligible for this event".into(),
        ));
    }

    match event_attendance::Model::insert_new(
        db,
        event.id,
        req.subject_id,
        now,
        req.agent,
        req.notes,
    )
    .await
    {
        Ok(row) => Ok(RedeemOutcome::Attended(row)),
        Err(err) if is_unique_violation(&err) => Ok(RedeemOutcome::AlreadyAttended),
        Err(err) => Err(err.into()),
    }
}

async fn is_eligible(
    db: &DatabaseConnection,
    event: &event::Model,
    subject_id: i64,
    department_id: Option<i64>,
) -> Result<bool, EngineError> {
    if event.open_to_all {
        return Ok(true);
    }
    if let Some(dept) = department_id {
        if event_department::Model::is_listed(db, event.id, dept).await? {
            return Ok(true);
        }
    }
    Ok(event_participant::Model::is_listed(db, event.id, subject_id).await?)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err, DbErr::RecordNotInserted)
        || {
            let msg = err.to_string();
            msg.contains("UNIQUE constraint") || msg.contains("duplicate key")
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use db::test_utils::setup_test_db;

    const SECRET: &str = "correct horse battery staple";
    const ORGANIZER: i64 = 5;
    const SUBJECT_A: i64 = 101;
    const SUBJECT_B: i64 = 102;

    async fn seed_event(db: &DatabaseConnection, open_to_all: bool) -> event::Model {
        let now = Utc::now();
        event::Model::create(
            db,
            "Tech Week Keynote",
            ORGANIZER,
            now - Duration::hours(1),
            now + Duration::hours(3),
            open_to_all,
        )
        .await
        .unwrap()
    }

    fn self_checkin<'a>(event_id: i64, subject_id: i64, token: &'a str) -> RedeemRequest<'a> {
        RedeemRequest {
            event_id,
            subject_id,
            department_id: None,
            token: Some(token),
            agent: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn issue_records_window_and_validate_round_trips() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();

        let issued = issue(&db, SECRET, &ev, None, now).await.unwrap();
        assert_eq!(issued.expires_at, ev.end_date);
        assert_eq!(validate(SECRET, &issued.token, now).unwrap(), ev.id);

        let stored = event::Entity::find_by_id(ev.id).one(&db).await.unwrap().unwrap();
        assert!(stored.qr_active);
        assert_eq!(stored.qr_expires_at, Some(ev.end_date));
    }

    #[tokio::test]
    async fn tampered_and_malformed_tokens_are_uniformly_invalid() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();
        let issued = issue(&db, SECRET, &ev, None, now).await.unwrap();

        // flip the final signature character
        let mut tampered = issued.token.clone();
        let last = if tampered.ends_with('0') { '1' } else { '0' };
        tampered.pop();
        tampered.push(last);

        for bad in [tampered.as_str(), "garbage", "deadbeef.cafe", ""] {
            assert!(matches!(
                validate(SECRET, bad, now),
                Err(EngineError::InvalidToken)
            ));
        }

        // wrong key fails exactly the same way
        assert!(matches!(
            validate("another secret", &issued.token, now),
            Err(EngineError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_invalid_despite_correct_signature() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();

        let short = issue(&db, SECRET, &ev, Some(now + Duration::minutes(10)), now)
            .await
            .unwrap();
        assert!(validate(SECRET, &short.token, now).is_ok());

        let after = now + Duration::minutes(11);
        assert!(matches!(
            validate(SECRET, &short.token, after),
            Err(EngineError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn expiry_is_capped_at_event_end() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();

        let issued = issue(&db, SECRET, &ev, Some(ev.end_date + Duration::days(1)), now)
            .await
            .unwrap();
        assert_eq!(issued.expires_at, ev.end_date);
    }

    #[tokio::test]
    async fn same_subject_redeems_once_then_already_attended() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();
        let issued = issue(&db, SECRET, &ev, None, now).await.unwrap();

        let req = self_checkin(ev.id, SUBJECT_A, &issued.token);
        match redeem(&db, SECRET, &req, now).await.unwrap() {
            RedeemOutcome::Attended(row) => {
                assert!(row.verified);
                assert_eq!(row.checked_in_by, None);
            }
            RedeemOutcome::AlreadyAttended => panic!("first redemption must succeed"),
        }

        // replaying the very same token changes nothing
        for _ in 0..2 {
            assert!(matches!(
                redeem(&db, SECRET, &req, now).await.unwrap(),
                RedeemOutcome::AlreadyAttended
            ));
        }
    }

    #[tokio::test]
    async fn two_subjects_can_share_one_qr_image() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();
        let issued = issue(&db, SECRET, &ev, None, now).await.unwrap();

        let a = self_checkin(ev.id, SUBJECT_A, &issued.token);
        let b = self_checkin(ev.id, SUBJECT_B, &issued.token);
        assert!(matches!(
            redeem(&db, SECRET, &a, now).await.unwrap(),
            RedeemOutcome::Attended(_)
        ));
        assert!(matches!(
            redeem(&db, SECRET, &b, now).await.unwrap(),
            RedeemOutcome::Attended(_)
        ));
    }

    #[tokio::test]
    async fn token_for_one_event_does_not_open_another() {
        let db = setup_test_db().await;
        let ev_a = seed_event(&db, true).await;
        let ev_b = seed_event(&db, true).await;
        let now = Utc::now();
        let issued_a = issue(&db, SECRET, &ev_a, None, now).await.unwrap();
        issue(&db, SECRET, &ev_b, None, now).await.unwrap();

        let req = self_checkin(ev_b.id, SUBJECT_A, &issued_a.token);
        assert!(matches!(
            redeem(&db, SECRET, &req, now).await,
            Err(EngineError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn deactivating_the_window_strands_outstanding_tokens() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();
        let issued = issue(&db, SECRET, &ev, None, now).await.unwrap();

        event::Entity::find_by_id(ev.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap()
            .deactivate_qr(&db)
            .await
            .unwrap();

        let req = self_checkin(ev.id, SUBJECT_A, &issued.token);
        assert!(matches!(
            redeem(&db, SECRET, &req, now).await,
            Err(EngineError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn reissuing_with_a_new_window_strands_the_old_token() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();

        let old = issue(&db, SECRET, &ev, Some(now + Duration::minutes(30)), now)
            .await
            .unwrap();
        let ev = event::Entity::find_by_id(ev.id).one(&db).await.unwrap().unwrap();
        let fresh = issue(&db, SECRET, &ev, Some(now + Duration::minutes(60)), now)
            .await
            .unwrap();

        let stale = self_checkin(ev.id, SUBJECT_A, &old.token);
        assert!(matches!(
            redeem(&db, SECRET, &stale, now).await,
            Err(EngineError::InvalidToken)
        ));

        let current = self_checkin(ev.id, SUBJECT_A, &fresh.token);
        assert!(matches!(
            redeem(&db, SECRET, &current, now).await.unwrap(),
            RedeemOutcome::Attended(_)
        ));
    }

    #[tokio::test]
    async fn manual_checkin_is_attributed_and_needs_no_token() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;
        let now = Utc::now();

        let req = RedeemRequest {
            event_id: ev.id,
            subject_id: SUBJECT_A,
            department_id: None,
            token: None,
            agent: Some(ORGANIZER),
            notes: Some("checked in at the door"),
        };
        match redeem(&db, SECRET, &req, now).await.unwrap() {
            RedeemOutcome::Attended(row) => {
                assert_eq!(row.checked_in_by, Some(ORGANIZER));
                assert!(row.verified);
                assert_eq!(row.notes.as_deref(), Some("checked in at the door"));
            }
            RedeemOutcome::AlreadyAttended => panic!("first redemption must succeed"),
        }
    }

    #[tokio::test]
    async fn self_checkin_without_token_is_invalid() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, true).await;

        let req = RedeemRequest {
            event_id: ev.id,
            subject_id: SUBJECT_A,
            department_id: None,
            token: None,
            agent: None,
            notes: None,
        };
        assert!(matches!(
            redeem(&db, SECRET, &req, Utc::now()).await,
            Err(EngineError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn eligibility_covers_departments_and_explicit_listings() {
        let db = setup_test_db().await;
        let ev = seed_event(&db, false).await;
        let now = Utc::now();
        let issued = issue(&db, SECRET, &ev, None, now).await.unwrap();

        event_department::Model::add(&db, ev.id, 3).await.unwrap();
        event_participant::Model::add(&db, ev.id, SUBJECT_B).await.unwrap();

        // department-listed subject passes
        let mut dept_req = self_checkin(ev.id, SUBJECT_A, &issued.token);
        dept_req.department_id = Some(3);
        assert!(matches!(
            redeem(&db, SECRET, &dept_req, now).await.unwrap(),
            RedeemOutcome::Attended(_)
        ));

        // explicitly listed subject passes without a department
        let listed = self_checkin(ev.id, SUBJECT_B, &issued.token);
        assert!(matches!(
            redeem(&db, SECRET, &listed, now).await.unwrap(),
            RedeemOutcome::Attended(_)
        ));

        // neither listed nor in a listed department
        let mut outsider = self_checkin(ev.id, 999, &issued.token);
        outsider.department_id = Some(8);
        assert!(matches!(
            redeem(&db, SECRET, &outsider, now).await,
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn ended_event_rejects_even_manual_checkins() {
        let db = setup_test_db().await;
        let now = Utc::now();
        let ev = event::Model::create(
            &db,
            "Last Month's Seminar",
            ORGANIZER,
            now - Duration::days(30),
            now - Duration::days(29),
            true,
        )
        .await
        .unwrap();

        let req = RedeemRequest {
            event_id: ev.id,
            subject_id: SUBJECT_A,
            department_id: None,
            token: None,
            agent: Some(ORGANIZER),
            notes: None,
        };
        assert!(matches!(
            redeem(&db, SECRET, &req, now).await,
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn unknown_event_is_not_found() {
        let db = setup_test_db().await;
        let req = RedeemRequest {
            event_id: 404,
            subject_id: SUBJECT_A,
            department_id: None,
            token: None,
            agent: Some(ORGANIZER),
            notes: None,
        };
        assert!(matches!(
            redeem(&db, SECRET, &req, Utc::now()).await,
            Err(EngineError::NotFound(_))
        ));
    }
}
