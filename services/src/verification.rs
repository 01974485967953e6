//! Admin verification lifecycle for the check-in/check-out sub-records of an
//! attendance record.
//!
//! Each sub-record moves `Unset -> Pending (time set) -> Verified`, or back
//! to `Unset` on rejection. Terminal operations are idempotent: re-verifying
//! a verified field and re-rejecting a cleared field are both no-ops rather
//! than errors.

use chrono::{DateTime, Utc};
use db::models::attendance_record::{ActiveModel, Checkpoint, Entity, Model, Status};
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait};

use crate::error::EngineError;

/// Observable state of one sub-record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Unset,
    Pending,
    Verified,
}

pub fn checkpoint_state(record: &Model, checkpoint: Checkpoint) -> CheckpointState {
    match (
        record.checkpoint_time(checkpoint),
        record.checkpoint_verified(checkpoint),
    ) {
        (None, _) => CheckpointState::Unset,
        (Some(_), false) => CheckpointState::Pending,
        (Some(_), true) => CheckpointState::Verified,
    }
}

async fn load(db: &DatabaseConnection, record_id: i64) -> Result<Model, EngineError> {
    Entity::find_by_id(record_id)
        .one(db)
        .await?
        .ok_or(EngineError::NotFound("attendance record"))
}

/// `Unset -> Pending`: stamps the sub-record's time. Re-marking an already
/// set field is an invalid transition.
pub async fn mark_checkpoint(
    db: &DatabaseConnection,
    record_id: i64,
    checkpoint: Checkpoint,
    time: DateTime<Utc>,
) -> Result<Model, EngineError> {
    let record = load(db, record_id).await?;
    if record.checkpoint_time(checkpoint).is_some() {
        return Err(EngineError::InvalidArgument(format!(
            "{checkpoint} already recorded"
        )));
    }

    let mut row: ActiveModel = record.into();
    match checkpoint {
        Checkpoint::CheckIn => row.check_in_time = Set(Some(time)),
        Checkpoint::CheckOut => row.check_out_time = Set(Some(time)),
    }
    row.updated_at = Set(time);
    Ok(row.update(db).await?)
}

/// `Pending -> Verified`, stamping who verified and when. Verifying a field
/// with no time set is an error; verifying a verified field is a no-op.
pub async fn verify_checkpoint(
    db: &DatabaseConnection,
    record_id: i64,
    checkpoint: Checkpoint,
    admin_id: i64,
    now: DateTime<Utc>,
) -> Result<Model, EngineError> {
    let record = load(db, record_id).await?;
    match checkpoint_state(&record, checkpoint) {
        CheckpointState::Unset => Err(EngineError::InvalidArgument(format!(
            "cannot verify {checkpoint} with no recorded time"
        ))),
        CheckpointState::Verified => Ok(record),
        CheckpointState::Pending => {
            let mut row: ActiveModel = record.into();
            match checkpoint {
                Checkpoint::CheckIn => {
                    row.check_in_verified = Set(true);
                    row.check_in_verified_by = Set(Some(admin_id));
                    row.check_in_verified_at = Set(Some(now));
                }
                Checkpoint::CheckOut => {
                    row.check_out_verified = Set(true);
                    row.check_out_verified_by = Set(Some(admin_id));
                    row.check_out_verified_at = Set(Some(now));
                }
            }
            row.updated_at = Set(now);
            Ok(row.update(db).await?)
        }
    }
}

/// Rejection clears the sub-record back to `Unset`.
///
/// Rejecting the check-in also clears the check-out (a check-out without a
/// valid check-in is meaningless), and when neither sub-record retains a
/// time afterwards the record's status becomes `absent`. This is the one
/// place verification actions touch `status`.
pub async fn reject_checkpoint(
    db: &DatabaseConnection,
    record_id: i64,
    checkpoint: Checkpoint,
    now: DateTime<Utc>,
) -> Result<Model, EngineError> {
    let record = load(db, record_id).await?;
    if checkpoint_state(&record, checkpoint) == CheckpointState::Unset {
        return Ok(record);
    }

    // check-out never survives a rejection of either field; check-in
    // survives only a check-out rejection
    let check_in_survives = matches!(checkpoint, Checkpoint::CheckOut)
        && record.checkpoint_time(Checkpoint::CheckIn).is_some();

    let mut row: ActiveModel = record.into();
    match checkpoint {
        Checkpoint::CheckIn => {
            row.check_in_time = Set(None);
            row.check_in_verified = Set(false);
            row.check_in_verified_by = Set(None);
            row.check_in_verified_at = Set(None);
            // cascades to check-out
            row.check_out_time = Set(None);
            row.check_out_verified = Set(false);
            row.check_out_verified_by = Set(None);
            row.check_out_verified_at = Set(None);
        }
        Checkpoint::CheckOut => {
            row.check_out_time = Set(None);
            row.check_out_verified = Set(false);
            row.check_out_verified_by = Set(None);
            row.check_out_verified_at = Set(None);
        }
    }
    if !check_in_survives {
        row.status = Set(Status::Absent);
    }
    row.updated_at = Set(now);
    Ok(row.update(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use db::models::attendance_record::Channel;
    use db::test_utils::setup_test_db;

    const STUDENT: i64 = 101;
    const ADMIN: i64 = 1;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 12, h, m, 0).unwrap()
    }

    async fn seed_record(db: &DatabaseConnection) -> Model {
        Model::create(
            db,
            STUDENT,
            Channel::FaceRecognition,
            Status::Present,
            None,
            Some(0.95),
            None,
            None,
            at(9, 0),
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn fresh_record_has_pending_check_in_and_unset_check_out() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;
        assert_eq!(
            checkpoint_state(&rec, Checkpoint::CheckIn),
            CheckpointState::Pending
        );
        assert_eq!(
            checkpoint_state(&rec, Checkpoint::CheckOut),
            CheckpointState::Unset
        );
    }

    #[tokio::test]
    async fn verify_pending_check_in_stamps_admin_and_time() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;

        let rec = verify_checkpoint(&db, rec.id, Checkpoint::CheckIn, ADMIN, at(10, 0))
            .await
            .unwrap();
        assert!(rec.check_in_verified);
        assert_eq!(rec.check_in_verified_by, Some(ADMIN));
        assert_eq!(rec.check_in_verified_at, Some(at(10, 0)));
    }

    #[tokio::test]
    async fn verifying_unset_check_out_is_invalid() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;

        let err = verify_checkpoint(&db, rec.id, Checkpoint::CheckOut, ADMIN, at(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn re_verifying_verified_field_is_a_noop() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;

        let first = verify_checkpoint(&db, rec.id, Checkpoint::CheckIn, ADMIN, at(10, 0))
            .await
            .unwrap();
        let second = verify_checkpoint(&db, rec.id, Checkpoint::CheckIn, 99, at(11, 0))
            .await
            .unwrap();
        // second call changes nothing, including the original verifier
        assert_eq!(second.check_in_verified_by, first.check_in_verified_by);
        assert_eq!(second.check_in_verified_at, first.check_in_verified_at);
    }

    #[tokio::test]
    async fn marked_check_out_moves_to_pending_and_can_be_verified() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;

        let rec = mark_checkpoint(&db, rec.id, Checkpoint::CheckOut, at(17, 0))
            .await
            .unwrap();
        assert_eq!(rec.check_out_time, Some(at(17, 0)));
        assert_eq!(
            checkpoint_state(&rec, Checkpoint::CheckOut),
            CheckpointState::Pending
        );

        let rec = verify_checkpoint(&db, rec.id, Checkpoint::CheckOut, ADMIN, at(17, 30))
            .await
            .unwrap();
        assert_eq!(
            checkpoint_state(&rec, Checkpoint::CheckOut),
            CheckpointState::Verified
        );
        assert_eq!(rec.check_out_verified_by, Some(ADMIN));
    }

    #[tokio::test]
    async fn rejecting_check_in_clears_check_out_and_sets_absent() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;
        mark_checkpoint(&db, rec.id, Checkpoint::CheckOut, at(10, 0))
            .await
            .unwrap();
        // even a verified check-out does not survive a rejected check-in
        verify_checkpoint(&db, rec.id, Checkpoint::CheckOut, ADMIN, at(10, 5))
            .await
            .unwrap();

        let rec = reject_checkpoint(&db, rec.id, Checkpoint::CheckIn, at(11, 0))
            .await
            .unwrap();
        assert_eq!(rec.check_in_time, None);
        assert_eq!(rec.check_out_time, None);
        assert!(!rec.check_out_verified);
        assert_eq!(rec.status, Status::Absent);
    }

    #[tokio::test]
    async fn rejecting_check_out_keeps_check_in_and_status() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;
        mark_checkpoint(&db, rec.id, Checkpoint::CheckOut, at(10, 0))
            .await
            .unwrap();

        let rec = reject_checkpoint(&db, rec.id, Checkpoint::CheckOut, at(11, 0))
            .await
            .unwrap();
        assert!(rec.check_in_time.is_some());
        assert_eq!(rec.check_out_time, None);
        // check-in still stands, so the record is not absent
        assert_eq!(rec.status, Status::Present);
    }

    #[tokio::test]
    async fn rejecting_cleared_field_is_a_noop() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;

        let rec = reject_checkpoint(&db, rec.id, Checkpoint::CheckOut, at(11, 0))
            .await
            .unwrap();
        assert_eq!(rec.status, Status::Present);
        assert!(rec.check_in_time.is_some());
    }

    #[tokio::test]
    async fn marking_an_already_set_checkpoint_is_invalid() {
        let db = setup_test_db().await;
        let rec = seed_record(&db).await;

        let err = mark_checkpoint(&db, rec.id, Checkpoint::CheckIn, at(12, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let db = setup_test_db().await;
        let err = verify_checkpoint(&db, 9999, Checkpoint::CheckIn, ADMIN, at(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
