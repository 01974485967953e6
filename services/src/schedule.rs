//! Schedule matching: which schedule entries a subject can mark attendance
//! against at a given instant.

use chrono::{DateTime, Utc};
use db::models::{schedule, schedule_student};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};

/// Who the subject is to a schedule. Students must be on the roster; faculty
/// match schedules they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectRole {
    Student,
    Faculty,
}

/// Active schedule entries for `subject_id` at `now`: the schedule is active,
/// runs on `now`'s weekday, its window covers `now`'s time-of-day inclusive,
/// and the subject is enrolled (students) or owns it (faculty).
pub async fn active_schedules_for(
    db: &DatabaseConnection,
    subject_id: i64,
    role: SubjectRole,
    now: DateTime<Utc>,
) -> Result<Vec<schedule::Model>, DbErr> {
    let candidates: Vec<schedule::Model> = match role {
        SubjectRole::Faculty => {
            schedule::Entity::find()
                .filter(schedule::Column::FacultyId.eq(subject_id))
                .filter(schedule::Column::Active.eq(true))
                .all(db)
                .await?
        }
        SubjectRole::Student => {
            let enrolled_ids: Vec<i64> = schedule_student::Entity::find()
                .filter(schedule_student::Column::SubjectId.eq(subject_id))
                .all(db)
                .await?
                .into_iter()
                .map(|row| row.schedule_id)
                .collect();

            if enrolled_ids.is_empty() {
                return Ok(Vec::new());
            }

            schedule::Entity::find()
                .filter(schedule::Column::Id.is_in(enrolled_ids))
                .filter(schedule::Column::Active.eq(true))
                .all(db)
                .await?
        }
    };

    // day/time matching is done in code; the bitmask and minute window do not
    // translate into portable SQL
    Ok(candidates
        .into_iter()
        .filter(|s| s.is_active_at(now))
        .collect())
}
