use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use strum::{Display, EnumString};

/// One attendance mark for one subject against (at most) one schedule.
///
/// `status` is derived once at creation and only ever changed by an explicit
/// admin edit or by the reject-check-in-to-absent rule; it is never
/// recomputed automatically.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "attendance_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub subject_id: i64,
    pub date: NaiveDate,
    pub channel: Channel,
    pub status: Status,
    pub schedule_id: Option<i64>,
    /// Similarity score reported by the face-recognition caller. Stored for
    /// audit, never used to gate acceptance.
    pub confidence: Option<f64>,
    /// Faculty member who marked on the subject's behalf (proxy channel).
    pub marked_by: Option<i64>,
    /// (0, 0) means the claim carried no location.
    pub latitude: f64,
    pub longitude: f64,
    pub taken_at: DateTime<Utc>,
    pub notes: Option<String>,

    pub check_in_time: Option<DateTime<Utc>>,
    pub check_in_verified: bool,
    pub check_in_verified_by: Option<i64>,
    pub check_in_verified_at: Option<DateTime<Utc>>,

    pub check_out_time: Option<DateTime<Utc>>,
    pub check_out_verified: bool,
    pub check_out_verified_by: Option<i64>,
    pub check_out_verified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How the attendance claim reached the system.
#[derive(
    Debug, Clone, Copy, PartialEq, EnumIter, EnumString, Display, DeriveActiveEnum, serde::Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attendance_channel")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Channel {
    #[sea_orm(string_value = "face_recognition")]
    FaceRecognition,
    #[sea_orm(string_value = "proxy")]
    Proxy,
}

#[derive(
    Debug, Clone, Copy, PartialEq, EnumIter, EnumString, Display, DeriveActiveEnum, serde::Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "attendance_status")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Status {
    #[sea_orm(string_value = "present")]
    Present,
    #[sea_orm(string_value = "late")]
    Late,
    #[sea_orm(string_value = "absent")]
    Absent,
}

/// The two independently verifiable sub-records of an attendance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum Checkpoint {
    #[strum(serialize = "check_in", serialize = "check-in")]
    CheckIn,
    #[strum(serialize = "check_out", serialize = "check-out")]
    CheckOut,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::schedule::Entity",
        from = "Column::ScheduleId",
        to = "super::schedule::Column::Id"
    )]
    Schedule,
}

impl Related<super::schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Schedule.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Inserts a freshly decided record. The check-in sub-record starts in
    /// Pending (time set, unverified); check-out starts Unset.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &DatabaseConnection,
        subject_id: i64,
        channel: Channel,
        status: Status,
        schedule_id: Option<i64>,
        confidence: Option<f64>,
        marked_by: Option<i64>,
        location: Option<(f64, f64)>,
        taken_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<Self, DbErr> {
        let (latitude, longitude) = location.unwrap_or((0.0, 0.0));
        let row = ActiveModel {
            id: NotSet,
            subject_id: Set(subject_id),
            date: Set(taken_at.date_naive()),
            channel: Set(channel),
            status: Set(status),
            schedule_id: Set(schedule_id),
            confidence: Set(confidence),
            marked_by: Set(marked_by),
            latitude: Set(latitude),
            longitude: Set(longitude),
            taken_at: Set(taken_at),
            notes: Set(notes.map(str::to_owned)),
            check_in_time: Set(Some(taken_at)),
            check_in_verified: Set(false),
            check_in_verified_by: Set(None),
            check_in_verified_at: Set(None),
            check_out_time: Set(None),
            check_out_verified: Set(false),
            check_out_verified_by: Set(None),
            check_out_verified_at: Set(None),
            created_at: Set(taken_at),
            updated_at: Set(taken_at),
        };
        row.insert(db).await
    }

    /// Duplicate-guard query: does this subject have any record taken after
    /// `since`? Runs against the store rather than an in-memory cache so it
    /// holds across engine instances.
    pub async fn exists_since(
        db: &DatabaseConnection,
        subject_id: i64,
        since: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        Ok(Entity::find()
            .filter(Column::SubjectId.eq(subject_id))
            .filter(Column::TakenAt.gt(since))
            .one(db)
            .await?
            .is_some())
    }

    /// Claimed location, with `(0, 0)` normalized back to "unknown".
    pub fn location(&self) -> Option<(f64, f64)> {
        if self.latitude == 0.0 && self.longitude == 0.0 {
            None
        } else {
            Some((self.latitude, self.longitude))
        }
    }

    pub fn checkpoint_time(&self, checkpoint: Checkpoint) -> Option<DateTime<Utc>> {
        match checkpoint {
            Checkpoint::CheckIn => self.check_in_time,
            Checkpoint::CheckOut => self.check_out_time,
        }
    }

    pub fn checkpoint_verified(&self, checkpoint: Checkpoint) -> bool {
        match checkpoint {
            Checkpoint::CheckIn => self.check_in_verified,
            Checkpoint::CheckOut => self.check_out_verified,
        }
    }
}
