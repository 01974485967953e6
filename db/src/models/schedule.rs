use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;

/// A recurring class slot: time-of-day window (minute resolution), weekday
/// set, owning faculty member, and an optional authoritative location used
/// for geofencing.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "schedules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub faculty_id: i64,
    /// Minutes since midnight, inclusive start of the slot.
    pub start_minutes: i32,
    /// Minutes since midnight, inclusive end of the slot.
    pub end_minutes: i32,
    /// Weekday bitmask, bit 0 = Monday .. bit 6 = Sunday.
    pub days: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::schedule_student::Entity")]
    Roster,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    Records,
}

impl Related<super::schedule_student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Roster.def()
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Bit position for a weekday in the `days` mask.
pub fn day_bit(day: Weekday) -> i32 {
    1 << day.num_days_from_monday()
}

/// Builds a `days` bitmask from a weekday slice.
pub fn days_mask(days: &[Weekday]) -> i32 {
    days.iter().fold(0, |mask, d| mask | day_bit(*d))
}

/// Minutes since midnight for a timestamp (UTC).
pub fn minutes_of_day(at: DateTime<Utc>) -> i32 {
    (at.hour() * 60 + at.minute()) as i32
}

impl Model {
    pub fn runs_on(&self, day: Weekday) -> bool {
        self.days & day_bit(day) != 0
    }

    /// True when the time-of-day lies in `[start_minutes, end_minutes]` inclusive.
    pub fn covers(&self, minutes: i32) -> bool {
        minutes >= self.start_minutes && minutes <= self.end_minutes
    }

    /// True when the schedule is active, runs on `now`'s weekday and its
    /// window covers `now`'s time-of-day.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.runs_on(now.weekday()) && self.covers(minutes_of_day(now))
    }

    /// Late is defined purely by submission time versus scheduled start:
    /// strictly after `start_minutes`.
    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        minutes_of_day(now) > self.start_minutes
    }

    /// Authoritative location, when one is configured.
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &DatabaseConnection,
        name: &str,
        faculty_id: i64,
        start_minutes: i32,
        end_minutes: i32,
        days: i32,
        location: Option<(f64, f64)>,
        active: bool,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        let row = ActiveModel {
            id: NotSet,
            name: Set(name.to_owned()),
            faculty_id: Set(faculty_id),
            start_minutes: Set(start_minutes),
            end_minutes: Set(end_minutes),
            days: Set(days),
            latitude: Set(location.map(|(lat, _)| lat)),
            longitude: Set(location.map(|(_, lon)| lon)),
            active: Set(active),
            created_at: Set(now),
            updated_at: Set(now),
        };
        row.insert(db).await
    }
}
