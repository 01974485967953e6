use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

/// One redeemed check-in per (event, subject).
///
/// The composite primary key is the uniqueness anchor: a second insert for
/// the same pair fails at the constraint, and callers translate that failure
/// to "already attended" rather than an error.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "event_attendances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub subject_id: i64,

    pub checked_in_at: DateTime<Utc>,
    /// Agent for manual check-ins; `None` for self check-in via token.
    pub checked_in_by: Option<i64>,
    pub verified: bool,
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::event::Entity",
        from = "Column::EventId",
        to = "super::event::Column::Id"
    )]
    Event,
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Constraint-first insert. A unique-violation here is the expected
    /// signal for a repeat redemption; the caller maps it, this method does
    /// not pre-check.
    pub async fn insert_new(
        db: &DatabaseConnection,
        event_id: i64,
        subject_id: i64,
        checked_in_at: DateTime<Utc>,
        checked_in_by: Option<i64>,
        notes: Option<&str>,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            event_id: Set(event_id),
            subject_id: Set(subject_id),
            checked_in_at: Set(checked_in_at),
            checked_in_by: Set(checked_in_by),
            // token possession (or an attributed agent) is the trust anchor
            verified: Set(true),
            notes: Set(notes.map(str::to_owned)),
        }
        .insert(db)
        .await
    }

    pub async fn find_for(
        db: &DatabaseConnection,
        event_id: i64,
        subject_id: i64,
    ) -> Result<Option<Self>, DbErr> {
        Entity::find_by_id((event_id, subject_id)).one(db).await
    }
}
