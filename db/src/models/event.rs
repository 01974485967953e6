use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;

/// A campus event that accepts QR-token check-ins.
///
/// The event stores only the *currently recorded* token window
/// (`qr_expires_at`, `qr_active`). Issuing a new token overwrites the window,
/// which makes every previously issued token unusable even though its
/// signature is still valid.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub title: String,
    pub created_by: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub active: bool,
    pub open_to_all: bool,
    pub qr_expires_at: Option<DateTime<Utc>>,
    pub qr_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::event_attendance::Entity")]
    Attendances,
    #[sea_orm(has_many = "super::event_department::Entity")]
    Departments,
    #[sea_orm(has_many = "super::event_participant::Entity")]
    Participants,
}

impl Related<super::event_attendance::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attendances.def()
    }
}

impl Related<super::event_department::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Departments.def()
    }
}

impl Related<super::event_participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        title: &str,
        created_by: i64,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        open_to_all: bool,
    ) -> Result<Self, DbErr> {
        let now = Utc::now();
        let row = ActiveModel {
            id: NotSet,
            title: Set(title.to_owned()),
            created_by: Set(created_by),
            start_date: Set(start_date),
            end_date: Set(end_date),
            active: Set(true),
            open_to_all: Set(open_to_all),
            qr_expires_at: Set(None),
            qr_active: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        row.insert(db).await
    }

    /// True when the event accepts check-ins at `now`.
    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.active && now >= self.start_date && now <= self.end_date
    }

    /// True when the recorded token window still accepts tokens at `now`.
    pub fn qr_window_open(&self, now: DateTime<Utc>) -> bool {
        self.qr_active && self.qr_expires_at.is_some_and(|exp| now <= exp)
    }

    /// Records a freshly issued token window, invalidating all prior tokens.
    pub async fn record_qr_window(
        &self,
        db: &DatabaseConnection,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let mut row: ActiveModel = self.clone().into();
        row.qr_expires_at = Set(Some(expires_at));
        row.qr_active = Set(true);
        row.updated_at = Set(now);
        row.update(db).await
    }

    /// Disables the current token window without issuing a new one.
    pub async fn deactivate_qr(&self, db: &DatabaseConnection) -> Result<Self, DbErr> {
        let mut row: ActiveModel = self.clone().into();
        row.qr_active = Set(false);
        row.updated_at = Set(Utc::now());
        row.update(db).await
    }
}
