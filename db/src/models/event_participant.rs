use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

/// Explicit subject eligibility junction for events.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "event_participants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub subject_id: i64,
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
    pub async fn add(
        db: &DatabaseConnection,
        event_id: i64,
        subject_id: i64,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            event_id: Set(event_id),
            subject_id: Set(subject_id),
        }
        .insert(db)
        .await
    }

    pub async fn is_listed(
        db: &DatabaseConnection,
        event_id: i64,
        subject_id: i64,
    ) -> Result<bool, DbErr> {
        Ok(Entity::find_by_id((event_id, subject_id))
            .one(db)
            .await?
            .is_some())
    }
}
