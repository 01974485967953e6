use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

/// Roster junction: which subjects (students) belong to which schedule.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "schedule_students")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub schedule_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub subject_id: i64,
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
    pub async fn enroll(
        db: &DatabaseConnection,
        schedule_id: i64,
        subject_id: i64,
    ) -> Result<Self, DbErr> {
        ActiveModel {
            schedule_id: Set(schedule_id),
            subject_id: Set(subject_id),
        }
        .insert(db)
        .await
    }

    pub async fn is_enrolled(
        db: &DatabaseConnection,
        schedule_id: i64,
        subject_id: i64,
    ) -> Result<bool, DbErr> {
        Ok(Entity::find_by_id((schedule_id, subject_id))
            .one(db)
            .await?
            .is_some())
    }
}
