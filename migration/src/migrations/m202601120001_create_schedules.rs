use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202601120001_create_schedules"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // schedules
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("schedules"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("name")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("faculty_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("start_minutes"))
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("end_minutes"))
                            .integer()
                            .not_null(),
                    )
                    // weekday bitmask, bit 0 = Monday .. bit 6 = Sunday
                    .col(ColumnDef::new(Alias::new("days")).integer().not_null())
                    .col(ColumnDef::new(Alias::new("latitude")).double().null())
                    .col(ColumnDef::new(Alias::new("longitude")).double().null())
                    .col(
                        ColumnDef::new(Alias::new("active"))
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .col(
                        ColumnDef::new(Alias::new("updated_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .to_owned(),
            )
            .await?;

        // schedule_students (roster junction)
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("schedule_students"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("schedule_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("subject_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(Alias::new("schedule_id"))
                            .col(Alias::new("subject_id")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sched_student_schedule")
                            .from(Alias::new("schedule_students"), Alias::new("schedule_id"))
                            .to(Alias::new("schedules"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("schedule_students"))
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Alias::new("schedules")).to_owned())
            .await
    }
}
