use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202601120002_create_attendance_records"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("attendance_records"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("subject_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("date")).date().not_null())
                    .col(ColumnDef::new(Alias::new("channel")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .string()
                            .not_null()
                            .default("present"),
                    )
                    .col(
                        ColumnDef::new(Alias::new("schedule_id"))
                            .big_integer()
                            .null(),
                    )
                    .col(ColumnDef::new(Alias::new("confidence")).double().null())
                    .col(ColumnDef::new(Alias::new("marked_by")).big_integer().null())
                    // (0, 0) means "location unknown"
                    .col(
                        ColumnDef::new(Alias::new("latitude"))
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Alias::new("longitude"))
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Alias::new("taken_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .col(ColumnDef::new(Alias::new("notes")).string().null())
                    // check-in sub-state
                    .col(ColumnDef::new(Alias::new("check_in_time")).timestamp().null())
                    .col(
                        ColumnDef::new(Alias::new("check_in_verified"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alias::new("check_in_verified_by"))
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("check_in_verified_at"))
                            .timestamp()
                            .null(),
                    )
                    // check-out sub-state
                    .col(ColumnDef::new(Alias::new("check_out_time")).timestamp().null())
                    .col(
                        ColumnDef::new(Alias::new("check_out_verified"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alias::new("check_out_verified_by"))
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("check_out_verified_at"))
                            .timestamp()
                            .null(),
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
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_att_rec_schedule")
                            .from(Alias::new("attendance_records"), Alias::new("schedule_id"))
                            .to(Alias::new("schedules"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::SetNull)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // the duplicate guard filters on (subject_id, taken_at) every claim
        manager
            .create_index(
                Index::create()
                    .name("idx_att_rec_subject_taken_at")
                    .table(Alias::new("attendance_records"))
                    .col(Alias::new("subject_id"))
                    .col(Alias::new("taken_at"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(Alias::new("attendance_records"))
                    .to_owned(),
            )
            .await
    }
}
