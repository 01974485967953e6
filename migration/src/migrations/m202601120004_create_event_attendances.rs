use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202601120004_create_event_attendances"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Composite primary key enforces at most one redemption per
        // (event, subject); concurrent inserts lose at the constraint,
        // not at an application-level check.
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("event_attendances"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("event_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("subject_id"))
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("checked_in_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .col(
                        ColumnDef::new(Alias::new("checked_in_by"))
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("verified"))
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Alias::new("notes")).string().null())
                    .primary_key(
                        Index::create()
                            .col(Alias::new("event_id"))
                            .col(Alias::new("subject_id")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_event_att_event")
                            .from(Alias::new("event_attendances"), Alias::new("event_id"))
                            .to(Alias::new("events"), Alias::new("id"))
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
                    .table(Alias::new("event_attendances"))
                    .to_owned(),
            )
            .await
    }
}
