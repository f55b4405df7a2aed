use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OtpRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OtpRecords::Identifier)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OtpRecords::Code).string_len(6).not_null())
                    .col(
                        ColumnDef::new(OtpRecords::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OtpRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OtpRecords::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OtpRecords::VerifiedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Sweeper deletes by expiry.
        manager
            .create_index(
                Index::create()
                    .table(OtpRecords::Table)
                    .col(OtpRecords::ExpiresAt)
                    .name("idx_otp_records_expires_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OtpRecords::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OtpRecords {
    Table,
    Identifier,
    Code,
    Attempts,
    CreatedAt,
    ExpiresAt,
    VerifiedAt,
}
