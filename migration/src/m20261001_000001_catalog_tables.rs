//! Catalog tables: branches, doctors, lab tests, plus the number sequence table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Branches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Branches::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Branches::Code)
                            .string_len(16)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Branches::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Branches::Address).text().null())
                    .col(ColumnDef::new(Branches::Phone).string_len(32).null())
                    .col(
                        ColumnDef::new(Branches::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Branches::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Doctors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Doctors::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Doctors::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Doctors::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(Doctors::Qualification).string_len(255).null())
                    .col(ColumnDef::new(Doctors::RegistrationNo).string_len(64).null())
                    .col(ColumnDef::new(Doctors::Phone).string_len(32).null())
                    .col(
                        ColumnDef::new(Doctors::CommissionBp)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Doctors::ConsultationShareBp)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Doctors::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Doctors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_doctors_kind")
                    .table(Doctors::Table)
                    .col(Doctors::Kind)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LabTests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LabTests::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LabTests::Code)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(LabTests::Name).string_len(255).not_null())
                    .col(ColumnDef::new(LabTests::Unit).string_len(32).null())
                    .col(ColumnDef::new(LabTests::RefLow).double().null())
                    .col(ColumnDef::new(LabTests::RefHigh).double().null())
                    .col(
                        ColumnDef::new(LabTests::Price)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(LabTests::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(LabTests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // key looks like "BIL:MAIN:2026"
        manager
            .create_table(
                Table::create()
                    .table(NumberSequences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NumberSequences::Key)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(NumberSequences::NextValue)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(NumberSequences::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NumberSequences::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LabTests::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_doctors_kind").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Doctors::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Branches::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Branches {
    #[sea_orm(iden = "branches")]
    Table,
    Id,
    Code,
    Name,
    Address,
    Phone,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Doctors {
    #[sea_orm(iden = "doctors")]
    Table,
    Id,
    Name,
    Kind,
    Qualification,
    RegistrationNo,
    Phone,
    CommissionBp,
    ConsultationShareBp,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum LabTests {
    #[sea_orm(iden = "lab_tests")]
    Table,
    Id,
    Code,
    Name,
    Unit,
    RefLow,
    RefHigh,
    Price,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum NumberSequences {
    #[sea_orm(iden = "number_sequences")]
    Table,
    Key,
    NextValue,
    UpdatedAt,
}
