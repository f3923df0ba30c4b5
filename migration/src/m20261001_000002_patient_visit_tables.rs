//! Patient identity and visit tables
//!
//! - patients: registration record with normalized phone/name match keys
//! - patient_identifiers: external identifiers, one primary per type
//! - visits: billable encounters (DIAGNOSTICS / CLINIC)
//! - test_orders / test_results: lab work ordered on a visit

use sea_orm_migration::prelude::*;

use crate::m20261001_000001_catalog_tables::{Branches, Doctors, LabTests};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Patients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Patients::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Patients::PatientNumber)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Patients::BranchId).big_integer().not_null())
                    .col(ColumnDef::new(Patients::FullName).string_len(255).not_null())
                    .col(ColumnDef::new(Patients::NameKey).string_len(255).not_null())
                    .col(ColumnDef::new(Patients::Phone).string_len(32).not_null())
                    .col(ColumnDef::new(Patients::PhoneKey).string_len(16).not_null())
                    .col(ColumnDef::new(Patients::DateOfBirth).date().null())
                    .col(ColumnDef::new(Patients::Sex).string_len(8).null())
                    .col(ColumnDef::new(Patients::Address).text().null())
                    .col(
                        ColumnDef::new(Patients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Patients::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_patients_branch")
                            .from(Patients::Table, Patients::BranchId)
                            .to(Branches::Table, Branches::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Duplicate matching looks candidates up by either key
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_patients_phone_key")
                    .table(Patients::Table)
                    .col(Patients::PhoneKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_patients_name_key")
                    .table(Patients::Table)
                    .col(Patients::NameKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PatientIdentifiers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PatientIdentifiers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PatientIdentifiers::PatientId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PatientIdentifiers::IdType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PatientIdentifiers::Value)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PatientIdentifiers::IsPrimary)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PatientIdentifiers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_patient_identifiers_patient")
                            .from(PatientIdentifiers::Table, PatientIdentifiers::PatientId)
                            .to(Patients::Table, Patients::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_patient_identifiers_patient_type")
                    .table(PatientIdentifiers::Table)
                    .col(PatientIdentifiers::PatientId)
                    .col(PatientIdentifiers::IdType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Visits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Visits::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Visits::VisitNumber)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Visits::BranchId).big_integer().not_null())
                    .col(ColumnDef::new(Visits::PatientId).big_integer().not_null())
                    .col(ColumnDef::new(Visits::Domain).string_len(16).not_null())
                    .col(ColumnDef::new(Visits::ReferringDoctorId).big_integer().null())
                    .col(ColumnDef::new(Visits::ConsultingDoctorId).big_integer().null())
                    .col(ColumnDef::new(Visits::Status).string_len(16).not_null())
                    .col(ColumnDef::new(Visits::Notes).text().null())
                    .col(
                        ColumnDef::new(Visits::VisitedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Visits::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visits_branch")
                            .from(Visits::Table, Visits::BranchId)
                            .to(Branches::Table, Branches::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visits_patient")
                            .from(Visits::Table, Visits::PatientId)
                            .to(Patients::Table, Patients::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visits_referring_doctor")
                            .from(Visits::Table, Visits::ReferringDoctorId)
                            .to(Doctors::Table, Doctors::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visits_consulting_doctor")
                            .from(Visits::Table, Visits::ConsultingDoctorId)
                            .to(Doctors::Table, Doctors::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_visits_patient")
                    .table(Visits::Table)
                    .col(Visits::PatientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_visits_visited_at")
                    .table(Visits::Table)
                    .col(Visits::VisitedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TestOrders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TestOrders::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TestOrders::VisitId).big_integer().not_null())
                    .col(ColumnDef::new(TestOrders::LabTestId).big_integer().not_null())
                    .col(ColumnDef::new(TestOrders::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(TestOrders::OrderedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_orders_visit")
                            .from(TestOrders::Table, TestOrders::VisitId)
                            .to(Visits::Table, Visits::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_orders_lab_test")
                            .from(TestOrders::Table, TestOrders::LabTestId)
                            .to(LabTests::Table, LabTests::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_test_orders_visit")
                    .table(TestOrders::Table)
                    .col(TestOrders::VisitId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TestResults::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TestResults::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TestResults::TestOrderId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(TestResults::Value).string_len(255).not_null())
                    .col(ColumnDef::new(TestResults::NumericValue).double().null())
                    .col(ColumnDef::new(TestResults::Flag).string_len(16).not_null())
                    .col(ColumnDef::new(TestResults::Remarks).text().null())
                    .col(
                        ColumnDef::new(TestResults::EnteredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TestResults::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_test_results_order")
                            .from(TestResults::Table, TestResults::TestOrderId)
                            .to(TestOrders::Table, TestOrders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TestResults::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TestOrders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Visits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PatientIdentifiers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Patients::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Patients {
    #[sea_orm(iden = "patients")]
    Table,
    Id,
    PatientNumber,
    BranchId,
    FullName,
    NameKey,
    Phone,
    PhoneKey,
    DateOfBirth,
    Sex,
    Address,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PatientIdentifiers {
    #[sea_orm(iden = "patient_identifiers")]
    Table,
    Id,
    PatientId,
    IdType,
    Value,
    IsPrimary,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Visits {
    #[sea_orm(iden = "visits")]
    Table,
    Id,
    VisitNumber,
    BranchId,
    PatientId,
    Domain,
    ReferringDoctorId,
    ConsultingDoctorId,
    Status,
    Notes,
    VisitedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TestOrders {
    #[sea_orm(iden = "test_orders")]
    Table,
    Id,
    VisitId,
    LabTestId,
    Status,
    OrderedAt,
}

#[derive(DeriveIden)]
enum TestResults {
    #[sea_orm(iden = "test_results")]
    Table,
    Id,
    TestOrderId,
    Value,
    NumericValue,
    Flag,
    Remarks,
    EnteredAt,
    UpdatedAt,
}
