//! Billing, report version and payout ledger tables
//!
//! Snapshot and ledger line columns hold serialized JSON as TEXT so the
//! same schema works on SQLite, MySQL and PostgreSQL.

use sea_orm_migration::prelude::*;

use crate::m20261001_000001_catalog_tables::{Branches, Doctors};
use crate::m20261001_000002_patient_visit_tables::Visits;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bills::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Bills::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Bills::BillNumber)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Bills::VisitId).big_integer().not_null())
                    .col(ColumnDef::new(Bills::BranchId).big_integer().not_null())
                    .col(ColumnDef::new(Bills::GrossAmount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Bills::DiscountAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Bills::NetAmount).big_integer().not_null())
                    .col(
                        ColumnDef::new(Bills::PaidAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Bills::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Bills::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bills::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bills_visit")
                            .from(Bills::Table, Bills::VisitId)
                            .to(Visits::Table, Visits::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bills_branch")
                            .from(Bills::Table, Bills::BranchId)
                            .to(Branches::Table, Branches::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bills_visit")
                    .table(Bills::Table)
                    .col(Bills::VisitId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bills_created_at")
                    .table(Bills::Table)
                    .col(Bills::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BillItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BillItems::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BillItems::BillId).big_integer().not_null())
                    .col(ColumnDef::new(BillItems::LabTestId).big_integer().null())
                    .col(
                        ColumnDef::new(BillItems::Description)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BillItems::Amount).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bill_items_bill")
                            .from(BillItems::Table, BillItems::BillId)
                            .to(Bills::Table, Bills::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReportVersions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReportVersions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReportVersions::ReportNumber)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportVersions::VisitId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReportVersions::Version).integer().not_null())
                    .col(ColumnDef::new(ReportVersions::Status).string_len(16).not_null())
                    .col(ColumnDef::new(ReportVersions::PatientSnapshot).text().null())
                    .col(ColumnDef::new(ReportVersions::ResultsSnapshot).text().null())
                    .col(ColumnDef::new(ReportVersions::SignatureSnapshot).text().null())
                    .col(
                        ColumnDef::new(ReportVersions::SignedByDoctorId)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ReportVersions::FinalizedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ReportVersions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportVersions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_report_versions_visit")
                            .from(ReportVersions::Table, ReportVersions::VisitId)
                            .to(Visits::Table, Visits::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_report_versions_signer")
                            .from(ReportVersions::Table, ReportVersions::SignedByDoctorId)
                            .to(Doctors::Table, Doctors::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // A report number never repeats a version
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_report_versions_number_version")
                    .table(ReportVersions::Table)
                    .col(ReportVersions::ReportNumber)
                    .col(ReportVersions::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_report_versions_visit")
                    .table(ReportVersions::Table)
                    .col(ReportVersions::VisitId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DoctorPayoutLedgers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::DoctorId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::Basis)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::PeriodStart)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::PeriodEnd)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::GrossAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::PayoutAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::BillCount)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DoctorPayoutLedgers::Lines).text().not_null())
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::PaidAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::PaidReference)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DoctorPayoutLedgers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payout_ledgers_doctor")
                            .from(DoctorPayoutLedgers::Table, DoctorPayoutLedgers::DoctorId)
                            .to(Doctors::Table, Doctors::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_payout_ledgers_doctor_period")
                    .table(DoctorPayoutLedgers::Table)
                    .col(DoctorPayoutLedgers::DoctorId)
                    .col(DoctorPayoutLedgers::Basis)
                    .col(DoctorPayoutLedgers::PeriodStart)
                    .col(DoctorPayoutLedgers::PeriodEnd)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DoctorPayoutLedgers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReportVersions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BillItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Bills::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Bills {
    #[sea_orm(iden = "bills")]
    Table,
    Id,
    BillNumber,
    VisitId,
    BranchId,
    GrossAmount,
    DiscountAmount,
    NetAmount,
    PaidAmount,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BillItems {
    #[sea_orm(iden = "bill_items")]
    Table,
    Id,
    BillId,
    LabTestId,
    Description,
    Amount,
}

#[derive(DeriveIden)]
enum ReportVersions {
    #[sea_orm(iden = "report_versions")]
    Table,
    Id,
    ReportNumber,
    VisitId,
    Version,
    Status,
    PatientSnapshot,
    ResultsSnapshot,
    SignatureSnapshot,
    SignedByDoctorId,
    FinalizedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DoctorPayoutLedgers {
    #[sea_orm(iden = "doctor_payout_ledgers")]
    Table,
    Id,
    DoctorId,
    Basis,
    PeriodStart,
    PeriodEnd,
    GrossAmount,
    PayoutAmount,
    BillCount,
    Lines,
    Status,
    PaidAt,
    PaidReference,
    CreatedAt,
    UpdatedAt,
}
