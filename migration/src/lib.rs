pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20261001_000001_catalog_tables;
mod m20261001_000002_patient_visit_tables;
mod m20261001_000003_billing_report_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_catalog_tables::Migration),
            Box::new(m20261001_000002_patient_visit_tables::Migration),
            Box::new(m20261001_000003_billing_report_tables::Migration),
        ]
    }
}
