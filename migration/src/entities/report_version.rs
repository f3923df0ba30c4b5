use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "report_versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub report_number: String,
    pub visit_id: i64,
    pub version: i32,
    /// DRAFT / FINALIZED
    pub status: String,
    /// Serialized JSON, written once at finalization
    #[sea_orm(column_type = "Text", nullable)]
    pub patient_snapshot: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub results_snapshot: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub signature_snapshot: Option<String>,
    pub signed_by_doctor_id: Option<i64>,
    pub finalized_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
