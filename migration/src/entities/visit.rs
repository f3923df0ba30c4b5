use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "visits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub visit_number: String,
    pub branch_id: i64,
    pub patient_id: i64,
    /// DIAGNOSTICS / CLINIC
    pub domain: String,
    pub referring_doctor_id: Option<i64>,
    pub consulting_doctor_id: Option<i64>,
    /// OPEN / COMPLETED / CANCELLED
    pub status: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub visited_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
