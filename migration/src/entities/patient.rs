use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "patients")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub patient_number: String,
    pub branch_id: i64,
    pub full_name: String,
    /// Normalized name used for matching
    pub name_key: String,
    pub phone: String,
    /// Digits-only phone (last 10) used for matching
    pub phone_key: String,
    pub date_of_birth: Option<Date>,
    pub sex: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
