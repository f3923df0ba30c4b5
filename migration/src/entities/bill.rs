use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "bills")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub bill_number: String,
    pub visit_id: i64,
    pub branch_id: i64,
    pub gross_amount: i64,
    pub discount_amount: i64,
    pub net_amount: i64,
    pub paid_amount: i64,
    /// UNPAID / PARTIAL / PAID / CANCELLED
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
