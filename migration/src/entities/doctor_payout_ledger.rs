use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "doctor_payout_ledgers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub doctor_id: i64,
    /// REFERRAL / CLINIC
    pub basis: String,
    pub period_start: Date,
    pub period_end: Date,
    pub gross_amount: i64,
    pub payout_amount: i64,
    pub bill_count: i32,
    /// Serialized JSON array of per-bill lines
    #[sea_orm(column_type = "Text")]
    pub lines: String,
    /// PENDING / PAID
    pub status: String,
    pub paid_at: Option<DateTimeUtc>,
    pub paid_reference: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
