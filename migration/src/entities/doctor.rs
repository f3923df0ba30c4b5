use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "doctors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    /// REFERRAL / CLINIC / PATHOLOGIST
    pub kind: String,
    pub qualification: Option<String>,
    pub registration_no: Option<String>,
    pub phone: Option<String>,
    /// Referral commission in basis points of bill net amount
    pub commission_bp: i32,
    /// Consultation share in basis points of consultation fees
    pub consultation_share_bp: i32,
    pub active: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
