use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub test_order_id: i64,
    pub value: String,
    pub numeric_value: Option<f64>,
    /// NORMAL / LOW / HIGH / ABNORMAL
    pub flag: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub remarks: Option<String>,
    pub entered_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
