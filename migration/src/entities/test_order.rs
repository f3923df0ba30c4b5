use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "test_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub visit_id: i64,
    pub lab_test_id: i64,
    /// ORDERED / RESULTED / CANCELLED
    pub status: String,
    pub ordered_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lab_test::Entity",
        from = "Column::LabTestId",
        to = "super::lab_test::Column::Id"
    )]
    LabTest,
}

impl Related<super::lab_test::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LabTest.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
