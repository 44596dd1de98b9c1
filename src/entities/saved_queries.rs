use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "saved_queries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub question: String,
    pub sql_query: String,
    pub tables_used: String,
    pub created_at: Option<String>,
    pub is_successful: bool,
    pub error_message: Option<String>,
    pub query_results: Option<String>,
    pub result_message: Option<String>,
    pub is_scheduled: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
