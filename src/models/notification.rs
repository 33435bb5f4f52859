use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
    pub course_id: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub app_name: String,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub notification_type: String,
    pub content_context: Json,
    pub content_url: Option<String>,
    pub web: bool,
    pub email: bool,
    pub push: bool,
    pub last_read: Option<DateTime>,
    pub last_seen: Option<DateTime>,
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub group_by_id: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl ActiveModelBehavior for ActiveModel {}
