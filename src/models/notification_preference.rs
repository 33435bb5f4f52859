use crate::error::AppResult;
use crate::schema::{Channel, EmailCadence};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account-level preference, one row per (user, app, type).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_preferences")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    #[sea_orm(column_type = "String(StringLen::N(128))")]
    pub app: String,
    #[sea_orm(column_type = "String(StringLen::N(128))")]
    pub notification_type: String,
    pub web: bool,
    pub push: bool,
    pub email: bool,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub email_cadence: String,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Model {
    pub fn is_enabled_for_any_channel(&self) -> bool {
        self.web || self.push || self.email
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = Vec::new();
        if self.web {
            channels.push(Channel::Web);
        }
        if self.push {
            channels.push(Channel::Push);
        }
        if self.email {
            channels.push(Channel::Email);
        }
        channels
    }

    pub fn cadence(&self) -> AppResult<EmailCadence> {
        self.email_cadence.parse()
    }
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
