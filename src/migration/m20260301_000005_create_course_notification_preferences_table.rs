use super::m20260301_000001_create_users_table::Users;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum CourseNotificationPreferences {
    Table,
    Id,
    UserId,
    CourseId,
    NotificationPreferenceConfig,
    ConfigVersion,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CourseNotificationPreferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CourseNotificationPreferences::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CourseNotificationPreferences::UserId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CourseNotificationPreferences::CourseId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CourseNotificationPreferences::NotificationPreferenceConfig)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CourseNotificationPreferences::ConfigVersion)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CourseNotificationPreferences::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(CourseNotificationPreferences::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CourseNotificationPreferences::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_course_notification_preferences_user_id")
                            .from(
                                CourseNotificationPreferences::Table,
                                CourseNotificationPreferences::UserId,
                            )
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Guards get-or-create races: the loser of an insert re-reads
        manager
            .create_index(
                Index::create()
                    .name("idx_course_notification_preferences_user_course")
                    .table(CourseNotificationPreferences::Table)
                    .col(CourseNotificationPreferences::UserId)
                    .col(CourseNotificationPreferences::CourseId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(CourseNotificationPreferences::Table)
                    .to_owned(),
            )
            .await
    }
}
