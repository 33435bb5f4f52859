use sea_orm_migration::prelude::*;

mod m20260301_000001_create_users_table;
mod m20260301_000002_create_course_tables;
mod m20260301_000003_create_notifications_table;
mod m20260301_000004_create_notification_preferences_table;
mod m20260301_000005_create_course_notification_preferences_table;
mod m20260301_000006_create_user_preferences_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_users_table::Migration),
            Box::new(m20260301_000002_create_course_tables::Migration),
            Box::new(m20260301_000003_create_notifications_table::Migration),
            Box::new(m20260301_000004_create_notification_preferences_table::Migration),
            Box::new(m20260301_000005_create_course_notification_preferences_table::Migration),
            Box::new(m20260301_000006_create_user_preferences_table::Migration),
        ]
    }
}
