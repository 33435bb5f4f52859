#![allow(dead_code)]

use chrono::NaiveDateTime;
use coursenotify::config::crypto::EmailTokenConfig;
use coursenotify::config::database::DatabaseConfig;
use coursenotify::models::{
    course_enrollment, course_notification_preference, course_overview, notification, user,
    CourseNotificationPreferenceModel, NotificationModel, UserModel,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use std::sync::Once;
use tempfile::TempDir;

static INIT: Once = Once::new();

pub const TEST_SECRET: &str = "integration_test_secret_that_is_at_least_32_characters_long";

pub fn init_crypto() {
    INIT.call_once(|| {
        let config = EmailTokenConfig::new(TEST_SECRET).unwrap();
        let _ = coursenotify::utils::email_crypto::init_email_cipher(&config);
    });
}

/// Fresh in-memory database with the crate's schema applied.
pub async fn setup_db() -> DatabaseConnection {
    init_crypto();

    let config = DatabaseConfig::new("sqlite::memory:")
        .max_connections(1)
        .min_connections(1);
    let db = config
        .connect()
        .await
        .expect("Failed to open in-memory database");
    migrate(&db).await;
    db
}

/// File-backed database shared by a pool of `connections`, for tests that
/// need statements to really run side by side. Keep the `TempDir` alive for
/// the duration of the test.
pub async fn setup_file_db(connections: u32) -> (TempDir, DatabaseConnection) {
    init_crypto();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("notify.db").display());
    let db = DatabaseConfig::new(url)
        .max_connections(connections)
        .min_connections(connections)
        .connect()
        .await
        .expect("Failed to open file database");
    migrate(&db).await;
    (dir, db)
}

async fn migrate(db: &DatabaseConnection) {
    coursenotify::migration::Migrator::up(db, None)
        .await
        .expect("Failed to run migrations");
}

pub fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

pub async fn create_user(db: &DatabaseConnection, username: &str) -> UserModel {
    user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(format!("{}@example.com", username)),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn enroll(db: &DatabaseConnection, user_id: i32, course_id: &str, is_active: bool) {
    course_enrollment::ActiveModel {
        user_id: Set(user_id),
        course_id: Set(course_id.to_string()),
        is_active: Set(is_active),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();
}

pub async fn create_course(db: &DatabaseConnection, course_id: &str, display_name: &str) {
    course_overview::ActiveModel {
        course_id: Set(course_id.to_string()),
        display_name: Set(display_name.to_string()),
    }
    .insert(db)
    .await
    .unwrap();
}

pub async fn insert_preference_row(
    db: &DatabaseConnection,
    user_id: i32,
    course_id: &str,
    config_version: i32,
    config: Value,
) -> CourseNotificationPreferenceModel {
    course_notification_preference::ActiveModel {
        user_id: Set(user_id),
        course_id: Set(course_id.to_string()),
        notification_preference_config: Set(config),
        config_version: Set(config_version),
        is_active: Set(true),
        created_at: Set(now()),
        updated_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn create_notification(
    db: &DatabaseConnection,
    user_id: i32,
    course_id: Option<&str>,
    app_name: &str,
    notification_type: &str,
    content_context: Value,
    created_at: NaiveDateTime,
) -> NotificationModel {
    notification::ActiveModel {
        user_id: Set(user_id),
        course_id: Set(course_id.map(str::to_string)),
        app_name: Set(app_name.to_string()),
        notification_type: Set(notification_type.to_string()),
        content_context: Set(content_context),
        content_url: Set(Some("https://learn.example.com/thread/1".to_string())),
        web: Set(true),
        email: Set(true),
        push: Set(false),
        last_read: Set(None),
        last_seen: Set(None),
        group_by_id: Set(String::new()),
        created_at: Set(created_at),
        updated_at: Set(created_at),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}
