mod common;

use coursenotify::models::{course_notification_preference, CourseNotificationPreference};
use coursenotify::services::preference_store::{MigrationOutcome, PreferenceStore};
use coursenotify::{AppError, EmailCadence, PreferenceSchema};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use std::collections::BTreeSet;

const COURSE: &str = "course-v1:edX+DemoX+2024";
const OTHER_COURSE: &str = "course-v1:edX+Other+2024";

fn current_version() -> i32 {
    PreferenceSchema::builtin().current_version()
}

/// A previous-version document: no grading app, an app that has since been
/// removed, and a user who opted into new-post emails weekly.
fn stale_document() -> serde_json::Value {
    let mut doc = PreferenceSchema::builtin().default_document(false).to_value().unwrap();
    let apps = doc.as_object_mut().unwrap();
    apps.remove("grading");
    apps.insert(
        "legacy".to_string(),
        json!({"enabled": true, "core_notification_types": [], "notification_types": {}, "non_editable": {}}),
    );
    doc["discussion"]["notification_types"]["new_discussion_post"]["email"] = json!(true);
    doc["discussion"]["notification_types"]["new_discussion_post"]["email_cadence"] = json!("Weekly");
    doc
}

#[tokio::test]
async fn get_or_create_builds_default_document() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "learner").await;
    let store = PreferenceStore::new(db.clone());

    let loaded = store.get_or_create(user.id, COURSE).await.unwrap();
    assert_eq!(loaded.outcome, MigrationOutcome::Current);
    assert_eq!(loaded.row.config_version, current_version());
    assert!(loaded.row.is_active);
    assert_eq!(
        loaded.document.app_names(),
        vec!["discussion", "grading", "updates"]
    );
    assert!(loaded.document.is_email_enabled_for("discussion", "new_response"));

    let again = store.get_or_create(user.id, COURSE).await.unwrap();
    assert_eq!(again.row.id, loaded.row.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_or_create_yields_one_row() {
    let (_dir, db) = common::setup_file_db(4).await;
    let user = common::create_user(&db, "racer").await;
    let store = PreferenceStore::new(db.clone());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let user_id = user.id;
            tokio::spawn(async move { store.get_or_create(user_id, COURSE).await })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap().unwrap().row.id);
    }
    assert_eq!(ids.len(), 1);

    let rows = CourseNotificationPreference::find()
        .filter(course_notification_preference::Column::UserId.eq(user.id))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn opted_out_user_gets_email_off_everywhere() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "quiet").await;
    let store = PreferenceStore::new(db.clone());

    assert!(store.record_email_opt_out(user.id).await.unwrap());
    assert!(!store.record_email_opt_out(user.id).await.unwrap());
    assert!(store.is_email_opted_out(user.id).await.unwrap());

    let loaded = store.get_or_create(user.id, COURSE).await.unwrap();
    assert!(loaded
        .document
        .email_enabled_types_for_cadence(EmailCadence::Daily)
        .is_empty());
    assert!(loaded.document.is_web_enabled_for("discussion", "new_response"));
}

#[tokio::test]
async fn load_migrates_without_writing_and_get_or_create_persists() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "returning").await;
    let row = common::insert_preference_row(&db, user.id, COURSE, current_version() - 1, stale_document()).await;
    let store = PreferenceStore::new(db.clone());

    let loaded = store.load(user.id, COURSE).await.unwrap();
    assert_eq!(
        loaded.outcome,
        MigrationOutcome::Migrated {
            from_version: current_version() - 1
        }
    );
    assert!(loaded.document.app("grading").is_some());
    assert!(loaded.document.app("legacy").is_none());

    let stored = CourseNotificationPreference::find_by_id(row.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.config_version, current_version() - 1);

    let persisted = store.get_or_create(user.id, COURSE).await.unwrap();
    assert_eq!(persisted.row.config_version, current_version());
    assert!(persisted.document.is_email_enabled_for("discussion", "new_discussion_post"));
    assert_eq!(
        persisted.document.email_cadence_for("discussion", "new_discussion_post"),
        EmailCadence::Weekly
    );

    let reloaded = store.load(user.id, COURSE).await.unwrap();
    assert_eq!(reloaded.outcome, MigrationOutcome::Current);
    assert_eq!(reloaded.document, persisted.document);
}

#[tokio::test]
async fn failed_migration_leaves_row_stale() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "broken").await;
    let stale = current_version() - 1;
    let row = common::insert_preference_row(
        &db,
        user.id,
        COURSE,
        stale,
        json!({"discussion": {"notification_types": 7}}),
    )
    .await;
    let store = PreferenceStore::new(db.clone());

    let loaded = store.get_or_create(user.id, COURSE).await.unwrap();
    assert!(matches!(
        loaded.outcome,
        MigrationOutcome::Failed { from_version, .. } if from_version == stale
    ));

    let stored = CourseNotificationPreference::find_by_id(row.id)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.config_version, stale);
    assert_eq!(stored.notification_preference_config, row.notification_preference_config);
}

#[tokio::test]
async fn get_all_for_user_migrates_in_one_batch() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "many").await;
    let store = PreferenceStore::new(db.clone());

    common::insert_preference_row(&db, user.id, COURSE, current_version() - 1, stale_document()).await;
    common::insert_preference_row(&db, user.id, OTHER_COURSE, current_version() - 2, stale_document()).await;
    store.get_or_create(user.id, "course-v1:edX+Third+2024").await.unwrap();
    store.get_or_create(user.id, "course-v1:edX+Gone+2024").await.unwrap();
    store.deactivate(user.id, "course-v1:edX+Gone+2024").await.unwrap();

    let all = store.get_all_for_user(user.id).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|l| l.row.config_version == current_version()));
    assert_eq!(
        all.iter()
            .filter(|l| matches!(l.outcome, MigrationOutcome::Migrated { .. }))
            .count(),
        2
    );

    let stale_left = CourseNotificationPreference::find()
        .filter(course_notification_preference::Column::UserId.eq(user.id))
        .filter(course_notification_preference::Column::IsActive.eq(true))
        .filter(course_notification_preference::Column::ConfigVersion.ne(current_version()))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(stale_left, 0);
}

#[tokio::test]
async fn ensure_enrolled_course_preferences_is_idempotent() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "enrolled").await;
    common::enroll(&db, user.id, COURSE, true).await;
    common::enroll(&db, user.id, OTHER_COURSE, true).await;
    common::enroll(&db, user.id, "course-v1:edX+Dropped+2024", false).await;
    let store = PreferenceStore::new(db.clone());

    let existing = store.get_or_create(user.id, COURSE).await.unwrap();

    assert_eq!(store.ensure_enrolled_course_preferences(user.id).await.unwrap(), 1);
    assert_eq!(store.ensure_enrolled_course_preferences(user.id).await.unwrap(), 0);

    let all = store.get_all_for_user(user.id).await.unwrap();
    let courses: Vec<&str> = all.iter().map(|l| l.row.course_id.as_str()).collect();
    assert_eq!(courses, vec![COURSE, OTHER_COURSE]);
    assert_eq!(all[0].row.id, existing.row.id);
}

#[tokio::test]
async fn deactivate_is_a_soft_delete() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "leaver").await;
    let store = PreferenceStore::new(db.clone());

    let created = store.get_or_create(user.id, COURSE).await.unwrap();
    store.deactivate(user.id, COURSE).await.unwrap();

    assert!(store.find_active(user.id, COURSE).await.unwrap().is_none());
    let loaded = store.load(user.id, COURSE).await.unwrap();
    assert_eq!(loaded.row.id, created.row.id);
    assert!(!loaded.row.is_active);

    let missing = store.deactivate(user.id, OTHER_COURSE).await;
    assert!(matches!(missing, Err(AppError::NotFound)));
}

#[tokio::test]
async fn account_preferences_are_seeded_from_schema_defaults() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "account").await;
    let store = PreferenceStore::new(db.clone());

    let types: BTreeSet<(String, String)> = [
        ("discussion", "new_response"),
        ("grading", "ora_staff_notifications"),
        ("discussion", "not_a_type"),
    ]
    .into_iter()
    .map(|(a, t)| (a.to_string(), t.to_string()))
    .collect();

    let rows = store.ensure_account_preferences(user.id, &types).await.unwrap();
    assert_eq!(rows.len(), 2);

    let core = rows.iter().find(|p| p.notification_type == "new_response").unwrap();
    assert!(core.web && core.email);
    assert_eq!(core.cadence().unwrap(), EmailCadence::Daily);

    let staff = rows
        .iter()
        .find(|p| p.notification_type == "ora_staff_notifications")
        .unwrap();
    assert!(staff.web && !staff.email && !staff.push);

    let again = store.ensure_account_preferences(user.id, &types).await.unwrap();
    assert_eq!(again.len(), 2);
}
