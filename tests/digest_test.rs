mod common;

use chrono::Duration;
use coursenotify::config::digest::DigestConfig;
use coursenotify::models::{notification_preference, NotificationPreference};
use coursenotify::services::digest::{DigestService, DigestWindow, NOTIFICATIONS_PER_APP};
use coursenotify::services::preference_patch::{
    PreferencePatch, PreferencePatchService, UnsubscribePatch,
};
use coursenotify::utils::{decrypt_object, decrypt_string};
use coursenotify::{AppError, Channel, EmailCadence};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;

const COURSE: &str = "course-v1:edX+DemoX+2024";

fn config() -> DigestConfig {
    DigestConfig {
        learning_mfe_url: "https://learning.example.com".to_string(),
        icon_base_url: "https://cdn.example.com/icons".to_string(),
        ..DigestConfig::default()
    }
}

#[tokio::test]
async fn daily_digest_groups_caps_and_orders() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "digest").await;
    common::create_course(&db, COURSE, "Demo Course").await;
    common::enroll(&db, user.id, COURSE, true).await;

    let now = common::now();
    for i in 0..7 {
        common::create_notification(
            &db,
            user.id,
            Some(COURSE),
            "discussion",
            "new_response",
            json!({"replier_name": format!("peer{}", i), "post_title": "Week 1", "email_content": "<p>Reply body</p>"}),
            now - Duration::minutes(10 + i),
        )
        .await;
    }
    common::create_notification(
        &db,
        user.id,
        Some(COURSE),
        "updates",
        "course_updates",
        json!({"course_update_content": "Exam moved"}),
        now - Duration::hours(2),
    )
    .await;
    common::create_notification(
        &db,
        user.id,
        Some(COURSE),
        "grading",
        "ora_grade_assigned",
        json!({"points_earned": 8, "points_possible": 10, "ora_name": "Essay"}),
        now - Duration::hours(3),
    )
    .await;
    // Email off by default
    common::create_notification(
        &db,
        user.id,
        Some(COURSE),
        "discussion",
        "new_discussion_post",
        json!({"username": "someone", "post_title": "Hello"}),
        now - Duration::hours(1),
    )
    .await;
    // Outside the window
    common::create_notification(
        &db,
        user.id,
        Some(COURSE),
        "updates",
        "course_updates",
        json!({"course_update_content": "Old news"}),
        now - Duration::days(3),
    )
    .await;

    let service = DigestService::new(db.clone(), config());
    let window = DigestWindow::for_cadence(EmailCadence::Daily, now + Duration::seconds(1)).unwrap();

    let users = service.users_with_notifications(&window).await.unwrap();
    assert_eq!(users.iter().map(|u| u.id).collect::<Vec<_>>(), vec![user.id]);

    let payload = service
        .build_digest(&user, &window, EmailCadence::Daily)
        .await
        .unwrap()
        .expect("digest should have content");

    let titles: Vec<&str> = payload.email_content.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Updates", "Grading", "Discussion"]);

    let discussion = &payload.email_content[2];
    assert_eq!(discussion.total, 7);
    assert_eq!(discussion.notifications.len(), NOTIFICATIONS_PER_APP);
    assert_eq!(discussion.remaining_count, 2);
    assert!(discussion.show_remaining_count);
    let first = &discussion.notifications[0];
    assert_eq!(first.content, "peer0 responded to your post Week 1");
    assert_eq!(first.details, "<p>Reply body</p>");
    assert_eq!(first.course_name, "Demo Course");
    assert_eq!(first.time_ago, "Today");
    assert_eq!(first.view_text, "discussion");
    assert_eq!(first.icon_url, "https://cdn.example.com/icons/QUESTION_ANSWER_OUTLINE.png");

    let grading = &payload.email_content[1];
    assert_eq!(grading.translated_title, "Grades");
    assert_eq!(grading.notifications[0].content, "8/10 grade was assigned on Essay");

    let summary: Vec<(&str, usize)> = payload
        .email_digest_updates
        .iter()
        .map(|r| (r.title.as_str(), r.count))
        .collect();
    assert_eq!(
        summary,
        vec![("Updates", 1), ("Grading", 1), ("Discussion", 7), ("Total Notifications", 9)]
    );
    assert_eq!(payload.digest_frequency, EmailCadence::Daily);

    let serialized = serde_json::to_value(&payload).unwrap();
    assert_eq!(serialized["digest_frequency"], "Daily");
    assert_eq!(serialized["platform_name"], payload.template.platform_name.as_str());
}

#[tokio::test]
async fn unsubscribe_link_round_trips() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "linked").await;
    let now = common::now();
    common::create_notification(
        &db,
        user.id,
        Some(COURSE),
        "updates",
        "course_updates",
        json!({"course_update_content": "Hi"}),
        now - Duration::minutes(5),
    )
    .await;

    let service = DigestService::new(db.clone(), config());
    let window = DigestWindow::for_cadence(EmailCadence::Daily, now + Duration::seconds(1)).unwrap();
    let payload = service
        .build_digest(&user, &window, EmailCadence::Daily)
        .await
        .unwrap()
        .unwrap();

    let url = &payload.template.unsubscribe_url;
    let tail = url
        .strip_prefix("https://learning.example.com/preferences-unsubscribe/")
        .unwrap();
    let (enc_user, enc_patch) = tail.split_once('/').unwrap();
    assert_eq!(decrypt_string(enc_user).unwrap(), "linked");
    let patch: UnsubscribePatch = decrypt_object(enc_patch).unwrap();
    assert_eq!(patch, UnsubscribePatch::email_opt_out());

    let headers = payload.list_unsubscribe_headers();
    assert_eq!(headers[0], ("List-Unsubscribe", format!("<{}>", url)));
}

#[tokio::test]
async fn cadence_mismatch_yields_no_digest() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "weekly").await;
    let now = common::now();
    common::create_notification(
        &db,
        user.id,
        Some(COURSE),
        "discussion",
        "new_comment",
        json!({}),
        now - Duration::minutes(5),
    )
    .await;

    let service = DigestService::new(db.clone(), config());
    let window = DigestWindow::for_cadence(EmailCadence::Weekly, now + Duration::seconds(1)).unwrap();
    let digest = service
        .build_digest(&user, &window, EmailCadence::Weekly)
        .await
        .unwrap();
    assert!(digest.is_none());

    let invalid = service
        .build_digest(&user, &window, EmailCadence::Immediately)
        .await;
    assert!(matches!(invalid, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn account_preferences_decide_for_courseless_notifications() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "account").await;
    let now = common::now();
    common::create_notification(
        &db,
        user.id,
        None,
        "updates",
        "course_updates",
        json!({"course_update_content": "Platform news"}),
        now - Duration::minutes(5),
    )
    .await;
    common::create_notification(
        &db,
        user.id,
        None,
        "grading",
        "ora_staff_notifications",
        json!({"ora_name": "Essay"}),
        now - Duration::minutes(6),
    )
    .await;

    let service = DigestService::new(db.clone(), config());
    let window = DigestWindow::for_cadence(EmailCadence::Daily, now + Duration::seconds(1)).unwrap();
    let payload = service
        .build_digest(&user, &window, EmailCadence::Daily)
        .await
        .unwrap()
        .unwrap();

    // Seeded rows follow schema defaults: updates email on, staff email off
    let rows = NotificationPreference::find()
        .filter(notification_preference::Column::UserId.eq(user.id))
        .all(&db)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(payload.email_content.len(), 1);
    assert_eq!(payload.email_content[0].app_name, "updates");
    assert_eq!(payload.email_content[0].notifications[0].course_name, "");

    // Turning the account row off removes it from the next digest
    let updates = rows
        .into_iter()
        .find(|p| p.notification_type == "course_updates")
        .unwrap();
    let mut active: notification_preference::ActiveModel = updates.into();
    active.email = Set(false);
    active.update(&db).await.unwrap();

    let digest = service
        .build_digest(&user, &window, EmailCadence::Daily)
        .await
        .unwrap();
    assert!(digest.is_none());
}

#[tokio::test]
async fn global_email_opt_out_silences_account_fallback() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "unsubscribed").await;
    let now = common::now();
    common::create_notification(
        &db,
        user.id,
        None,
        "updates",
        "course_updates",
        json!({"course_update_content": "Platform news"}),
        now - Duration::minutes(5),
    )
    .await;
    // No preference row exists for this course
    common::create_notification(
        &db,
        user.id,
        Some(COURSE),
        "updates",
        "course_updates",
        json!({"course_update_content": "Week 2"}),
        now - Duration::minutes(4),
    )
    .await;

    let service = DigestService::new(db.clone(), config());
    let window = DigestWindow::for_cadence(EmailCadence::Daily, now + Duration::seconds(1)).unwrap();
    let before = service
        .build_digest(&user, &window, EmailCadence::Daily)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.email_content[0].total, 2);

    let patches = PreferencePatchService::new(db.clone());
    let outcome = patches
        .apply_patch(user.id, &PreferencePatch::everything(false).channel(Channel::Email))
        .await
        .unwrap();
    assert!(outcome.email_opt_out_recorded);

    assert!(service
        .build_digest(&user, &window, EmailCadence::Daily)
        .await
        .unwrap()
        .is_none());

    // Rows seeded after the opt-out start with email off
    common::create_notification(
        &db,
        user.id,
        None,
        "grading",
        "ora_grade_assigned",
        json!({"ora_name": "Essay", "points_earned": 8, "points_possible": 10}),
        now - Duration::minutes(3),
    )
    .await;
    assert!(service
        .build_digest(&user, &window, EmailCadence::Daily)
        .await
        .unwrap()
        .is_none());
    let seeded = NotificationPreference::find()
        .filter(notification_preference::Column::UserId.eq(user.id))
        .filter(notification_preference::Column::NotificationType.eq("ora_grade_assigned"))
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert!(!seeded.email);
}

#[tokio::test]
async fn stale_course_documents_are_migrated_before_filtering() {
    let db = common::setup_db().await;
    let user = common::create_user(&db, "stale").await;
    let schema = coursenotify::PreferenceSchema::builtin();

    let mut old = schema.default_document(false).to_value().unwrap();
    old["discussion"]["notification_types"]["core"]["email_cadence"] = json!("Weekly");
    old.as_object_mut().unwrap().remove("updates");
    common::insert_preference_row(&db, user.id, COURSE, schema.current_version() - 1, old).await;

    let now = common::now();
    common::create_notification(
        &db,
        user.id,
        Some(COURSE),
        "discussion",
        "new_comment",
        json!({"replier_name": "ana", "author_name": "bo", "post_title": "Q"}),
        now - Duration::minutes(5),
    )
    .await;

    let service = DigestService::new(db.clone(), config());
    let window = DigestWindow::for_cadence(EmailCadence::Weekly, now + Duration::seconds(1)).unwrap();
    let payload = service
        .build_digest(&user, &window, EmailCadence::Weekly)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload.email_content[0].total, 1);

    let daily = DigestWindow::for_cadence(EmailCadence::Daily, now + Duration::seconds(1)).unwrap();
    assert!(service
        .build_digest(&user, &daily, EmailCadence::Daily)
        .await
        .unwrap()
        .is_none());
}
