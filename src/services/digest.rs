//! Email digest assembly.
//!
//! A digest collects one user's notifications over a cadence window, keeps the
//! ones whose effective email preference matches the cadence, and shapes them
//! into a payload a mail renderer can consume directly.

use crate::config::digest::{DigestConfig, SocialLink};
use crate::error::{AppError, AppResult};
use crate::models::{
    course_overview, notification, user, CourseOverview, Notification, NotificationModel,
    NotificationPreferenceModel, User, UserModel,
};
use crate::schema::{EmailCadence, PreferenceSchema};
use crate::services::preference_patch::UnsubscribePatch;
use crate::services::preference_store::{LoadedPreference, PreferenceStore};
use crate::utils::email_crypto;
use chrono::{Duration, NaiveDateTime};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Visible notifications per app section.
pub const NOTIFICATIONS_PER_APP: usize = 5;

const TOTAL_ROW_TITLE: &str = "Total Notifications";
const DATE_FORMAT: &str = "%A, %b %d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigestWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DigestWindow {
    /// Daily covers the last day plus a 15 minute overlap; weekly reaches
    /// six more days back.
    pub fn for_cadence(cadence: EmailCadence, now: NaiveDateTime) -> AppResult<Self> {
        let start = match cadence {
            EmailCadence::Daily => now - Duration::days(1) - Duration::minutes(15),
            EmailCadence::Weekly => now - Duration::days(7) - Duration::minutes(15),
            other => {
                return Err(AppError::Validation(format!(
                    "Invalid cadence_type '{}' for digest",
                    other
                )))
            }
        };
        Ok(Self { start, end: now })
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestItem {
    pub id: i32,
    pub app_name: String,
    pub notification_type: String,
    pub course_id: Option<String>,
    pub course_name: String,
    pub icon_url: String,
    pub time_ago: String,
    pub content: String,
    pub details: String,
    pub view_text: String,
    pub content_url: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppSection {
    pub app_name: String,
    pub title: String,
    pub translated_title: String,
    pub notifications: Vec<DigestItem>,
    pub total: usize,
    pub show_remaining_count: bool,
    pub remaining_count: usize,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestSummaryRow {
    pub title: String,
    pub translated_title: String,
    pub count: usize,
}

/// Header and footer shared by every digest email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailTemplateContext {
    pub platform_name: String,
    pub mailing_address: String,
    pub logo_url: String,
    pub logo_notification_cadence_url: String,
    pub social_media: Vec<SocialLink>,
    pub notification_settings_url: String,
    pub unsubscribe_url: String,
}

impl EmailTemplateContext {
    pub fn new(config: &DigestConfig, username: &str) -> AppResult<Self> {
        Ok(Self {
            platform_name: config.platform_name.clone(),
            mailing_address: config.contact_mailing_address.clone(),
            logo_url: config.logo_url.clone(),
            logo_notification_cadence_url: config.digest_logo_url.clone(),
            social_media: config
                .social_links
                .iter()
                .filter(|link| !link.icon.is_empty())
                .cloned()
                .collect(),
            notification_settings_url: config.notification_settings_url(),
            unsubscribe_url: unsubscribe_link(config, username, &UnsubscribePatch::email_opt_out())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestPayload {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    #[serde(flatten)]
    pub template: EmailTemplateContext,
    pub start_date: String,
    pub end_date: String,
    pub digest_frequency: EmailCadence,
    pub email_digest_updates: Vec<DigestSummaryRow>,
    pub email_content: Vec<AppSection>,
}

impl DigestPayload {
    /// One-click unsubscribe headers (RFC 8058).
    pub fn list_unsubscribe_headers(&self) -> Vec<(&'static str, String)> {
        list_unsubscribe_headers(&self.template.unsubscribe_url)
    }
}

pub fn list_unsubscribe_headers(unsubscribe_url: &str) -> Vec<(&'static str, String)> {
    if unsubscribe_url.is_empty() {
        return Vec::new();
    }
    vec![
        ("List-Unsubscribe", format!("<{}>", unsubscribe_url)),
        ("List-Unsubscribe-Post", "List-Unsubscribe=One-Click".to_string()),
    ]
}

pub fn unsubscribe_link(
    config: &DigestConfig,
    username: &str,
    patch: &UnsubscribePatch,
) -> AppResult<String> {
    let encrypted_username = email_crypto::encrypt_string(username)?;
    let encrypted_patch = email_crypto::encrypt_object(patch)?;
    Ok(format!(
        "{}/preferences-unsubscribe/{}/{}",
        config.learning_mfe_url, encrypted_username, encrypted_patch
    ))
}

/// `Today`, whole days below a week, whole weeks above.
pub fn time_ago(created_at: NaiveDateTime, reference: NaiveDateTime) -> String {
    let days = (reference - created_at).num_days().max(0);
    match days {
        0 => "Today".to_string(),
        d if d >= 7 => format!("{}w", d / 7),
        d => format!("{}d", d),
    }
}

/// Substitute `{key}` placeholders from `context`. Unknown keys render empty;
/// braces around anything that is not a plain key are kept.
pub fn render_content(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close)
                if close > 0
                    && after[..close]
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
            {
                out.push_str(&context_text(context.get(&after[..close])));
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn context_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Python-style title case: upper-case every letter that follows a
/// non-letter.
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_word_start = true;
    for c in name.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

fn translated_app_title(app_name: &str) -> Option<&'static str> {
    match app_name {
        "discussion" => Some("Discussion"),
        "updates" => Some("Updates"),
        "grading" => Some("Grades"),
        _ => None,
    }
}

fn section_priority(title: &str) -> u8 {
    match title {
        "Updates" => 1,
        "Grading" => 2,
        "Discussion" => 3,
        _ => 4,
    }
}

pub fn view_text(app_name: &str) -> &'static str {
    match app_name {
        "discussion" => "discussion",
        "updates" => "update",
        "grading" => "assessment",
        _ => "",
    }
}

/// Group newest-first items by app (first appearance order), cap each group
/// and order groups `Updates, Grading, Discussion`, then the rest.
pub fn group_into_sections(items: Vec<DigestItem>, learner_home_url: &str) -> Vec<AppSection> {
    let mut sections: Vec<AppSection> = Vec::new();

    for item in items {
        let index = match sections.iter().position(|s| s.app_name == item.app_name) {
            Some(index) => index,
            None => {
                let title = title_case(&item.app_name);
                sections.push(AppSection {
                    translated_title: translated_app_title(&item.app_name)
                        .map(str::to_string)
                        .unwrap_or_else(|| title.clone()),
                    title,
                    url: format!(
                        "{}/?showNotifications=true&app={}",
                        learner_home_url, item.app_name
                    ),
                    app_name: item.app_name.clone(),
                    notifications: Vec::new(),
                    total: 0,
                    show_remaining_count: false,
                    remaining_count: 0,
                });
                sections.len() - 1
            }
        };
        let section = &mut sections[index];
        section.total += 1;
        if section.notifications.len() < NOTIFICATIONS_PER_APP {
            section.notifications.push(item);
        }
    }

    for section in &mut sections {
        section.remaining_count = section.total.saturating_sub(NOTIFICATIONS_PER_APP);
        section.show_remaining_count = section.total > NOTIFICATIONS_PER_APP;
    }

    // Stable: apps sharing a priority keep first-appearance order.
    sections.sort_by_key(|s| section_priority(&s.title));
    sections
}

pub fn summary_rows(sections: &[AppSection]) -> Vec<DigestSummaryRow> {
    let mut rows: Vec<DigestSummaryRow> = sections
        .iter()
        .map(|s| DigestSummaryRow {
            title: s.title.clone(),
            translated_title: s.translated_title.clone(),
            count: s.total,
        })
        .collect();
    rows.push(DigestSummaryRow {
        title: TOTAL_ROW_TITLE.to_string(),
        translated_title: TOTAL_ROW_TITLE.to_string(),
        count: sections.iter().map(|s| s.total).sum(),
    });
    rows
}

pub struct DigestService {
    db: DatabaseConnection,
    store: PreferenceStore,
    config: DigestConfig,
}

impl DigestService {
    pub fn new(db: DatabaseConnection, config: DigestConfig) -> Self {
        Self {
            store: PreferenceStore::new(db.clone()),
            db,
            config,
        }
    }

    pub fn with_store(store: PreferenceStore, config: DigestConfig) -> Self {
        Self {
            db: store.db().clone(),
            store,
            config,
        }
    }

    fn schema(&self) -> &PreferenceSchema {
        self.store.schema()
    }

    /// Users with at least one notification inside the window.
    pub async fn users_with_notifications(&self, window: &DigestWindow) -> AppResult<Vec<UserModel>> {
        let user_ids: Vec<i32> = Notification::find()
            .select_only()
            .column(notification::Column::UserId)
            .distinct()
            .filter(notification::Column::CreatedAt.gte(window.start))
            .filter(notification::Column::CreatedAt.lt(window.end))
            .into_tuple::<i32>()
            .all(&self.db)
            .await?;

        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = User::find()
            .filter(user::Column::Id.is_in(user_ids))
            .order_by_asc(user::Column::Id)
            .all(&self.db)
            .await?;
        Ok(users)
    }

    /// `None` when nothing in the window is enabled for email at `cadence`.
    pub async fn build_digest(
        &self,
        user: &UserModel,
        window: &DigestWindow,
        cadence: EmailCadence,
    ) -> AppResult<Option<DigestPayload>> {
        if !cadence.is_digest() {
            return Err(AppError::Validation(format!(
                "Invalid cadence_type '{}' for digest",
                cadence
            )));
        }

        let notifications = Notification::find()
            .filter(notification::Column::UserId.eq(user.id))
            .filter(notification::Column::CreatedAt.gte(window.start))
            .filter(notification::Column::CreatedAt.lt(window.end))
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .all(&self.db)
            .await?;

        if notifications.is_empty() {
            return Ok(None);
        }

        let course_documents: HashMap<String, LoadedPreference> = self
            .store
            .get_all_for_user(user.id)
            .await?
            .into_iter()
            .map(|loaded| (loaded.row.course_id.clone(), loaded))
            .collect();

        let types: BTreeSet<(String, String)> = notifications
            .iter()
            .map(|n| (n.app_name.clone(), n.notification_type.clone()))
            .collect();
        let account: HashMap<(String, String), NotificationPreferenceModel> = self
            .store
            .ensure_account_preferences(user.id, &types)
            .await?
            .into_iter()
            .map(|p| ((p.app.clone(), p.notification_type.clone()), p))
            .collect();

        let selected: Vec<NotificationModel> = notifications
            .into_iter()
            .filter(|n| self.email_enabled_at(n, cadence, &course_documents, &account))
            .collect();

        if selected.is_empty() {
            tracing::debug!(
                "No {} digest content for user {} in window",
                cadence,
                user.id
            );
            return Ok(None);
        }

        let course_names = self.course_names(&selected).await?;
        let items = selected
            .iter()
            .map(|n| self.enrich(n, &course_names, window))
            .collect();
        let sections = group_into_sections(items, &self.config.learner_home_mfe_url);

        let payload = DigestPayload {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            template: EmailTemplateContext::new(&self.config, &user.username)?,
            start_date: window.start.format(DATE_FORMAT).to_string(),
            end_date: window.end.format(DATE_FORMAT).to_string(),
            digest_frequency: cadence,
            email_digest_updates: summary_rows(&sections),
            email_content: sections,
        };

        tracing::info!(
            "Built {} digest for user {} with {} notifications",
            cadence,
            user.id,
            selected.len()
        );
        Ok(Some(payload))
    }

    /// The course document wins when it knows the type; otherwise the
    /// account-level row decides.
    fn email_enabled_at(
        &self,
        n: &NotificationModel,
        cadence: EmailCadence,
        course_documents: &HashMap<String, LoadedPreference>,
        account: &HashMap<(String, String), NotificationPreferenceModel>,
    ) -> bool {
        let course_choice = n
            .course_id
            .as_ref()
            .and_then(|course_id| course_documents.get(course_id))
            .and_then(|loaded| {
                loaded
                    .document
                    .effective_config(&n.app_name, &n.notification_type)
            })
            .map(|channels| channels.email && channels.email_cadence == cadence);
        if let Some(enabled) = course_choice {
            return enabled;
        }

        let key = (n.app_name.clone(), n.notification_type.clone());
        match account.get(&key) {
            Some(pref) => match pref.cadence() {
                Ok(stored) => pref.email && stored == cadence,
                Err(e) => {
                    tracing::warn!(
                        "Ignoring account preference {} with bad cadence: {}",
                        pref.id,
                        e
                    );
                    false
                }
            },
            None => false,
        }
    }

    async fn course_names(&self, notifications: &[NotificationModel]) -> AppResult<HashMap<String, String>> {
        let course_ids: BTreeSet<String> = notifications
            .iter()
            .filter_map(|n| n.course_id.clone())
            .collect();
        if course_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let overviews = CourseOverview::find()
            .filter(course_overview::Column::CourseId.is_in(course_ids))
            .all(&self.db)
            .await?;
        Ok(overviews
            .into_iter()
            .map(|c| (c.course_id, c.display_name))
            .collect())
    }

    fn enrich(
        &self,
        n: &NotificationModel,
        course_names: &HashMap<String, String>,
        window: &DigestWindow,
    ) -> DigestItem {
        let spec = self
            .schema()
            .notification_type(&n.notification_type)
            .map(|(_, spec)| spec);

        let icon_url = spec
            .filter(|s| !s.icon.is_empty())
            .map(|s| format!("{}/{}.png", self.config.icon_base_url, s.icon))
            .unwrap_or_default();
        let content = spec
            .map(|s| render_content(&s.content_template, &n.content_context))
            .unwrap_or_default();

        DigestItem {
            id: n.id,
            app_name: n.app_name.clone(),
            notification_type: n.notification_type.clone(),
            course_id: n.course_id.clone(),
            course_name: n
                .course_id
                .as_ref()
                .and_then(|id| course_names.get(id))
                .cloned()
                .unwrap_or_default(),
            icon_url,
            time_ago: time_ago(n.created_at, window.end),
            content,
            details: context_text(n.content_context.get("email_content")),
            view_text: view_text(&n.app_name).to_string(),
            content_url: n.content_url.clone(),
            created_at: n.created_at,
        }
    }
}
