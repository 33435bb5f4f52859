mod builtin;

use crate::error::AppError;
use crate::models::preference_document::{AppPreferences, PreferenceDocument, TypeChannels, CORE_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Bump whenever any app's type set, editability or defaults change.
pub const COURSE_NOTIFICATION_CONFIG_VERSION: i32 = 15;

static BUILTIN_SCHEMA: OnceLock<Arc<PreferenceSchema>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Web,
    Push,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Web, Channel::Push, Channel::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Push => "push",
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Channel::Web),
            "push" => Ok(Channel::Push),
            "email" => Ok(Channel::Email),
            other => Err(AppError::Validation(format!(
                "Unknown notification channel '{}'",
                other
            ))),
        }
    }
}

/// How often email notifications of a type are batched for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EmailCadence {
    #[default]
    Never,
    Immediately,
    Daily,
    Weekly,
}

impl EmailCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailCadence::Never => "Never",
            EmailCadence::Immediately => "Immediately",
            EmailCadence::Daily => "Daily",
            EmailCadence::Weekly => "Weekly",
        }
    }

    /// Digests are only built for batched cadences.
    pub fn is_digest(&self) -> bool {
        matches!(self, EmailCadence::Daily | EmailCadence::Weekly)
    }
}

impl fmt::Display for EmailCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailCadence {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Never" => Ok(EmailCadence::Never),
            "Immediately" => Ok(EmailCadence::Immediately),
            "Daily" => Ok(EmailCadence::Daily),
            "Weekly" => Ok(EmailCadence::Weekly),
            other => Err(AppError::Validation(format!(
                "Invalid cadence_type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTypeSpec {
    pub name: String,
    pub is_core: bool,
    pub web: bool,
    pub push: bool,
    pub email: bool,
    pub email_cadence: EmailCadence,
    pub non_editable: Vec<Channel>,
    pub info: String,
    pub icon: String,
    pub content_template: String,
}

impl NotificationTypeSpec {
    /// A non-core type with every channel editable and no content template.
    pub fn new(name: &str, web: bool, push: bool, email: bool, email_cadence: EmailCadence) -> Self {
        Self {
            name: name.to_string(),
            is_core: false,
            web,
            push,
            email,
            email_cadence,
            non_editable: Vec::new(),
            info: String::new(),
            icon: String::new(),
            content_template: String::new(),
        }
    }

    /// A type governed by its app's core settings.
    pub fn core(name: &str) -> Self {
        Self {
            is_core: true,
            ..Self::new(name, false, false, false, EmailCadence::Never)
        }
    }

    pub fn non_editable(mut self, channels: &[Channel]) -> Self {
        self.non_editable = channels.to_vec();
        self
    }

    pub fn info(mut self, info: &str) -> Self {
        self.info = info.to_string();
        self
    }

    pub fn icon(mut self, icon: &str) -> Self {
        self.icon = icon.to_string();
        self
    }

    pub fn content_template(mut self, template: &str) -> Self {
        self.content_template = template.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSpec {
    pub name: String,
    pub enabled: bool,
    pub core_info: String,
    pub core_web: bool,
    pub core_push: bool,
    pub core_email: bool,
    pub core_email_cadence: EmailCadence,
    /// Channels locked for every core type of this app.
    pub core_non_editable: Vec<Channel>,
    pub types: Vec<NotificationTypeSpec>,
}

impl AppSpec {
    pub fn new(name: &str, core_web: bool, core_push: bool, core_email: bool, core_email_cadence: EmailCadence) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            core_info: String::new(),
            core_web,
            core_push,
            core_email,
            core_email_cadence,
            core_non_editable: Vec::new(),
            types: Vec::new(),
        }
    }

    pub fn core_info(mut self, info: &str) -> Self {
        self.core_info = info.to_string();
        self
    }

    pub fn core_non_editable(mut self, channels: &[Channel]) -> Self {
        self.core_non_editable = channels.to_vec();
        self
    }

    pub fn with_type(mut self, spec: NotificationTypeSpec) -> Self {
        self.types.push(spec);
        self
    }

    pub fn notification_type(&self, name: &str) -> Option<&NotificationTypeSpec> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn core_type_names(&self) -> Vec<String> {
        self.types
            .iter()
            .filter(|t| t.is_core)
            .map(|t| t.name.clone())
            .collect()
    }

    fn core_defaults(&self, email_opted_out: bool) -> TypeChannels {
        TypeChannels {
            web: self.core_web,
            push: self.core_push,
            email: self.core_email && !email_opted_out,
            email_cadence: self.core_email_cadence,
            info: self.core_info.clone(),
        }
    }

    /// The app's section of a freshly created preference document.
    pub fn default_preferences(&self, email_opted_out: bool) -> AppPreferences {
        let mut notification_types = BTreeMap::new();
        let mut non_editable = BTreeMap::new();

        for spec in self.types.iter().filter(|t| !t.is_core) {
            notification_types.insert(
                spec.name.clone(),
                TypeChannels {
                    web: spec.web,
                    push: spec.push,
                    email: spec.email && !email_opted_out,
                    email_cadence: spec.email_cadence,
                    info: spec.info.clone(),
                },
            );
            if !spec.non_editable.is_empty() {
                non_editable.insert(spec.name.clone(), spec.non_editable.clone());
            }
        }

        notification_types.insert(CORE_TYPE.to_string(), self.core_defaults(email_opted_out));
        if !self.core_non_editable.is_empty() {
            non_editable.insert(CORE_TYPE.to_string(), self.core_non_editable.clone());
        }

        AppPreferences {
            enabled: self.enabled,
            core_notification_types: self.core_type_names(),
            notification_types,
            non_editable,
        }
    }
}

/// Schema defaults for an account-level preference row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDefaults {
    pub app: String,
    pub web: bool,
    pub push: bool,
    pub email: bool,
    pub email_cadence: EmailCadence,
}

/// The typed registry of notification apps and types, stamped with a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceSchema {
    version: i32,
    apps: Vec<AppSpec>,
}

impl PreferenceSchema {
    pub fn new(version: i32, apps: Vec<AppSpec>) -> Self {
        Self { version, apps }
    }

    /// The schema this platform ships with.
    pub fn builtin() -> Arc<PreferenceSchema> {
        BUILTIN_SCHEMA
            .get_or_init(|| Arc::new(builtin::course_notification_schema()))
            .clone()
    }

    pub fn current_version(&self) -> i32 {
        self.version
    }

    pub fn apps(&self) -> &[AppSpec] {
        &self.apps
    }

    pub fn app(&self, name: &str) -> Option<&AppSpec> {
        self.apps.iter().find(|a| a.name == name)
    }

    /// Type names are unique across apps.
    pub fn notification_type(&self, name: &str) -> Option<(&AppSpec, &NotificationTypeSpec)> {
        self.apps
            .iter()
            .find_map(|app| app.notification_type(name).map(|spec| (app, spec)))
    }

    pub fn default_document(&self, email_opted_out: bool) -> PreferenceDocument {
        let mut document = PreferenceDocument::new();
        for app in &self.apps {
            document.insert_app(&app.name, app.default_preferences(email_opted_out));
        }
        document
    }

    /// Whether a user may change `channel` for `(app, type)`. Core types and
    /// the `core` entry follow the app's core lock list.
    pub fn is_channel_editable(&self, app_name: &str, type_name: &str, channel: Channel) -> bool {
        let Some(app) = self.app(app_name) else {
            return false;
        };
        if type_name == CORE_TYPE {
            return !app.core_non_editable.contains(&channel);
        }
        match app.notification_type(type_name) {
            Some(spec) if spec.is_core => !app.core_non_editable.contains(&channel),
            Some(spec) => !spec.non_editable.contains(&channel),
            None => false,
        }
    }

    pub fn default_email_cadence(&self, app_name: &str, type_name: &str) -> Option<EmailCadence> {
        let app = self.app(app_name)?;
        if type_name == CORE_TYPE {
            return Some(app.core_email_cadence);
        }
        let spec = app.notification_type(type_name)?;
        if spec.is_core {
            Some(app.core_email_cadence)
        } else {
            Some(spec.email_cadence)
        }
    }

    pub fn default_account_preference(&self, type_name: &str) -> Option<AccountDefaults> {
        let (app, spec) = self.notification_type(type_name)?;
        let defaults = if spec.is_core {
            AccountDefaults {
                app: app.name.clone(),
                web: app.core_web,
                push: app.core_push,
                email: app.core_email,
                email_cadence: app.core_email_cadence,
            }
        } else {
            AccountDefaults {
                app: app.name.clone(),
                web: spec.web,
                push: spec.push,
                email: spec.email,
                email_cadence: spec.email_cadence,
            }
        };
        Some(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> PreferenceSchema {
        PreferenceSchema::new(
            3,
            vec![AppSpec::new("discussion", true, false, true, EmailCadence::Daily)
                .core_non_editable(&[Channel::Web])
                .with_type(NotificationTypeSpec::core("new_response"))
                .with_type(
                    NotificationTypeSpec::new("new_discussion_post", false, false, true, EmailCadence::Weekly)
                        .non_editable(&[Channel::Push]),
                )],
        )
    }

    #[test]
    fn default_document_carries_core_entry() {
        let doc = schema().default_document(false);
        let app = doc.app("discussion").unwrap();
        assert_eq!(app.core_notification_types, vec!["new_response".to_string()]);
        let core = app.notification_types.get(CORE_TYPE).unwrap();
        assert!(core.web);
        assert!(core.email);
        assert_eq!(core.email_cadence, EmailCadence::Daily);
        assert!(!app.notification_types.contains_key("new_response"));
        assert_eq!(app.non_editable.get(CORE_TYPE), Some(&vec![Channel::Web]));
    }

    #[test]
    fn opted_out_document_disables_email_everywhere() {
        let doc = schema().default_document(true);
        let app = doc.app("discussion").unwrap();
        assert!(app.notification_types.values().all(|t| !t.email));
        assert!(app.notification_types.get(CORE_TYPE).unwrap().web);
    }

    #[test]
    fn editability_follows_core_and_type_locks() {
        let s = schema();
        assert!(!s.is_channel_editable("discussion", "new_response", Channel::Web));
        assert!(!s.is_channel_editable("discussion", CORE_TYPE, Channel::Web));
        assert!(s.is_channel_editable("discussion", CORE_TYPE, Channel::Email));
        assert!(!s.is_channel_editable("discussion", "new_discussion_post", Channel::Push));
        assert!(s.is_channel_editable("discussion", "new_discussion_post", Channel::Web));
        assert!(!s.is_channel_editable("discussion", "unknown", Channel::Web));
        assert!(!s.is_channel_editable("grading", CORE_TYPE, Channel::Web));
    }

    #[test]
    fn default_cadence_resolves_core_types_through_app() {
        let s = schema();
        assert_eq!(s.default_email_cadence("discussion", CORE_TYPE), Some(EmailCadence::Daily));
        assert_eq!(s.default_email_cadence("discussion", "new_response"), Some(EmailCadence::Daily));
        assert_eq!(
            s.default_email_cadence("discussion", "new_discussion_post"),
            Some(EmailCadence::Weekly)
        );
        assert_eq!(s.default_email_cadence("discussion", "missing"), None);
    }

    #[test]
    fn account_defaults_for_core_type_use_app_core_values() {
        let s = schema();
        let core = s.default_account_preference("new_response").unwrap();
        assert_eq!(core.app, "discussion");
        assert!(core.web && core.email && !core.push);
        let plain = s.default_account_preference("new_discussion_post").unwrap();
        assert!(!plain.web);
        assert_eq!(plain.email_cadence, EmailCadence::Weekly);
        assert!(s.default_account_preference("nope").is_none());
    }

    #[test]
    fn cadence_parsing_rejects_unknown_values() {
        assert_eq!("Weekly".parse::<EmailCadence>().unwrap(), EmailCadence::Weekly);
        assert!(matches!(
            "Monthly".parse::<EmailCadence>(),
            Err(AppError::Validation(_))
        ));
        assert!("daily".parse::<EmailCadence>().is_err());
    }

    #[test]
    fn builtin_schema_is_consistent() {
        let s = PreferenceSchema::builtin();
        assert_eq!(s.current_version(), COURSE_NOTIFICATION_CONFIG_VERSION);
        let names: Vec<_> = s.apps().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["discussion", "updates", "grading"]);
        let mut seen = std::collections::HashSet::new();
        for app in s.apps() {
            for spec in &app.types {
                assert!(seen.insert(spec.name.clone()), "duplicate type {}", spec.name);
                assert!(!spec.content_template.is_empty());
            }
        }
    }
}
