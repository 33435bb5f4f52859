//! Typed form of the per-course preference document.
//!
//! The stored JSON blob keeps the shape
//! `{app: {enabled, core_notification_types, notification_types, non_editable}}`
//! where `notification_types` holds one entry per non-core type plus a
//! `"core"` entry shared by every type listed in `core_notification_types`.
//! Conversion to and from `serde_json::Value` happens only at the storage
//! boundary.

use crate::schema::{Channel, EmailCadence};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const CORE_TYPE: &str = "core";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeChannels {
    #[serde(default)]
    pub web: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub email_cadence: EmailCadence,
    #[serde(default)]
    pub info: String,
}

impl TypeChannels {
    pub fn get(&self, channel: Channel) -> bool {
        match channel {
            Channel::Web => self.web,
            Channel::Push => self.push,
            Channel::Email => self.email,
        }
    }

    /// Returns true when the stored value actually changed.
    pub fn set(&mut self, channel: Channel, value: bool) -> bool {
        let slot = match channel {
            Channel::Web => &mut self.web,
            Channel::Push => &mut self.push,
            Channel::Email => &mut self.email,
        };
        let changed = *slot != value;
        *slot = value;
        changed
    }

    pub fn enabled_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.get(*c))
            .collect()
    }

    pub fn is_enabled_for_any_channel(&self) -> bool {
        self.web || self.push || self.email
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPreferences {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub core_notification_types: Vec<String>,
    #[serde(default)]
    pub notification_types: BTreeMap<String, TypeChannels>,
    #[serde(default)]
    pub non_editable: BTreeMap<String, Vec<Channel>>,
}

impl AppPreferences {
    pub fn is_core(&self, type_name: &str) -> bool {
        self.core_notification_types.iter().any(|t| t == type_name)
    }

    pub fn core_config(&self) -> Option<&TypeChannels> {
        self.notification_types.get(CORE_TYPE)
    }

    /// Core types resolve through the app's `core` entry.
    pub fn effective_config(&self, type_name: &str) -> Option<&TypeChannels> {
        if self.is_core(type_name) {
            self.core_config()
        } else {
            self.notification_types.get(type_name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferenceDocument {
    apps: BTreeMap<String, AppPreferences>,
}

impl PreferenceDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Best-effort read of a document that failed strict parsing: apps that do
    /// not parse are left out.
    pub fn salvage(value: &Value) -> Self {
        let apps = value
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(name, app)| {
                        AppPreferences::deserialize(app)
                            .ok()
                            .map(|parsed| (name.clone(), parsed))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { apps }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn insert_app(&mut self, name: &str, app: AppPreferences) {
        self.apps.insert(name.to_string(), app);
    }

    pub fn app(&self, name: &str) -> Option<&AppPreferences> {
        self.apps.get(name)
    }

    pub fn app_mut(&mut self, name: &str) -> Option<&mut AppPreferences> {
        self.apps.get_mut(name)
    }

    pub fn apps(&self) -> impl Iterator<Item = (&String, &AppPreferences)> {
        self.apps.iter()
    }

    pub fn apps_mut(&mut self) -> impl Iterator<Item = (&String, &mut AppPreferences)> {
        self.apps.iter_mut()
    }

    pub fn app_names(&self) -> Vec<&str> {
        self.apps.keys().map(String::as_str).collect()
    }

    pub fn is_core(&self, app_name: &str, type_name: &str) -> bool {
        self.app(app_name).is_some_and(|app| app.is_core(type_name))
    }

    pub fn core_config(&self, app_name: &str) -> Option<&TypeChannels> {
        self.app(app_name).and_then(AppPreferences::core_config)
    }

    pub fn type_config(&self, app_name: &str, type_name: &str) -> Option<&TypeChannels> {
        self.app(app_name)
            .and_then(|app| app.notification_types.get(type_name))
    }

    pub fn effective_config(&self, app_name: &str, type_name: &str) -> Option<&TypeChannels> {
        self.app(app_name)
            .and_then(|app| app.effective_config(type_name))
    }

    pub fn is_enabled_for_any_channel(&self, app_name: &str, type_name: &str) -> bool {
        self.effective_config(app_name, type_name)
            .is_some_and(TypeChannels::is_enabled_for_any_channel)
    }

    pub fn channels_for(&self, app_name: &str, type_name: &str) -> Vec<Channel> {
        self.effective_config(app_name, type_name)
            .map(TypeChannels::enabled_channels)
            .unwrap_or_default()
    }

    pub fn is_web_enabled_for(&self, app_name: &str, type_name: &str) -> bool {
        self.effective_config(app_name, type_name)
            .is_some_and(|c| c.web)
    }

    pub fn is_email_enabled_for(&self, app_name: &str, type_name: &str) -> bool {
        self.effective_config(app_name, type_name)
            .is_some_and(|c| c.email)
    }

    pub fn email_cadence_for(&self, app_name: &str, type_name: &str) -> EmailCadence {
        self.effective_config(app_name, type_name)
            .map(|c| c.email_cadence)
            .unwrap_or_default()
    }

    /// Names of every type with email on at `cadence`; a matching `core`
    /// entry expands to the app's core type list.
    pub fn email_enabled_types_for_cadence(&self, cadence: EmailCadence) -> BTreeSet<String> {
        let mut enabled = BTreeSet::new();
        for app in self.apps.values() {
            for (type_name, channels) in &app.notification_types {
                if !channels.email || channels.email_cadence != cadence {
                    continue;
                }
                if type_name == CORE_TYPE {
                    enabled.extend(app.core_notification_types.iter().cloned());
                } else {
                    enabled.insert(type_name.clone());
                }
            }
        }
        enabled
    }
}
