use crate::models::preference_document::PreferenceDocument;
use crate::schema::{Channel, PreferenceSchema};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("stored preference document is corrupt: {0}")]
    CorruptDocument(#[from] serde_json::Error),
}

/// Rebuilds stale preference documents against the current schema.
#[derive(Debug, Clone)]
pub struct PreferenceMigrator {
    schema: Arc<PreferenceSchema>,
}

impl PreferenceMigrator {
    pub fn new(schema: Arc<PreferenceSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &PreferenceSchema {
        &self.schema
    }

    /// Start from the current defaults and carry over whatever the user could
    /// have changed: app `enabled`, every editable channel, and the cadence
    /// when email is editable. Apps the schema no longer knows are dropped.
    pub fn migrate(&self, old: &PreferenceDocument, email_opted_out: bool) -> PreferenceDocument {
        let mut migrated = self.schema.default_document(email_opted_out);

        for (app_name, new_app) in migrated.apps_mut() {
            let Some(old_app) = old.app(app_name) else {
                continue;
            };
            new_app.enabled = old_app.enabled;

            for (type_name, new_channels) in new_app.notification_types.iter_mut() {
                let Some(old_channels) = old_app.notification_types.get(type_name) else {
                    continue;
                };
                for channel in Channel::ALL {
                    if self.schema.is_channel_editable(app_name, type_name, channel) {
                        new_channels.set(channel, old_channels.get(channel));
                    }
                }
                if self
                    .schema
                    .is_channel_editable(app_name, type_name, Channel::Email)
                {
                    new_channels.email_cadence = old_channels.email_cadence;
                }
            }
        }

        migrated
    }

    pub fn migrate_value(
        &self,
        old: &Value,
        email_opted_out: bool,
    ) -> Result<PreferenceDocument, MigrationError> {
        let document = PreferenceDocument::from_value(old)?;
        Ok(self.migrate(&document, email_opted_out))
    }
}
