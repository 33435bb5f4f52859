//! Bulk preference changes, as carried by one-click unsubscribe links.

use crate::error::{AppError, AppResult};
use crate::models::preference_document::{PreferenceDocument, CORE_TYPE};
use crate::models::{user, User};
use crate::schema::{Channel, EmailCadence, PreferenceSchema};
use crate::services::preference_store::{MigrationOutcome, PreferenceStore};
use crate::utils::email_crypto;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use validator::Validate;

/// Either every value or exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T> {
    All,
    Exactly(T),
}

impl<T> Selector<T> {
    pub fn is_all(&self) -> bool {
        matches!(self, Selector::All)
    }

    pub fn matches<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        match self {
            Selector::All => true,
            Selector::Exactly(expected) => expected.borrow() == value,
        }
    }
}

impl<T> From<Option<T>> for Selector<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Selector::All, Selector::Exactly)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferencePatch {
    pub app: Selector<String>,
    pub notification_type: Selector<String>,
    pub channel: Selector<Channel>,
    pub value: bool,
    /// `None` patches every active course of the user.
    pub course_id: Option<String>,
}

impl PreferencePatch {
    /// Sets `value` on every editable channel of every type.
    pub fn everything(value: bool) -> Self {
        Self {
            app: Selector::All,
            notification_type: Selector::All,
            channel: Selector::All,
            value,
            course_id: None,
        }
    }

    pub fn app(mut self, app: &str) -> Self {
        self.app = Selector::Exactly(app.to_string());
        self
    }

    pub fn notification_type(mut self, type_name: &str) -> Self {
        self.notification_type = Selector::Exactly(type_name.to_string());
        self
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Selector::Exactly(channel);
        self
    }

    pub fn course(mut self, course_id: &str) -> Self {
        self.course_id = Some(course_id.to_string());
        self
    }

    /// "Stop all emails": no app or type scope, email channel, off.
    pub fn is_global_email_opt_out(&self) -> bool {
        self.app.is_all()
            && self.notification_type.is_all()
            && self.channel == Selector::Exactly(Channel::Email)
            && !self.value
    }

    fn matches_type(&self, app_core_types: &[String], type_name: &str) -> bool {
        if self.notification_type.matches(type_name) {
            return true;
        }
        // A core type name addresses the shared core entry.
        type_name == CORE_TYPE
            && matches!(&self.notification_type, Selector::Exactly(name) if app_core_types.contains(name))
    }
}

/// Patch as it travels inside an encrypted unsubscribe token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UnsubscribePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128, message = "app_name must be 1-128 characters"))]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128, message = "notification_type must be 1-128 characters"))]
    pub notification_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 16, message = "channel must be 1-16 characters"))]
    pub channel: Option<String>,
    #[serde(default)]
    pub value: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255, message = "course_id must be 1-255 characters"))]
    pub course_id: Option<String>,
}

impl UnsubscribePatch {
    /// The patch behind the digest footer's unsubscribe link.
    pub fn email_opt_out() -> Self {
        Self {
            channel: Some(Channel::Email.to_string()),
            value: false,
            ..Default::default()
        }
    }
}

impl TryFrom<UnsubscribePatch> for PreferencePatch {
    type Error = AppError;

    fn try_from(wire: UnsubscribePatch) -> Result<Self, Self::Error> {
        wire.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let channel = wire
            .channel
            .as_deref()
            .map(str::parse::<Channel>)
            .transpose()?;

        Ok(Self {
            app: wire.app_name.into(),
            notification_type: wire.notification_type.into(),
            channel: channel.into(),
            value: wire.value,
            course_id: wire.course_id,
        })
    }
}

/// Apply `patch` to one document. Non-editable channels are skipped. Turning
/// email on for a type whose cadence is `Never` restores the default cadence.
/// Returns whether anything changed.
pub fn apply_to_document(
    schema: &PreferenceSchema,
    document: &mut PreferenceDocument,
    patch: &PreferencePatch,
) -> bool {
    let mut changed = false;

    for (app_name, app) in document.apps_mut() {
        if !patch.app.matches(app_name.as_str()) {
            continue;
        }
        let core_types = app.core_notification_types.clone();

        for (type_name, channels) in app.notification_types.iter_mut() {
            if !patch.matches_type(&core_types, type_name) {
                continue;
            }
            for channel in Channel::ALL {
                if !patch.channel.matches(&channel)
                    || !schema.is_channel_editable(app_name, type_name, channel)
                {
                    continue;
                }
                changed |= channels.set(channel, patch.value);

                if channel == Channel::Email
                    && patch.value
                    && channels.email_cadence == EmailCadence::Never
                {
                    if let Some(default) = schema.default_email_cadence(app_name, type_name) {
                        if default != channels.email_cadence {
                            channels.email_cadence = default;
                            changed = true;
                        }
                    }
                }
            }
        }
    }

    changed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchOutcome {
    pub documents_matched: usize,
    pub documents_changed: usize,
    pub email_opt_out_recorded: bool,
}

pub struct PreferencePatchService {
    db: DatabaseConnection,
    store: PreferenceStore,
}

impl PreferencePatchService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            store: PreferenceStore::new(db.clone()),
            db,
        }
    }

    pub fn with_store(store: PreferenceStore) -> Self {
        Self {
            db: store.db().clone(),
            store,
        }
    }

    pub async fn apply_patch(&self, user_id: i32, patch: &PreferencePatch) -> AppResult<PatchOutcome> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        self.store.ensure_enrolled_course_preferences(user_id).await?;

        let preferences = match &patch.course_id {
            Some(course_id) => {
                let row = self
                    .store
                    .find_active(user_id, course_id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                vec![self.store.refresh(row).await?]
            }
            None => self.store.get_all_for_user(user_id).await?,
        };

        let schema = self.store.schema().clone();
        let mut outcome = PatchOutcome {
            documents_matched: preferences.len(),
            ..Default::default()
        };

        for mut loaded in preferences {
            if !loaded.is_writable() {
                match &loaded.outcome {
                    MigrationOutcome::Failed { from_version, .. } => tracing::warn!(
                        "Skipping preferences of user {} in {}: stuck at v{}",
                        user_id,
                        loaded.row.course_id,
                        from_version
                    ),
                    _ => tracing::warn!(
                        "Skipping preferences of user {} in {}: stored document is unreadable",
                        user_id,
                        loaded.row.course_id
                    ),
                }
                continue;
            }

            let changed = apply_to_document(&schema, &mut loaded.document, patch);
            if changed {
                self.store.save_document(&loaded.row, &loaded.document).await?;
                outcome.documents_changed += 1;
                tracing::info!(
                    event = "notification_preference_unsubscribe",
                    user_id,
                    course_id = %loaded.row.course_id,
                    "Notification preferences updated"
                );
            } else {
                tracing::debug!(
                    "Patch left preferences of user {} in {} unchanged",
                    user_id,
                    loaded.row.course_id
                );
            }
        }

        if patch.is_global_email_opt_out() {
            outcome.email_opt_out_recorded = self.store.record_email_opt_out(user_id).await?;
            self.store.disable_account_email(user_id).await?;
        }

        Ok(outcome)
    }

    /// Decode both tokens before touching the database; any decode failure
    /// rejects the whole request.
    pub async fn apply_unsubscribe_token(
        &self,
        encrypted_username: &str,
        encrypted_patch: &str,
    ) -> AppResult<PatchOutcome> {
        let username = email_crypto::decrypt_string(encrypted_username)?;
        let wire: UnsubscribePatch = email_crypto::decrypt_object(encrypted_patch)?;
        let patch = PreferencePatch::try_from(wire)?;

        let user = User::find()
            .filter(user::Column::Username.eq(username.as_str()))
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        self.apply_patch(user.id, &patch).await
    }
}
