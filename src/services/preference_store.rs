use crate::error::{AppError, AppResult};
use crate::models::preference_document::PreferenceDocument;
use crate::models::user_preference::ONE_CLICK_EMAIL_UNSUB_KEY;
use crate::models::{
    course_enrollment, course_notification_preference, notification_preference, user_preference,
    CourseEnrollment, CourseNotificationPreference, CourseNotificationPreferenceModel,
    NotificationPreference, NotificationPreferenceModel, UserPreference,
};
use crate::schema::{Channel, PreferenceSchema};
use crate::services::migrator::PreferenceMigrator;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// What happened to a stored document on its way out of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Current,
    Migrated { from_version: i32 },
    /// The stale row could not be migrated and was left as stored.
    Failed { from_version: i32, reason: String },
    /// A current-version row that does not parse; the document holds only the
    /// apps that did.
    Salvaged { reason: String },
}

#[derive(Debug, Clone)]
pub struct LoadedPreference {
    pub row: CourseNotificationPreferenceModel,
    pub document: PreferenceDocument,
    pub outcome: MigrationOutcome,
}

impl LoadedPreference {
    /// True while a migrated document has not been written back yet.
    pub fn needs_persist(&self, current_version: i32) -> bool {
        matches!(self.outcome, MigrationOutcome::Migrated { .. })
            && self.row.config_version != current_version
    }

    /// False when `document` is a partial read of the stored row and writing
    /// it back would drop apps.
    pub fn is_writable(&self) -> bool {
        !matches!(
            self.outcome,
            MigrationOutcome::Failed { .. } | MigrationOutcome::Salvaged { .. }
        )
    }
}

#[derive(Clone)]
pub struct PreferenceStore {
    db: DatabaseConnection,
    schema: Arc<PreferenceSchema>,
    migrator: PreferenceMigrator,
}

impl PreferenceStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_schema(db, PreferenceSchema::builtin())
    }

    pub fn with_schema(db: DatabaseConnection, schema: Arc<PreferenceSchema>) -> Self {
        Self {
            db,
            migrator: PreferenceMigrator::new(schema.clone()),
            schema,
        }
    }

    pub fn schema(&self) -> &Arc<PreferenceSchema> {
        &self.schema
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn is_email_opted_out(&self, user_id: i32) -> AppResult<bool> {
        let marker = UserPreference::find()
            .filter(user_preference::Column::UserId.eq(user_id))
            .filter(user_preference::Column::Key.eq(ONE_CLICK_EMAIL_UNSUB_KEY))
            .one(&self.db)
            .await?;
        Ok(marker.is_some())
    }

    /// Returns true when the marker did not exist before.
    pub async fn record_email_opt_out(&self, user_id: i32) -> AppResult<bool> {
        let marker = user_preference::ActiveModel {
            user_id: Set(user_id),
            key: Set(ONE_CLICK_EMAIL_UNSUB_KEY.to_string()),
            value: Set("true".to_string()),
            ..Default::default()
        };
        let inserted = UserPreference::insert(marker)
            .on_conflict(
                OnConflict::columns([user_preference::Column::UserId, user_preference::Column::Key])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(inserted > 0)
    }

    async fn find_row(
        &self,
        user_id: i32,
        course_id: &str,
    ) -> AppResult<Option<CourseNotificationPreferenceModel>> {
        let row = CourseNotificationPreference::find()
            .filter(course_notification_preference::Column::UserId.eq(user_id))
            .filter(course_notification_preference::Column::CourseId.eq(course_id))
            .one(&self.db)
            .await?;
        Ok(row)
    }

    fn new_row(
        &self,
        user_id: i32,
        course_id: &str,
        document: &serde_json::Value,
    ) -> course_notification_preference::ActiveModel {
        let now = chrono::Utc::now().naive_utc();
        course_notification_preference::ActiveModel {
            user_id: Set(user_id),
            course_id: Set(course_id.to_string()),
            notification_preference_config: Set(document.clone()),
            config_version: Set(self.schema.current_version()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
    }

    fn on_user_course_conflict() -> OnConflict {
        OnConflict::columns([
            course_notification_preference::Column::UserId,
            course_notification_preference::Column::CourseId,
        ])
        .do_nothing()
        .to_owned()
    }

    /// Insert-or-ignore followed by a re-read, so concurrent callers agree on
    /// a single row.
    async fn create_row(
        &self,
        user_id: i32,
        course_id: &str,
    ) -> AppResult<CourseNotificationPreferenceModel> {
        let opted_out = self.is_email_opted_out(user_id).await?;
        let document = self.schema.default_document(opted_out).to_value()?;

        let inserted = CourseNotificationPreference::insert(self.new_row(user_id, course_id, &document))
            .on_conflict(Self::on_user_course_conflict())
            .exec_without_returning(&self.db)
            .await?;
        if inserted > 0 {
            tracing::debug!(
                "Created notification preferences for user {} in {} (email opted out: {})",
                user_id,
                course_id,
                opted_out
            );
        }

        self.find_row(user_id, course_id).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "Preference row for user {} in {} vanished after insert",
                user_id,
                course_id
            ))
        })
    }

    fn resolve(&self, row: CourseNotificationPreferenceModel, email_opted_out: bool) -> LoadedPreference {
        let stored = &row.notification_preference_config;

        if row.config_version == self.schema.current_version() {
            return match PreferenceDocument::from_value(stored) {
                Ok(document) => LoadedPreference {
                    row,
                    document,
                    outcome: MigrationOutcome::Current,
                },
                Err(e) => {
                    tracing::warn!(
                        "Preference document {} (user {}, {}) does not parse, salvaging: {}",
                        row.id,
                        row.user_id,
                        row.course_id,
                        e
                    );
                    let document = PreferenceDocument::salvage(stored);
                    LoadedPreference {
                        row,
                        document,
                        outcome: MigrationOutcome::Salvaged {
                            reason: e.to_string(),
                        },
                    }
                }
            };
        }

        let from_version = row.config_version;
        match self.migrator.migrate_value(stored, email_opted_out) {
            Ok(document) => {
                tracing::info!(
                    "Migrated preferences of user {} in {} from v{} to v{}",
                    row.user_id,
                    row.course_id,
                    from_version,
                    self.schema.current_version()
                );
                LoadedPreference {
                    row,
                    document,
                    outcome: MigrationOutcome::Migrated { from_version },
                }
            }
            Err(e) => {
                tracing::error!(
                    "Failed to migrate preferences of user {} in {} from v{}: {}",
                    row.user_id,
                    row.course_id,
                    from_version,
                    e
                );
                let document = PreferenceDocument::salvage(stored);
                LoadedPreference {
                    row,
                    document,
                    outcome: MigrationOutcome::Failed {
                        from_version,
                        reason: e.to_string(),
                    },
                }
            }
        }
    }

    pub async fn find_active(
        &self,
        user_id: i32,
        course_id: &str,
    ) -> AppResult<Option<CourseNotificationPreferenceModel>> {
        Ok(self
            .find_row(user_id, course_id)
            .await?
            .filter(|row| row.is_active))
    }

    /// Fetch (creating if absent) the document for one course. A stale
    /// document comes back migrated but not yet written; see
    /// [`PreferenceStore::persist_migration`].
    pub async fn load(&self, user_id: i32, course_id: &str) -> AppResult<LoadedPreference> {
        let row = match self.find_row(user_id, course_id).await? {
            Some(row) => row,
            None => self.create_row(user_id, course_id).await?,
        };
        self.resolve_row(row).await
    }

    async fn resolve_row(&self, row: CourseNotificationPreferenceModel) -> AppResult<LoadedPreference> {
        let opted_out = if row.config_version != self.schema.current_version() {
            self.is_email_opted_out(row.user_id).await?
        } else {
            false
        };
        Ok(self.resolve(row, opted_out))
    }

    /// Bring an already fetched row to the current version and write it back.
    pub async fn refresh(&self, row: CourseNotificationPreferenceModel) -> AppResult<LoadedPreference> {
        let mut loaded = self.resolve_row(row).await?;
        self.persist_migration(&mut loaded).await?;
        Ok(loaded)
    }

    pub async fn persist_migration(&self, loaded: &mut LoadedPreference) -> AppResult<()> {
        if !loaded.needs_persist(self.schema.current_version()) {
            return Ok(());
        }
        loaded.row = self
            .write_document(&self.db, &loaded.row, &loaded.document)
            .await?;
        Ok(())
    }

    /// `load` with the migration written back.
    pub async fn get_or_create(&self, user_id: i32, course_id: &str) -> AppResult<LoadedPreference> {
        let mut loaded = self.load(user_id, course_id).await?;
        self.persist_migration(&mut loaded).await?;
        Ok(loaded)
    }

    pub async fn save_document(
        &self,
        row: &CourseNotificationPreferenceModel,
        document: &PreferenceDocument,
    ) -> AppResult<CourseNotificationPreferenceModel> {
        self.write_document(&self.db, row, document).await
    }

    async fn write_document<C: ConnectionTrait>(
        &self,
        conn: &C,
        row: &CourseNotificationPreferenceModel,
        document: &PreferenceDocument,
    ) -> AppResult<CourseNotificationPreferenceModel> {
        let mut active: course_notification_preference::ActiveModel = row.clone().into();
        active.notification_preference_config = Set(document.to_value()?);
        active.config_version = Set(self.schema.current_version());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        Ok(active.update(conn).await?)
    }

    /// Every active document of the user, stale ones migrated and written
    /// back in one transaction.
    pub async fn get_all_for_user(&self, user_id: i32) -> AppResult<Vec<LoadedPreference>> {
        let rows = CourseNotificationPreference::find()
            .filter(course_notification_preference::Column::UserId.eq(user_id))
            .filter(course_notification_preference::Column::IsActive.eq(true))
            .order_by_asc(course_notification_preference::Column::CourseId)
            .all(&self.db)
            .await?;

        let current = self.schema.current_version();
        let opted_out = if rows.iter().any(|r| r.config_version != current) {
            self.is_email_opted_out(user_id).await?
        } else {
            false
        };

        let mut loaded: Vec<LoadedPreference> = rows
            .into_iter()
            .map(|row| self.resolve(row, opted_out))
            .collect();

        if loaded.iter().any(|l| l.needs_persist(current)) {
            let txn = self.db.begin().await?;
            for entry in loaded.iter_mut().filter(|l| l.needs_persist(current)) {
                entry.row = self.write_document(&txn, &entry.row, &entry.document).await?;
            }
            txn.commit().await?;
        }

        Ok(loaded)
    }

    /// One row per active enrollment; existing rows are left alone. Returns
    /// how many rows were created.
    pub async fn ensure_enrolled_course_preferences(&self, user_id: i32) -> AppResult<u64> {
        let course_ids: Vec<String> = CourseEnrollment::find()
            .filter(course_enrollment::Column::UserId.eq(user_id))
            .filter(course_enrollment::Column::IsActive.eq(true))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|e| e.course_id)
            .collect();

        if course_ids.is_empty() {
            return Ok(0);
        }

        let opted_out = self.is_email_opted_out(user_id).await?;
        let document = self.schema.default_document(opted_out).to_value()?;
        let rows: Vec<_> = course_ids
            .iter()
            .map(|course_id| self.new_row(user_id, course_id, &document))
            .collect();

        let inserted = CourseNotificationPreference::insert_many(rows)
            .on_conflict(Self::on_user_course_conflict())
            .exec_without_returning(&self.db)
            .await?;
        if inserted > 0 {
            tracing::debug!(
                "Created {} enrollment preference rows for user {}",
                inserted,
                user_id
            );
        }
        Ok(inserted)
    }

    /// Soft delete; rows are never removed.
    pub async fn deactivate(&self, user_id: i32, course_id: &str) -> AppResult<()> {
        let result = CourseNotificationPreference::update_many()
            .col_expr(course_notification_preference::Column::IsActive, Expr::value(false))
            .col_expr(
                course_notification_preference::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().naive_utc()),
            )
            .filter(course_notification_preference::Column::UserId.eq(user_id))
            .filter(course_notification_preference::Column::CourseId.eq(course_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Turn email off on every account-level row of the user whose email
    /// channel is editable. Returns how many rows changed.
    pub async fn disable_account_email(&self, user_id: i32) -> AppResult<u64> {
        let ids: Vec<i32> = NotificationPreference::find()
            .filter(notification_preference::Column::UserId.eq(user_id))
            .filter(notification_preference::Column::Email.eq(true))
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|p| {
                self.schema
                    .is_channel_editable(&p.app, &p.notification_type, Channel::Email)
            })
            .map(|p| p.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let result = NotificationPreference::update_many()
            .col_expr(notification_preference::Column::Email, Expr::value(false))
            .col_expr(
                notification_preference::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().naive_utc()),
            )
            .filter(notification_preference::Column::Id.is_in(ids))
            .exec(&self.db)
            .await?;
        tracing::debug!(
            "Turned email off on {} account-level preferences of user {}",
            result.rows_affected,
            user_id
        );
        Ok(result.rows_affected)
    }

    /// Make sure an account-level row exists for every `(app, type)` pair,
    /// seeding missing ones from schema defaults (email off for opted-out
    /// users), and return the user's rows for those pairs. Pairs the schema
    /// does not know are skipped.
    pub async fn ensure_account_preferences(
        &self,
        user_id: i32,
        types: &BTreeSet<(String, String)>,
    ) -> AppResult<Vec<NotificationPreferenceModel>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }

        let opted_out = self.is_email_opted_out(user_id).await?;
        let now = chrono::Utc::now().naive_utc();
        let rows: Vec<notification_preference::ActiveModel> = types
            .iter()
            .filter_map(|(app, type_name)| {
                let Some(defaults) = self
                    .schema
                    .default_account_preference(type_name)
                    .filter(|d| &d.app == app)
                else {
                    tracing::debug!("No schema defaults for {}/{}, skipping", app, type_name);
                    return None;
                };
                Some(notification_preference::ActiveModel {
                    user_id: Set(user_id),
                    app: Set(defaults.app),
                    notification_type: Set(type_name.clone()),
                    web: Set(defaults.web),
                    push: Set(defaults.push),
                    email: Set(defaults.email && !opted_out),
                    email_cadence: Set(defaults.email_cadence.to_string()),
                    is_active: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                })
            })
            .collect();

        if !rows.is_empty() {
            let inserted = NotificationPreference::insert_many(rows)
                .on_conflict(
                    OnConflict::columns([
                        notification_preference::Column::UserId,
                        notification_preference::Column::App,
                        notification_preference::Column::NotificationType,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await?;
            if inserted > 0 {
                tracing::debug!(
                    "Seeded {} account-level preferences for user {}",
                    inserted,
                    user_id
                );
            }
        }

        let existing = NotificationPreference::find()
            .filter(notification_preference::Column::UserId.eq(user_id))
            .filter(notification_preference::Column::IsActive.eq(true))
            .all(&self.db)
            .await?;

        Ok(existing
            .into_iter()
            .filter(|p| types.contains(&(p.app.clone(), p.notification_type.clone())))
            .collect())
    }
}
