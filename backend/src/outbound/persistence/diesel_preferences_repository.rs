//! PostgreSQL-backed `PreferencesRepository`.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::UserId;
use crate::domain::notifications::{NotificationPreferences, QuietHours};
use crate::domain::ports::{PreferencesRepository, PreferencesRepositoryError};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::models::PreferencesRow;
use super::pool::DbPool;
use super::schema::notification_preferences;

#[derive(Clone)]
pub struct DieselPreferencesRepository {
    pool: DbPool,
}

impl DieselPreferencesRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(PreferencesRepositoryError);

/// Decode a stored row. Shared with the recipient directory.
pub(super) fn row_to_preferences(row: PreferencesRow) -> Result<NotificationPreferences, String> {
    let quiet_hours = match (row.quiet_start.as_deref(), row.quiet_end.as_deref()) {
        (Some(start), Some(end)) => {
            QuietHours::parse(start, end).map_err(|err| err.message().to_owned())?
        }
        _ => None,
    };
    let types = serde_json::from_value(row.type_opt_in)
        .map_err(|err| format!("decode type preferences: {err}"))?;
    let timezone = row
        .timezone
        .parse()
        .map_err(|_| format!("unknown time zone: {}", row.timezone))?;
    Ok(NotificationPreferences {
        email: row.email_enabled,
        sms: row.sms_enabled,
        push: row.push_enabled,
        quiet_hours,
        types,
        timezone,
    })
}

fn preferences_to_row(
    user_id: &UserId,
    preferences: &NotificationPreferences,
) -> Result<PreferencesRow, PreferencesRepositoryError> {
    let type_opt_in = serde_json::to_value(&preferences.types).map_err(|err| {
        PreferencesRepositoryError::query(format!("encode type preferences: {err}"))
    })?;
    Ok(PreferencesRow {
        user_id: user_id.as_str().to_owned(),
        email_enabled: preferences.email,
        sms_enabled: preferences.sms,
        push_enabled: preferences.push,
        quiet_start: preferences.quiet_hours.as_ref().map(QuietHours::start_label),
        quiet_end: preferences.quiet_hours.as_ref().map(QuietHours::end_label),
        type_opt_in,
        timezone: preferences.timezone.name().to_owned(),
        updated_at: Utc::now(),
    })
}

#[async_trait]
impl PreferencesRepository for DieselPreferencesRepository {
    async fn find(
        &self,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreferences>, PreferencesRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        notification_preferences::table
            .find(user_id.as_str())
            .select(PreferencesRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(|row| row_to_preferences(row).map_err(PreferencesRepositoryError::query))
            .transpose()
    }

    async fn save(
        &self,
        user_id: &UserId,
        preferences: &NotificationPreferences,
    ) -> Result<(), PreferencesRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = preferences_to_row(user_id, preferences)?;
        diesel::insert_into(notification_preferences::table)
            .values(&row)
            .on_conflict(notification_preferences::user_id)
            .do_update()
            .set(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}
