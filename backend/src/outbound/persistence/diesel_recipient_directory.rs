//! PostgreSQL-backed `RecipientDirectory`.
//!
//! Recipients are built from active rows in `users`, their registered device
//! tokens and any stored notification preferences. Users without stored
//! preferences receive the defaults.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::warn;

use crate::domain::notifications::{NotificationPreferences, Recipient};
use crate::domain::ports::{RecipientDirectory, RecipientDirectoryError};
use crate::domain::{UserId, VehicleId};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::diesel_preferences_repository::row_to_preferences;
use super::models::{EmergencyContactRow, PreferencesRow, UserRow};
use super::pool::DbPool;
use super::schema::{
    emergency_contacts, notification_preferences, route_assignments, user_device_tokens, users,
};

const ACTIVE: &str = "active";

#[derive(Clone)]
pub struct DieselRecipientDirectory {
    pool: DbPool,
}

impl DieselRecipientDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(RecipientDirectoryError);

/// Combine user rows with their tokens and preferences. Rows whose username
/// is not a valid id are skipped.
fn build_recipients(
    users: Vec<UserRow>,
    tokens: Vec<(String, String)>,
    preferences: Vec<PreferencesRow>,
) -> Vec<Recipient> {
    let mut tokens_by_user: HashMap<String, Vec<String>> = HashMap::new();
    for (user, token) in tokens {
        tokens_by_user.entry(user).or_default().push(token);
    }
    let mut preferences_by_user: HashMap<String, NotificationPreferences> = HashMap::new();
    for row in preferences {
        let user = row.user_id.clone();
        match row_to_preferences(row) {
            Ok(decoded) => {
                preferences_by_user.insert(user, decoded);
            }
            Err(reason) => warn!(user, reason, "ignoring unreadable notification preferences"),
        }
    }

    users
        .into_iter()
        .filter_map(|row| {
            let user_id = match UserId::new(row.username.as_str()) {
                Ok(id) => id,
                Err(err) => {
                    warn!(username = row.username, error = %err, "skipping invalid user row");
                    return None;
                }
            };
            Some(Recipient {
                device_tokens: tokens_by_user.remove(&row.username).unwrap_or_default(),
                preferences: preferences_by_user
                    .remove(&row.username)
                    .unwrap_or_default(),
                username: row.username,
                email: row.email,
                phone: row.phone,
                user_id,
            })
        })
        .collect()
}

fn contact_to_recipient(row: EmergencyContactRow) -> Option<Recipient> {
    let user_id = UserId::new(row.contact_id.as_str()).ok()?;
    Some(Recipient {
        user_id,
        username: row.name,
        email: row.email,
        phone: row.phone,
        device_tokens: Vec::new(),
        preferences: NotificationPreferences::default(),
    })
}

async fn hydrate(
    conn: &mut AsyncPgConnection,
    rows: Vec<UserRow>,
) -> Result<Vec<Recipient>, RecipientDirectoryError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let names: Vec<String> = rows.iter().map(|row| row.username.clone()).collect();
    let tokens: Vec<(String, String)> = user_device_tokens::table
        .filter(user_device_tokens::user_id.eq_any(&names))
        .order((user_device_tokens::user_id, user_device_tokens::created_at))
        .select((user_device_tokens::user_id, user_device_tokens::token))
        .load(conn)
        .await
        .map_err(map_diesel_error)?;
    let preferences: Vec<PreferencesRow> = notification_preferences::table
        .filter(notification_preferences::user_id.eq_any(&names))
        .select(PreferencesRow::as_select())
        .load(conn)
        .await
        .map_err(map_diesel_error)?;
    Ok(build_recipients(rows, tokens, preferences))
}

#[async_trait]
impl RecipientDirectory for DieselRecipientDirectory {
    async fn managers(&self) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<UserRow> = users::table
            .filter(users::role.eq("manager"))
            .filter(users::status.eq(ACTIVE))
            .order(users::username)
            .select(UserRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        hydrate(&mut conn, rows).await
    }

    async fn user(&self, user_id: &UserId) -> Result<Option<Recipient>, RecipientDirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .find(user_id.as_str())
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(hydrate(&mut conn, vec![row]).await?.into_iter().next())
    }

    async fn drivers_for_vehicle(
        &self,
        vehicle_id: &VehicleId,
    ) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<UserRow> = users::table
            .inner_join(route_assignments::table)
            .filter(route_assignments::vehicle_id.eq(vehicle_id.as_str()))
            .filter(users::status.eq(ACTIVE))
            .select(UserRow::as_select())
            .distinct()
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        hydrate(&mut conn, rows).await
    }

    async fn emergency_contacts(&self) -> Result<Vec<Recipient>, RecipientDirectoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<EmergencyContactRow> = emergency_contacts::table
            .filter(emergency_contacts::active.eq(true))
            .order(emergency_contacts::contact_id)
            .select(EmergencyContactRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().filter_map(contact_to_recipient).collect())
    }
}
