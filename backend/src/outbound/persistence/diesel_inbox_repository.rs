//! PostgreSQL-backed `InboxRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::notifications::InboxItem;
use crate::domain::ports::{InboxRepository, InboxRepositoryError};
use crate::domain::{NotificationId, UserId};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::models::{InboxRow, NewInboxRow};
use super::pool::DbPool;
use super::schema::{notification_inbox, notifications};

/// Diesel-backed in-app inbox.
#[derive(Clone)]
pub struct DieselInboxRepository {
    pool: DbPool,
}

impl DieselInboxRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(InboxRepositoryError);

type InboxJoinRow = (InboxRow, String, String, String, String, String);

fn row_to_item(row: InboxJoinRow) -> Result<InboxItem, InboxRepositoryError> {
    let (inbox, id, kind, priority, subject, message) = row;
    let notification_id = NotificationId::from_raw(id.as_str())
        .ok_or_else(|| InboxRepositoryError::query(format!("bad notification id: {id}")))?;
    Ok(InboxItem {
        notification_id,
        notification_type: kind
            .parse()
            .map_err(|_| InboxRepositoryError::query(format!("unknown notification type: {kind}")))?,
        priority: priority
            .parse()
            .map_err(|_| InboxRepositoryError::query(format!("unknown priority: {priority}")))?,
        subject,
        message,
        created_at: inbox.created_at,
        read_at: inbox.read_at,
    })
}

fn to_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[async_trait]
impl InboxRepository for DieselInboxRepository {
    async fn add(
        &self,
        notification_id: &NotificationId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), InboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewInboxRow {
            notification_id: notification_id.as_str(),
            user_id: user_id.as_str(),
            created_at: at,
        };
        diesel::insert_into(notification_inbox::table)
            .values(&row)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn list(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<InboxItem>, InboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<InboxJoinRow> = notification_inbox::table
            .inner_join(notifications::table)
            .filter(notification_inbox::user_id.eq(user_id.as_str()))
            .order(notification_inbox::created_at.desc())
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .select((
                InboxRow::as_select(),
                notifications::id,
                notifications::notification_type,
                notifications::priority,
                notifications::subject,
                notifications::message,
            ))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_item).collect()
    }

    async fn unread_count(&self, user_id: &UserId) -> Result<u64, InboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let count: i64 = notification_inbox::table
            .filter(notification_inbox::user_id.eq(user_id.as_str()))
            .filter(notification_inbox::read_at.is_null())
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn mark_read(
        &self,
        user_id: &UserId,
        notification_id: &NotificationId,
        at: DateTime<Utc>,
    ) -> Result<bool, InboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            notification_inbox::table
                .filter(notification_inbox::user_id.eq(user_id.as_str()))
                .filter(notification_inbox::notification_id.eq(notification_id.as_str()))
                .filter(notification_inbox::read_at.is_null()),
        )
        .set(notification_inbox::read_at.eq(at))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        if updated > 0 {
            return Ok(true);
        }
        // Already read entries still count as found.
        let existing: i64 = notification_inbox::table
            .filter(notification_inbox::user_id.eq(user_id.as_str()))
            .filter(notification_inbox::notification_id.eq(notification_id.as_str()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(existing > 0)
    }

    async fn mark_all_read(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<u64, InboxRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(
            notification_inbox::table
                .filter(notification_inbox::user_id.eq(user_id.as_str()))
                .filter(notification_inbox::read_at.is_null()),
        )
        .set(notification_inbox::read_at.eq(at))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(to_u64(updated))
    }
}
