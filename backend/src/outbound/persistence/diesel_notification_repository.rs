//! PostgreSQL-backed `NotificationRepository`.
//!
//! Recipients, channels and data are stored as JSONB next to the message.
//! Scheduled rows are claimed with `FOR UPDATE SKIP LOCKED` and stamped with
//! `claimed_at`, so several scheduler instances never pick the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use serde_json::Value;

use crate::domain::notifications::{
    Channel, DeliveryRecord, HistoryEntry, Notification, NotificationStatus, Recipient,
};
use crate::domain::ports::{NotificationRepository, NotificationRepositoryError};
use crate::domain::{NotificationId, UserId};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::models::{DeliveryRow, NewDeliveryRow, NewNotificationRow, NotificationRow};
use super::pool::DbPool;
use super::schema::{notification_deliveries, notifications};

/// Diesel-backed notification store.
#[derive(Clone)]
pub struct DieselNotificationRepository {
    pool: DbPool,
}

impl DieselNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(NotificationRepositoryError);

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn encode<T: serde::Serialize>(
    field: &str,
    value: &T,
) -> Result<Value, NotificationRepositoryError> {
    serde_json::to_value(value)
        .map_err(|err| NotificationRepositoryError::query(format!("encode {field}: {err}")))
}

fn decode<T: serde::de::DeserializeOwned>(
    field: &str,
    value: Value,
) -> Result<T, NotificationRepositoryError> {
    serde_json::from_value(value)
        .map_err(|err| NotificationRepositoryError::query(format!("decode {field}: {err}")))
}

fn parse_label<T>(field: &str, raw: &str) -> Result<T, NotificationRepositoryError>
where
    T: std::str::FromStr,
{
    raw.parse()
        .map_err(|_| NotificationRepositoryError::query(format!("unknown {field}: {raw}")))
}

fn row_to_notification(row: NotificationRow) -> Result<Notification, NotificationRepositoryError> {
    let id = NotificationId::from_raw(row.id.as_str())
        .ok_or_else(|| NotificationRepositoryError::query(format!("bad id: {}", row.id)))?;
    let recipients: Vec<Recipient> = decode("recipients", row.recipients)?;
    let channels: Vec<Channel> = decode("channels", row.channels)?;
    let data = match row.data {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(NotificationRepositoryError::query(format!(
                "notification data is not an object: {other}"
            )));
        }
    };
    Ok(Notification {
        id,
        notification_type: parse_label("notification type", &row.notification_type)?,
        priority: parse_label("priority", &row.priority)?,
        subject: row.subject,
        message: row.message,
        data,
        recipients,
        channels,
        scheduled_at: row.scheduled_at,
        status: parse_label("notification status", &row.status)?,
        created_at: row.created_at,
    })
}

fn rows_to_history(
    rows: Vec<(DeliveryRow, NotificationRow)>,
) -> Result<Vec<HistoryEntry>, NotificationRepositoryError> {
    rows.into_iter()
        .map(|(delivery, row)| {
            let notification = row_to_notification(row)?;
            Ok(HistoryEntry {
                notification_id: notification.id,
                notification_type: notification.notification_type,
                priority: notification.priority,
                subject: notification.subject,
                message: notification.message,
                created_at: notification.created_at,
                channel: parse_label("channel", &delivery.channel)?,
                status: parse_label("delivery status", &delivery.status)?,
                delivered_at: delivery.delivered_at,
            })
        })
        .collect()
}

#[async_trait]
impl NotificationRepository for DieselNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<(), NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewNotificationRow {
            id: notification.id.as_str(),
            notification_type: notification.notification_type.as_str(),
            priority: notification.priority.as_str(),
            subject: &notification.subject,
            message: &notification.message,
            data: Value::Object(notification.data.clone()),
            recipients: encode("recipients", &notification.recipients)?,
            channels: encode("channels", &notification.channels)?,
            scheduled_at: notification.scheduled_at,
            status: notification.status.as_str(),
            created_at: notification.created_at,
        };
        diesel::insert_into(notifications::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        notifications::table
            .find(id.as_str())
            .select(NotificationRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(row_to_notification)
            .transpose()
    }

    async fn mark_status(
        &self,
        id: &NotificationId,
        status: NotificationStatus,
        at: DateTime<Utc>,
    ) -> Result<(), NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(notifications::table.find(id.as_str()))
            .set((
                notifications::status.eq(status.as_str()),
                notifications::updated_at.eq(at),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<NotificationRow> = conn
            .transaction(|conn| {
                async move {
                    let due: Vec<NotificationRow> = notifications::table
                        .filter(notifications::status.eq(NotificationStatus::Pending.as_str()))
                        .filter(notifications::claimed_at.is_null())
                        .filter(notifications::scheduled_at.le(now))
                        .select(NotificationRow::as_select())
                        .order((
                            notifications::scheduled_at.asc(),
                            notifications::created_at.asc(),
                        ))
                        .limit(limit_param(limit))
                        .for_update()
                        .skip_locked()
                        .load(conn)
                        .await?;
                    let ids: Vec<&str> = due.iter().map(|row| row.id.as_str()).collect();
                    if !ids.is_empty() {
                        diesel::update(notifications::table.filter(notifications::id.eq_any(ids)))
                            .set(notifications::claimed_at.eq(now))
                            .execute(conn)
                            .await?;
                    }
                    Ok(due)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_notification).collect()
    }

    async fn release_claim(&self, id: &NotificationId) -> Result<(), NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::update(notifications::table.find(id.as_str()))
            .set(notifications::claimed_at.eq(None::<DateTime<Utc>>))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn record_delivery(
        &self,
        record: &DeliveryRecord,
    ) -> Result<(), NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewDeliveryRow {
            notification_id: record.notification_id.as_str(),
            user_id: record.user_id.as_str(),
            channel: record.channel.as_str(),
            status: record.status.as_str(),
            delivered_at: record.delivered_at,
            error: record.error.as_deref(),
            metadata: Value::Object(record.metadata.clone()),
        };
        diesel::insert_into(notification_deliveries::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn recent_history(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, NotificationRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<(DeliveryRow, NotificationRow)> = notification_deliveries::table
            .inner_join(notifications::table)
            .filter(notification_deliveries::user_id.eq(user_id.as_str()))
            .order((
                notification_deliveries::delivered_at.desc(),
                notification_deliveries::id.desc(),
            ))
            .limit(limit_param(limit))
            .select((DeliveryRow::as_select(), NotificationRow::as_select()))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows_to_history(rows)
    }
}
