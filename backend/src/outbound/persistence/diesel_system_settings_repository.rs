//! PostgreSQL-backed `SystemSettingsRepository`.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{SystemSettingsRepository, SystemSettingsRepositoryError};

use super::diesel_basic_error_mapping::basic_error_mappers;
use super::models::SystemSettingRow;
use super::pool::DbPool;
use super::schema::system_settings;

#[derive(Clone)]
pub struct DieselSystemSettingsRepository {
    pool: DbPool,
}

impl DieselSystemSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

basic_error_mappers!(SystemSettingsRepositoryError);

#[async_trait]
impl SystemSettingsRepository for DieselSystemSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, SystemSettingsRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        system_settings::table
            .find(key)
            .select(system_settings::value)
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SystemSettingsRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = SystemSettingRow {
            key,
            value,
            updated_at: Utc::now(),
        };
        diesel::insert_into(system_settings::table)
            .values(&row)
            .on_conflict(system_settings::key)
            .do_update()
            .set((
                system_settings::value.eq(excluded(system_settings::value)),
                system_settings::updated_at.eq(excluded(system_settings::updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}
