//! Registered device CRUD operations.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Database, DeviceRow};

impl Database {
    /// Register a device with a hashed secret
    ///
    /// Fails with a constraint violation when the device id is taken.
    pub async fn insert_device(
        &self,
        id: &str,
        name: Option<&str>,
        secret_hash: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO devices (id, name, secret_hash, registered_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(secret_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "device '{}' is already registered",
                    id
                )))
            } else {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert device: {}",
                    e
                )))
            }
        })?;

        Ok(())
    }

    /// Get a device by ID
    pub async fn get_device(&self, id: &str) -> Result<Option<DeviceRow>> {
        let row = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT id, name, secret_hash, registered_at, last_seen_at
            FROM devices
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get device: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Record a successful authentication for a device
    pub async fn touch_device_seen(&self, id: &str, seen_at: i64) -> Result<()> {
        sqlx::query("UPDATE devices SET last_seen_at = ? WHERE id = ?")
            .bind(seen_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update device last_seen_at: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// List all registered devices
    pub async fn list_devices(&self) -> Result<Vec<DeviceRow>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT id, name, secret_hash, registered_at, last_seen_at
            FROM devices
            ORDER BY registered_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list devices: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
