//! Per-source fetch bookkeeping.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Database, SourceState};

impl Database {
    /// Record a successful fetch for a source
    ///
    /// Resets the consecutive error count and clears the last error.
    pub async fn record_source_success(&self, source_id: &str, fetched_at: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_state (source_id, last_fetch_at, last_error, error_count)
            VALUES (?, ?, NULL, 0)
            ON CONFLICT(source_id) DO UPDATE SET
                last_fetch_at = excluded.last_fetch_at,
                last_error = NULL,
                error_count = 0
            "#,
        )
        .bind(source_id)
        .bind(fetched_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record source success: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record a failed fetch for a source
    ///
    /// Increments the consecutive error count. `last_fetch_at` is left alone
    /// so the source stays due and is retried on the next cycle.
    pub async fn record_source_error(&self, source_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_state (source_id, last_fetch_at, last_error, error_count)
            VALUES (?, NULL, ?, 1)
            ON CONFLICT(source_id) DO UPDATE SET
                last_error = excluded.last_error,
                error_count = source_state.error_count + 1
            "#,
        )
        .bind(source_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to record source error: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get the fetch state for a source
    pub async fn get_source_state(&self, source_id: &str) -> Result<Option<SourceState>> {
        let row = sqlx::query_as::<_, SourceState>(
            r#"
            SELECT source_id, last_fetch_at, last_error, error_count
            FROM source_state
            WHERE source_id = ?
            "#,
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get source state: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List fetch state for all sources that have been polled at least once
    pub async fn list_source_states(&self) -> Result<Vec<SourceState>> {
        let rows = sqlx::query_as::<_, SourceState>(
            r#"
            SELECT source_id, last_fetch_at, last_error, error_count
            FROM source_state
            ORDER BY source_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list source states: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
