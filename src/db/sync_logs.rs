//! Sync ledger operations: the per-(device, artifact) delivery state machine.
//!
//! State transitions are compare-and-set `UPDATE ... WHERE state IN (...)`
//! statements checked via `rows_affected()`, so two racing callers can never
//! both win a transition.

use crate::error::DatabaseError;
use crate::types::{ArtifactId, ArtifactKind, AvailableArtifact, SyncState};
use crate::{Error, Result};

use super::{ArtifactRow, Database, SyncLogRow};

impl Database {
    /// Ensure a PENDING ledger row exists for this (device, artifact) pair
    ///
    /// Idempotent: an existing row in any state is left untouched.
    pub async fn ensure_sync_log(&self, device_id: &str, artifact_id: ArtifactId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sync_logs (device_id, artifact_id, state, attempts, updated_at)
            VALUES (?, ?, 0, 0, ?)
            "#,
        )
        .bind(device_id)
        .bind(artifact_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to ensure sync log: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get the ledger row for a (device, artifact) pair
    pub async fn get_sync_log(
        &self,
        device_id: &str,
        artifact_id: ArtifactId,
    ) -> Result<Option<SyncLogRow>> {
        let row = sqlx::query_as::<_, SyncLogRow>(
            r#"
            SELECT id, device_id, artifact_id, state, attempts, last_error,
                   next_retry_at, started_at, updated_at
            FROM sync_logs
            WHERE device_id = ? AND artifact_id = ?
            "#,
        )
        .bind(device_id)
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get sync log: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Try to claim the delivery: PENDING or retry-eligible FAILED → IN_FLIGHT
    ///
    /// Returns `true` when this caller won the claim. `false` means the row
    /// was in some other state (already in flight, delivered, abandoned, or
    /// failed but still backing off).
    pub async fn try_begin_delivery(
        &self,
        device_id: &str,
        artifact_id: ArtifactId,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET state = 1, started_at = ?, updated_at = ?
            WHERE device_id = ? AND artifact_id = ?
              AND (state = 0 OR (state = 3 AND next_retry_at IS NOT NULL AND next_retry_at <= ?))
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(device_id)
        .bind(artifact_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin delivery: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// IN_FLIGHT → DELIVERED
    ///
    /// Returns `true` when the transition applied.
    pub async fn complete_delivery(
        &self,
        device_id: &str,
        artifact_id: ArtifactId,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET state = 2, attempts = attempts + 1, last_error = NULL,
                next_retry_at = NULL, updated_at = ?
            WHERE device_id = ? AND artifact_id = ? AND state = 1
            "#,
        )
        .bind(now)
        .bind(device_id)
        .bind(artifact_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to complete delivery: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// IN_FLIGHT → FAILED (retryable) or ABANDONED (attempt budget exhausted)
    ///
    /// Increments the attempt counter. `next_retry_at` is only meaningful for
    /// FAILED. Returns `true` when the transition applied.
    pub async fn fail_delivery(
        &self,
        device_id: &str,
        artifact_id: ArtifactId,
        new_state: SyncState,
        error: &str,
        next_retry_at: Option<i64>,
        now: i64,
    ) -> Result<bool> {
        debug_assert!(matches!(new_state, SyncState::Failed | SyncState::Abandoned));

        let result = sqlx::query(
            r#"
            UPDATE sync_logs
            SET state = ?, attempts = attempts + 1, last_error = ?,
                next_retry_at = ?, updated_at = ?
            WHERE device_id = ? AND artifact_id = ? AND state = 1
            "#,
        )
        .bind(new_state.to_i32())
        .bind(error)
        .bind(next_retry_at)
        .bind(now)
        .bind(device_id)
        .bind(artifact_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to fail delivery: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() == 1)
    }

    /// IN_FLIGHT rows whose attempt started before `cutoff`
    ///
    /// The sweep fails each of these; a crashed device never pins an
    /// artifact forever.
    pub async fn list_expired_leases(&self, cutoff: i64) -> Result<Vec<SyncLogRow>> {
        let rows = sqlx::query_as::<_, SyncLogRow>(
            r#"
            SELECT id, device_id, artifact_id, state, attempts, last_error,
                   next_retry_at, started_at, updated_at
            FROM sync_logs
            WHERE state = 1 AND started_at IS NOT NULL AND started_at < ?
            ORDER BY started_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list expired leases: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Artifacts a device can download right now
    ///
    /// An artifact is available when it has no ledger row, a PENDING row, or
    /// a FAILED row whose retry time has passed. IN_FLIGHT, DELIVERED, and
    /// ABANDONED pairs are excluded.
    pub async fn list_available_artifacts(
        &self,
        device_id: &str,
        now: i64,
    ) -> Result<Vec<AvailableArtifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT a.id, a.kind, a.title, a.author, a.content_hash, a.size_bytes, a.created_at
            FROM artifacts a
            LEFT JOIN sync_logs s
              ON s.artifact_id = a.id AND s.device_id = ?
            WHERE s.id IS NULL
               OR s.state = 0
               OR (s.state = 3 AND s.next_retry_at IS NOT NULL AND s.next_retry_at <= ?)
            ORDER BY a.created_at DESC, a.id DESC
            "#,
        )
        .bind(device_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list available artifacts: {}",
                e
            )))
        })?;

        use chrono::{TimeZone, Utc};

        Ok(rows
            .into_iter()
            .map(|row| AvailableArtifact {
                artifact_id: ArtifactId(row.id),
                kind: ArtifactKind::from_i32(row.kind),
                title: row.title,
                size_bytes: row.size_bytes as u64,
                created_at: Utc
                    .timestamp_opt(row.created_at, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            })
            .collect())
    }

    /// Count ledger rows in a given state, for health reporting
    pub async fn count_sync_logs_with_state(&self, state: SyncState) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_logs WHERE state = ?")
            .bind(state.to_i32())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count sync logs: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
