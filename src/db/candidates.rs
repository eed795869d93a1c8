//! Candidate CRUD operations.

use crate::error::DatabaseError;
use crate::types::CandidateId;
use crate::{Error, Result};

use super::{Candidate, Database, NewCandidate};

impl Database {
    /// Insert a candidate unless its natural key has been seen before
    ///
    /// Returns the new id, or `None` when the natural key already exists.
    /// Candidates are immutable once ingested: a re-fetched key is skipped,
    /// never updated.
    pub async fn insert_candidate_if_new(
        &self,
        candidate: &NewCandidate,
    ) -> Result<Option<CandidateId>> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO candidates (
                natural_key, source_id, title, body, link, author,
                published_at, fetched_at, status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&candidate.natural_key)
        .bind(&candidate.source_id)
        .bind(&candidate.title)
        .bind(&candidate.body)
        .bind(&candidate.link)
        .bind(&candidate.author)
        .bind(candidate.published_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert candidate: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            Ok(None)
        } else {
            Ok(Some(CandidateId(result.last_insert_rowid())))
        }
    }

    /// Get a candidate by ID
    pub async fn get_candidate(&self, id: CandidateId) -> Result<Option<Candidate>> {
        let row = sqlx::query_as::<_, Candidate>(
            r#"
            SELECT
                id, natural_key, source_id, title, body, link, author,
                published_at, fetched_at, status, superseded_by, quality_score
            FROM candidates
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get candidate: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List candidates still awaiting digest selection
    pub async fn list_pending_candidates(&self) -> Result<Vec<Candidate>> {
        let rows = sqlx::query_as::<_, Candidate>(
            r#"
            SELECT
                id, natural_key, source_id, title, body, link, author,
                published_at, fetched_at, status, superseded_by, quality_score
            FROM candidates
            WHERE status = 0
            ORDER BY published_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list pending candidates: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Mark a candidate as selected into a digest, recording its score
    pub async fn mark_candidate_selected(&self, id: CandidateId, score: f64) -> Result<()> {
        sqlx::query("UPDATE candidates SET status = 1, quality_score = ? WHERE id = ?")
            .bind(score)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to mark candidate selected: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Mark a candidate as superseded by a higher-quality duplicate
    pub async fn mark_candidate_superseded(
        &self,
        loser: CandidateId,
        winner: CandidateId,
    ) -> Result<()> {
        sqlx::query("UPDATE candidates SET status = 2, superseded_by = ? WHERE id = ?")
            .bind(winner)
            .bind(loser)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to mark candidate superseded: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Count candidates by status, for health reporting
    pub async fn count_candidates_with_status(&self, status: i32) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM candidates WHERE status = ?")
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count candidates: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
