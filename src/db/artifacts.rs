//! Artifact CRUD and provenance operations.

use crate::error::DatabaseError;
use crate::types::{ArtifactId, CandidateId};
use crate::{Error, Result};

use super::{ArtifactRow, Database, NewArtifact};

impl Database {
    /// Insert a new artifact record
    pub async fn insert_artifact(&self, artifact: &NewArtifact) -> Result<ArtifactId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO artifacts (kind, title, author, content_hash, size_bytes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(artifact.kind)
        .bind(&artifact.title)
        .bind(&artifact.author)
        .bind(&artifact.content_hash)
        .bind(artifact.size_bytes)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert artifact: {}",
                e
            )))
        })?;

        Ok(ArtifactId(result.last_insert_rowid()))
    }

    /// Link the candidates a digest artifact was assembled from
    ///
    /// Position preserves the digest's section order.
    pub async fn link_artifact_candidates(
        &self,
        artifact_id: ArtifactId,
        candidates: &[CandidateId],
    ) -> Result<()> {
        for (position, candidate_id) in candidates.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO artifact_candidates (artifact_id, candidate_id, position)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(artifact_id)
            .bind(*candidate_id)
            .bind(position as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to link artifact candidate: {}",
                    e
                )))
            })?;
        }

        Ok(())
    }

    /// Get an artifact by ID
    pub async fn get_artifact(&self, id: ArtifactId) -> Result<Option<ArtifactRow>> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, kind, title, author, content_hash, size_bytes, created_at
            FROM artifacts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get artifact: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all artifacts, newest first
    pub async fn list_artifacts(&self) -> Result<Vec<ArtifactRow>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, kind, title, author, content_hash, size_bytes, created_at
            FROM artifacts
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list artifacts: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// The candidates a digest artifact was assembled from, in section order
    pub async fn get_artifact_provenance(&self, id: ArtifactId) -> Result<Vec<CandidateId>> {
        let rows: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT candidate_id
            FROM artifact_candidates
            WHERE artifact_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get artifact provenance: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(CandidateId).collect())
    }
}
