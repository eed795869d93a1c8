//! Artifact catalog
//!
//! Registration path for deliverable artifacts: bytes go to the blob store,
//! metadata and provenance go to the database. Artifact rows are immutable
//! once registered.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::db::{ArtifactRow, Database, NewArtifact};
use crate::digest::DigestDocument;
use crate::error::{Error, Result};
use crate::types::{ArtifactId, ArtifactKind};

/// Registers and reads deliverable artifacts
#[derive(Clone)]
pub struct ContentCatalog {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
}

impl ContentCatalog {
    /// Create a catalog over the given database and blob store
    pub fn new(db: Arc<Database>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { db, blobs }
    }

    /// Register an uploaded book as a deliverable artifact
    pub async fn register_book(
        &self,
        title: &str,
        author: Option<&str>,
        bytes: &[u8],
    ) -> Result<ArtifactId> {
        let content_hash = self.blobs.put(bytes).await?;

        let id = self
            .db
            .insert_artifact(&NewArtifact {
                kind: ArtifactKind::Book.to_i32(),
                title: title.to_string(),
                author: author.map(String::from),
                content_hash,
                size_bytes: bytes.len() as i64,
            })
            .await?;

        tracing::info!(artifact_id = %id, title, "Registered book artifact");
        Ok(id)
    }

    /// Register an assembled digest, linking the candidates it was built from
    pub async fn register_digest(&self, digest: &DigestDocument) -> Result<ArtifactId> {
        let bytes = digest.content.as_bytes();
        let content_hash = self.blobs.put(bytes).await?;

        let id = self
            .db
            .insert_artifact(&NewArtifact {
                kind: ArtifactKind::Digest.to_i32(),
                title: digest.title.clone(),
                author: None,
                content_hash,
                size_bytes: bytes.len() as i64,
            })
            .await?;

        self.db.link_artifact_candidates(id, &digest.items).await?;

        tracing::info!(
            artifact_id = %id,
            title = %digest.title,
            items = digest.items.len(),
            "Registered digest artifact"
        );
        Ok(id)
    }

    /// Get an artifact's metadata
    pub async fn get(&self, id: ArtifactId) -> Result<ArtifactRow> {
        self.db
            .get_artifact(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {id}")))
    }

    /// List all artifacts, newest first
    pub async fn list(&self) -> Result<Vec<ArtifactRow>> {
        self.db.list_artifacts().await
    }

    /// Open a reader over an artifact's bytes
    pub async fn open_blob(&self, artifact: &ArtifactRow) -> Result<tokio::fs::File> {
        self.blobs.open(&artifact.content_hash).await
    }
}
