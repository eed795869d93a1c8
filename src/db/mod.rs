//! Database layer for bookdrop
//!
//! Handles SQLite persistence for sources, candidates, artifacts, devices,
//! and the per-device sync ledger.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`sources`] — Per-source fetch bookkeeping (last fetch, errors)
//! - [`candidates`] — Ingested content items awaiting digest selection
//! - [`artifacts`] — Deliverable artifacts and their provenance
//! - [`devices`] — Registered e-reader devices
//! - [`sync_logs`] — Delivery state machine rows, one per (device, artifact)

use sqlx::{FromRow, sqlite::SqlitePool};

mod artifacts;
mod candidates;
mod devices;
mod migrations;
mod sources;
mod sync_logs;

/// New candidate to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewCandidate {
    /// Stable identity key, md5 of `feed_url:guid`
    pub natural_key: String,
    /// Source this candidate came from
    pub source_id: String,
    /// Item title
    pub title: String,
    /// Plain-text body
    pub body: String,
    /// Original item link
    pub link: Option<String>,
    /// Item author, if the feed carried one
    pub author: Option<String>,
    /// Unix timestamp the item claims it was published
    pub published_at: i64,
}

/// Candidate record from database
#[derive(Debug, Clone, FromRow)]
pub struct Candidate {
    /// Unique database ID
    pub id: i64,
    /// Stable identity key, md5 of `feed_url:guid`
    pub natural_key: String,
    /// Source this candidate came from
    pub source_id: String,
    /// Item title
    pub title: String,
    /// Plain-text body
    pub body: String,
    /// Original item link
    pub link: Option<String>,
    /// Item author, if the feed carried one
    pub author: Option<String>,
    /// Unix timestamp the item claims it was published
    pub published_at: i64,
    /// Unix timestamp the item was ingested
    pub fetched_at: i64,
    /// Candidate status (0=pending, 1=selected, 2=superseded)
    pub status: i32,
    /// Winning candidate, set when status is superseded
    pub superseded_by: Option<i64>,
    /// Quality score assigned at selection time
    pub quality_score: Option<f64>,
}

/// New artifact to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewArtifact {
    /// Artifact kind (0=book, 1=digest)
    pub kind: i32,
    /// Display title
    pub title: String,
    /// Author, when known
    pub author: Option<String>,
    /// sha256 of the artifact bytes in the blob store
    pub content_hash: String,
    /// Size in bytes
    pub size_bytes: i64,
}

/// Artifact record from database
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    /// Unique database ID
    pub id: i64,
    /// Artifact kind (0=book, 1=digest)
    pub kind: i32,
    /// Display title
    pub title: String,
    /// Author, when known
    pub author: Option<String>,
    /// sha256 of the artifact bytes in the blob store
    pub content_hash: String,
    /// Size in bytes
    pub size_bytes: i64,
    /// Unix timestamp of registration
    pub created_at: i64,
}

/// Per-source fetch bookkeeping
#[derive(Debug, Clone, FromRow)]
pub struct SourceState {
    /// Source id from the configuration
    pub source_id: String,
    /// Unix timestamp of the last successful fetch
    pub last_fetch_at: Option<i64>,
    /// Most recent fetch error, cleared on success
    pub last_error: Option<String>,
    /// Consecutive fetch failures
    pub error_count: i64,
}

/// Device record from database
#[derive(Debug, Clone, FromRow)]
pub struct DeviceRow {
    /// Device identifier chosen at registration
    pub id: String,
    /// Human-readable device name
    pub name: Option<String>,
    /// sha256 hex of the device secret
    pub secret_hash: String,
    /// Unix timestamp of registration
    pub registered_at: i64,
    /// Unix timestamp of last successful authentication
    pub last_seen_at: Option<i64>,
}

/// Sync ledger record from database, one per (device, artifact)
#[derive(Debug, Clone, FromRow)]
pub struct SyncLogRow {
    /// Unique database ID
    pub id: i64,
    /// Device the delivery is for
    pub device_id: String,
    /// Artifact being delivered
    pub artifact_id: i64,
    /// Delivery state (0=pending, 1=in flight, 2=delivered, 3=failed, 4=abandoned)
    pub state: i32,
    /// Attempts made so far
    pub attempts: i64,
    /// Error from the most recent failed attempt
    pub last_error: Option<String>,
    /// Unix timestamp when a failed pair becomes eligible again
    pub next_retry_at: Option<i64>,
    /// Unix timestamp the current/last attempt began
    pub started_at: Option<i64>,
    /// Unix timestamp of the last state change
    pub updated_at: i64,
}

/// Database handle for bookdrop
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
