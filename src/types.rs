//! Core types for bookdrop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a deliverable artifact
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ArtifactId(pub i64);

impl ArtifactId {
    /// Create a new ArtifactId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ArtifactId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ArtifactId> for i64 {
    fn from(id: ArtifactId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ArtifactId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for ArtifactId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ArtifactId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ArtifactId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Unique identifier for a fetched candidate item
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct CandidateId(pub i64);

impl CandidateId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for CandidateId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl sqlx::Type<sqlx::Sqlite> for CandidateId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for CandidateId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for CandidateId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Kind of deliverable artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// An uploaded book
    Book,
    /// A digest assembled from aggregated candidates
    Digest,
}

impl ArtifactKind {
    /// Convert integer kind code to ArtifactKind
    pub fn from_i32(kind: i32) -> Self {
        match kind {
            0 => ArtifactKind::Book,
            _ => ArtifactKind::Digest,
        }
    }

    /// Convert ArtifactKind to integer kind code
    pub fn to_i32(&self) -> i32 {
        match self {
            ArtifactKind::Book => 0,
            ArtifactKind::Digest => 1,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Book => write!(f, "book"),
            ArtifactKind::Digest => write!(f, "digest"),
        }
    }
}

/// Delivery state of a sync log entry
///
/// Transitions: `Pending -> InFlight -> {Delivered, Failed}`, with
/// `Failed -> InFlight` gated by the retry backoff timer. `Delivered` and
/// `Abandoned` are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Delivery recorded but not yet started
    Pending,
    /// A delivery is currently streaming to the device
    InFlight,
    /// Successfully delivered (terminal)
    Delivered,
    /// Last attempt failed; eligible again once the backoff passes
    Failed,
    /// Max attempts exhausted; no further automatic retries (terminal)
    Abandoned,
}

impl SyncState {
    /// Convert integer state code to SyncState
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => SyncState::Pending,
            1 => SyncState::InFlight,
            2 => SyncState::Delivered,
            3 => SyncState::Failed,
            4 => SyncState::Abandoned,
            _ => SyncState::Failed, // Default to Failed for unknown state
        }
    }

    /// Convert SyncState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            SyncState::Pending => 0,
            SyncState::InFlight => 1,
            SyncState::Delivered => 2,
            SyncState::Failed => 3,
            SyncState::Abandoned => 4,
        }
    }

    /// Whether this state admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Delivered | SyncState::Abandoned)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncState::Pending => "pending",
            SyncState::InFlight => "in_flight",
            SyncState::Delivered => "delivered",
            SyncState::Failed => "failed",
            SyncState::Abandoned => "abandoned",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a delivery attempt, reported by the device
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The device received and stored the full artifact
    Success,
    /// The transfer failed before completion
    Failure {
        /// Device-reported error message
        message: String,
    },
    /// The device gave up waiting (treated the same as a failure)
    Timeout,
}

impl DeliveryOutcome {
    /// Error message to record for a non-success outcome
    pub fn error_message(&self) -> Option<String> {
        match self {
            DeliveryOutcome::Success => None,
            DeliveryOutcome::Failure { message } => Some(message.clone()),
            DeliveryOutcome::Timeout => Some("device reported timeout".to_string()),
        }
    }
}

/// Processing status of a candidate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    /// Fetched, not yet considered for packaging
    Pending,
    /// Selected into an artifact
    Selected,
    /// Replaced by a duplicate with a more complete body
    Superseded,
}

impl CandidateStatus {
    /// Convert integer status code to CandidateStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => CandidateStatus::Pending,
            1 => CandidateStatus::Selected,
            _ => CandidateStatus::Superseded,
        }
    }

    /// Convert CandidateStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            CandidateStatus::Pending => 0,
            CandidateStatus::Selected => 1,
            CandidateStatus::Superseded => 2,
        }
    }
}

/// An artifact entry as offered to a device in a listing
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AvailableArtifact {
    /// Artifact ID
    pub artifact_id: ArtifactId,
    /// Artifact kind (book or digest)
    pub kind: ArtifactKind,
    /// Display title
    pub title: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Event emitted during the aggregation and delivery lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new artifact was registered in the catalog
    ArtifactRegistered {
        /// Artifact ID
        id: ArtifactId,
        /// Artifact kind
        kind: ArtifactKind,
        /// Display title
        title: String,
        /// Size in bytes
        size_bytes: u64,
    },

    /// A delivery transitioned to in-flight
    DeliveryStarted {
        /// Device the artifact is streaming to
        device_id: String,
        /// Artifact being delivered
        artifact_id: ArtifactId,
        /// Attempt number (1-based)
        attempt: u32,
    },

    /// A delivery completed successfully
    Delivered {
        /// Device that received the artifact
        device_id: String,
        /// Delivered artifact
        artifact_id: ArtifactId,
    },

    /// A delivery attempt failed and will be retried after backoff
    DeliveryFailed {
        /// Device the delivery was for
        device_id: String,
        /// Artifact that failed to deliver
        artifact_id: ArtifactId,
        /// Attempt count so far
        attempts: u32,
        /// Error message
        error: String,
    },

    /// A delivery exhausted its attempt budget and was abandoned
    DeliveryAbandoned {
        /// Device the delivery was for
        device_id: String,
        /// Artifact that was abandoned
        artifact_id: ArtifactId,
        /// Total attempts made
        attempts: u32,
    },

    /// An aggregation cycle finished
    AggregationCycleComplete {
        /// Number of sources fetched this cycle
        sources_fetched: usize,
        /// Number of sources that failed this cycle
        sources_failed: usize,
        /// New candidates ingested
        candidates_added: usize,
        /// Digest registered this cycle, if any
        digest_id: Option<ArtifactId>,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_roundtrip() {
        for state in [
            SyncState::Pending,
            SyncState::InFlight,
            SyncState::Delivered,
            SyncState::Failed,
            SyncState::Abandoned,
        ] {
            assert_eq!(SyncState::from_i32(state.to_i32()), state);
        }
    }

    #[test]
    fn test_sync_state_unknown_maps_to_failed() {
        assert_eq!(SyncState::from_i32(99), SyncState::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SyncState::Delivered.is_terminal());
        assert!(SyncState::Abandoned.is_terminal());
        assert!(!SyncState::Pending.is_terminal());
        assert!(!SyncState::InFlight.is_terminal());
        assert!(!SyncState::Failed.is_terminal());
    }

    #[test]
    fn test_artifact_kind_roundtrip() {
        assert_eq!(
            ArtifactKind::from_i32(ArtifactKind::Book.to_i32()),
            ArtifactKind::Book
        );
        assert_eq!(
            ArtifactKind::from_i32(ArtifactKind::Digest.to_i32()),
            ArtifactKind::Digest
        );
    }

    #[test]
    fn test_artifact_id_display_and_parse() {
        let id = ArtifactId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<ArtifactId>().unwrap(), id);
    }

    #[test]
    fn test_outcome_error_message() {
        assert!(DeliveryOutcome::Success.error_message().is_none());
        assert_eq!(
            DeliveryOutcome::Failure {
                message: "disk full".to_string()
            }
            .error_message()
            .as_deref(),
            Some("disk full")
        );
        assert!(DeliveryOutcome::Timeout.error_message().is_some());
    }
}
